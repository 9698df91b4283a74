//! XML Encryption of assertions.
//!
//! A fresh session key encrypts the serialized assertion and is itself
//! wrapped for the relying party's certificate. The wrapped key travels in
//! the `ds:KeyInfo` of the `EncryptedData`.

use base64::Engine;
use idp_crypto::{BlockEncryption, KeyTransport, SigningKey};

use crate::error::{SamlError, SamlResult};
use crate::types::{EncryptionOptions, SAML_NS, XMLDSIG_NS, XMLENC_ELEMENT_TYPE, XMLENC_NS};
use crate::xml::{Document, Element};

/// Encrypts `assertion_xml` and returns an `<EncryptedAssertion>` element.
///
/// # Errors
///
/// Returns [`SamlError::Encryption`] if the cipher or key wrap fails.
pub fn encrypt_assertion(assertion_xml: &str, opts: &EncryptionOptions) -> SamlResult<String> {
    let b64 = &base64::engine::general_purpose::STANDARD;
    let session_key = opts.block_encryption.generate_key();
    let cipher_value = opts.block_encryption.encrypt(&session_key, assertion_xml.as_bytes())?;
    let wrapped_key = opts.key_transport.wrap(opts.cert.public_key(), &session_key)?;

    let data_id = format!("_{}", idp_crypto::generate_reference_id());
    let key_id = format!("_{}", idp_crypto::generate_reference_id());

    Ok(format!(
        concat!(
            r#"<EncryptedAssertion xmlns="{saml}">"#,
            r#"<xenc:EncryptedData xmlns:xenc="{xenc}" Id="{data_id}" Type="{element_type}">"#,
            r#"<xenc:EncryptionMethod Algorithm="{block}"></xenc:EncryptionMethod>"#,
            r#"<ds:KeyInfo xmlns:ds="{ds}">"#,
            r#"<xenc:EncryptedKey Id="{key_id}">"#,
            r#"<xenc:EncryptionMethod Algorithm="{transport}">"#,
            r#"<ds:DigestMethod Algorithm="{oaep_digest}"></ds:DigestMethod>"#,
            "</xenc:EncryptionMethod>",
            "<ds:KeyInfo><ds:X509Data><ds:X509Certificate>{cert}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>",
            "<xenc:CipherData><xenc:CipherValue>{wrapped}</xenc:CipherValue></xenc:CipherData>",
            r##"<xenc:ReferenceList><xenc:DataReference URI="#{data_id}"></xenc:DataReference></xenc:ReferenceList>"##,
            "</xenc:EncryptedKey>",
            "</ds:KeyInfo>",
            "<xenc:CipherData><xenc:CipherValue>{cipher}</xenc:CipherValue></xenc:CipherData>",
            "</xenc:EncryptedData>",
            "</EncryptedAssertion>",
        ),
        saml = SAML_NS,
        xenc = XMLENC_NS,
        ds = XMLDSIG_NS,
        data_id = data_id,
        key_id = key_id,
        element_type = XMLENC_ELEMENT_TYPE,
        block = opts.block_encryption.uri(),
        transport = opts.key_transport.uri(),
        oaep_digest = opts.key_transport.digest_uri(),
        cert = opts.cert.to_base64(),
        wrapped = b64.encode(wrapped_key),
        cipher = b64.encode(cipher_value),
    ))
}

/// Decrypts an `<EncryptedAssertion>` (or bare `xenc:EncryptedData`) with
/// the recipient's private key and returns the assertion XML.
///
/// # Errors
///
/// Returns [`SamlError::MissingElement`] for an incomplete container,
/// [`SamlError::UnsupportedAlgorithm`] for an unknown method, and
/// [`SamlError::Encryption`] if the key or ciphertext does not decrypt.
pub fn decrypt_assertion(xml: &str, key: &SigningKey) -> SamlResult<String> {
    let doc = Document::parse(xml)?;
    let encrypted_data = if doc.root.is(XMLENC_NS, "EncryptedData") {
        &doc.root
    } else {
        if !doc.root.is(SAML_NS, "EncryptedAssertion") {
            return Err(SamlError::MissingElement("EncryptedAssertion".to_string()));
        }
        enc_child(&doc.root, "EncryptedData")?
    };

    let block_uri = method_uri(encrypted_data)?;
    let block = BlockEncryption::from_uri(block_uri)
        .ok_or_else(|| SamlError::UnsupportedAlgorithm(block_uri.to_string()))?;

    // The key is usually inside ds:KeyInfo but may be a sibling of EncryptedData.
    let encrypted_key = encrypted_data
        .child(XMLDSIG_NS, "KeyInfo")
        .and_then(|info| info.child(XMLENC_NS, "EncryptedKey"))
        .or_else(|| doc.root.child(XMLENC_NS, "EncryptedKey"))
        .ok_or_else(|| SamlError::MissingElement("xenc:EncryptedKey".to_string()))?;
    let transport_uri = method_uri(encrypted_key)?;
    let transport = KeyTransport::from_uri(transport_uri)
        .ok_or_else(|| SamlError::UnsupportedAlgorithm(transport_uri.to_string()))?;

    let session_key = transport.unwrap_key(key.rsa(), &cipher_value(encrypted_key)?)?;
    let plaintext = block.decrypt(&session_key, &cipher_value(encrypted_data)?)?;
    String::from_utf8(plaintext).map_err(|e| SamlError::Encryption(e.to_string()))
}

fn enc_child<'a>(parent: &'a Element, local_name: &str) -> SamlResult<&'a Element> {
    parent
        .child(XMLENC_NS, local_name)
        .ok_or_else(|| SamlError::MissingElement(format!("xenc:{local_name}")))
}

fn method_uri(element: &Element) -> SamlResult<&str> {
    enc_child(element, "EncryptionMethod")?
        .attribute("Algorithm")
        .ok_or_else(|| SamlError::MissingElement("EncryptionMethod/@Algorithm".to_string()))
}

fn cipher_value(element: &Element) -> SamlResult<Vec<u8>> {
    let text = enc_child(enc_child(element, "CipherData")?, "CipherValue")?.text();
    let compact: String = text.split_whitespace().collect();
    Ok(base64::engine::general_purpose::STANDARD.decode(compact)?)
}
