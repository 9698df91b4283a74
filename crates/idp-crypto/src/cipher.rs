//! XML-Encryption block ciphers and RSA key transport.
//!
//! Ciphertext layouts follow XML-Encryption: CBC output is `IV || ciphertext`
//! with a 16 byte IV, GCM output is `IV || ciphertext || tag` with a 12 byte
//! IV and a 16 byte tag.

use std::fmt;
use std::str::FromStr;

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, AeadCore, Nonce};
use aes_gcm::{Aes128Gcm, Aes256Gcm, KeyInit};
use cbc::cipher::block_padding::{Iso10126, Pkcs7};
use cbc::cipher::{BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use thiserror::Error;

use crate::random::random_bytes;

const CBC_IV_LEN: usize = 16;
const GCM_IV_LEN: usize = 12;
const GCM_TAG_LEN: usize = 16;

/// Error type for encryption operations.
#[derive(Debug, Error)]
pub enum CipherError {
    /// Unknown block encryption or key transport name or URI.
    #[error("unsupported encryption algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The symmetric key has the wrong size.
    #[error("expected {expected} byte key, got {actual}")]
    InvalidKeyLength {
        /// Required key length.
        expected: usize,
        /// Supplied key length.
        actual: usize,
    },

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed.
    #[error("decryption failed: {0}")]
    Decryption(String),
}

/// Symmetric algorithm used for `EncryptedData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlockEncryption {
    /// AES-128 in CBC mode.
    #[serde(rename = "aes128-cbc")]
    Aes128Cbc,
    /// AES-192 in CBC mode.
    #[serde(rename = "aes192-cbc")]
    Aes192Cbc,
    /// AES-256 in CBC mode.
    #[default]
    #[serde(rename = "aes256-cbc")]
    Aes256Cbc,
    /// AES-128 in GCM mode.
    #[serde(rename = "aes128-gcm")]
    Aes128Gcm,
    /// AES-256 in GCM mode.
    #[serde(rename = "aes256-gcm")]
    Aes256Gcm,
}

impl BlockEncryption {
    /// All supported block encryption algorithms.
    pub const ALL: [Self; 5] = [
        Self::Aes128Cbc,
        Self::Aes192Cbc,
        Self::Aes256Cbc,
        Self::Aes128Gcm,
        Self::Aes256Gcm,
    ];

    /// Returns the configuration name (`aes256-cbc`).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Aes128Cbc => "aes128-cbc",
            Self::Aes192Cbc => "aes192-cbc",
            Self::Aes256Cbc => "aes256-cbc",
            Self::Aes128Gcm => "aes128-gcm",
            Self::Aes256Gcm => "aes256-gcm",
        }
    }

    /// Returns the `EncryptionMethod` URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Aes128Cbc => "http://www.w3.org/2001/04/xmlenc#aes128-cbc",
            Self::Aes192Cbc => "http://www.w3.org/2001/04/xmlenc#aes192-cbc",
            Self::Aes256Cbc => "http://www.w3.org/2001/04/xmlenc#aes256-cbc",
            Self::Aes128Gcm => "http://www.w3.org/2009/xmlenc11#aes128-gcm",
            Self::Aes256Gcm => "http://www.w3.org/2009/xmlenc11#aes256-gcm",
        }
    }

    /// Parses an `EncryptionMethod` URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.uri() == uri)
    }

    /// Returns the key length in bytes.
    #[must_use]
    pub const fn key_len(self) -> usize {
        match self {
            Self::Aes128Cbc | Self::Aes128Gcm => 16,
            Self::Aes192Cbc => 24,
            Self::Aes256Cbc | Self::Aes256Gcm => 32,
        }
    }

    /// Generates a fresh session key of the right length.
    #[must_use]
    pub fn generate_key(self) -> Vec<u8> {
        random_bytes(self.key_len())
    }

    /// Encrypts `plaintext` under `key` with a random IV.
    ///
    /// # Errors
    ///
    /// Returns an error if the key length is wrong or the cipher fails.
    pub fn encrypt(self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.check_key(key)?;
        match self {
            Self::Aes128Cbc => cbc_encrypt::<aes::Aes128>(key, plaintext),
            Self::Aes192Cbc => cbc_encrypt::<aes::Aes192>(key, plaintext),
            Self::Aes256Cbc => cbc_encrypt::<aes::Aes256>(key, plaintext),
            Self::Aes128Gcm => gcm_encrypt::<Aes128Gcm>(key, plaintext),
            Self::Aes256Gcm => gcm_encrypt::<Aes256Gcm>(key, plaintext),
        }
    }

    /// Decrypts data produced by [`BlockEncryption::encrypt`] or by any
    /// XML-Encryption implementation.
    ///
    /// # Errors
    ///
    /// Returns an error if the key length is wrong, the data is truncated, or
    /// authentication fails.
    pub fn decrypt(self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.check_key(key)?;
        match self {
            Self::Aes128Cbc => cbc_decrypt::<aes::Aes128>(key, data),
            Self::Aes192Cbc => cbc_decrypt::<aes::Aes192>(key, data),
            Self::Aes256Cbc => cbc_decrypt::<aes::Aes256>(key, data),
            Self::Aes128Gcm => gcm_decrypt::<Aes128Gcm>(key, data),
            Self::Aes256Gcm => gcm_decrypt::<Aes256Gcm>(key, data),
        }
    }

    fn check_key(self, key: &[u8]) -> Result<(), CipherError> {
        if key.len() == self.key_len() {
            Ok(())
        } else {
            Err(CipherError::InvalidKeyLength {
                expected: self.key_len(),
                actual: key.len(),
            })
        }
    }
}

impl fmt::Display for BlockEncryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BlockEncryption {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|alg| alg.name().eq_ignore_ascii_case(s) || alg.uri() == s)
            .ok_or_else(|| CipherError::UnsupportedAlgorithm(s.to_string()))
    }
}

fn cbc_encrypt<C>(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CipherError>
where
    C: BlockEncryptMut + BlockCipher + KeyInit,
{
    let iv = random_bytes(CBC_IV_LEN);
    let encryptor = cbc::Encryptor::<C>::new_from_slices(key, &iv)
        .map_err(|e| CipherError::Encryption(format!("AES-CBC init: {e}")))?;
    let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = iv;
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn cbc_decrypt<C>(key: &[u8], data: &[u8]) -> Result<Vec<u8>, CipherError>
where
    C: BlockDecryptMut + BlockCipher + KeyInit,
{
    if data.len() < 2 * CBC_IV_LEN || data.len() % CBC_IV_LEN != 0 {
        return Err(CipherError::Decryption("AES-CBC data has invalid length".into()));
    }
    let (iv, ciphertext) = data.split_at(CBC_IV_LEN);
    let decryptor = cbc::Decryptor::<C>::new_from_slices(key, iv)
        .map_err(|e| CipherError::Decryption(format!("AES-CBC init: {e}")))?;
    // XML-Encryption only fixes the final padding byte.
    decryptor
        .decrypt_padded_vec_mut::<Iso10126>(ciphertext)
        .map_err(|e| CipherError::Decryption(format!("AES-CBC: {e}")))
}

fn gcm_encrypt<C>(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CipherError>
where
    C: Aead + AeadCore<NonceSize = U12> + KeyInit,
{
    let iv = random_bytes(GCM_IV_LEN);
    let cipher =
        C::new_from_slice(key).map_err(|e| CipherError::Encryption(format!("AES-GCM init: {e}")))?;
    let sealed = cipher
        .encrypt(Nonce::<C>::from_slice(&iv), plaintext)
        .map_err(|e| CipherError::Encryption(format!("AES-GCM: {e}")))?;

    let mut out = iv;
    out.extend_from_slice(&sealed);
    Ok(out)
}

fn gcm_decrypt<C>(key: &[u8], data: &[u8]) -> Result<Vec<u8>, CipherError>
where
    C: Aead + AeadCore<NonceSize = U12> + KeyInit,
{
    if data.len() < GCM_IV_LEN + GCM_TAG_LEN {
        return Err(CipherError::Decryption("AES-GCM data too short".into()));
    }
    let (iv, sealed) = data.split_at(GCM_IV_LEN);
    let cipher =
        C::new_from_slice(key).map_err(|e| CipherError::Decryption(format!("AES-GCM init: {e}")))?;
    cipher
        .decrypt(Nonce::<C>::from_slice(iv), sealed)
        .map_err(|e| CipherError::Decryption(format!("AES-GCM: {e}")))
}

/// Algorithm used to wrap the session key in `EncryptedKey`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum KeyTransport {
    /// RSA-OAEP with SHA-1 and MGF1-SHA1.
    #[default]
    #[serde(rename = "rsa-oaep-mgf1p")]
    RsaOaepMgf1p,
}

impl KeyTransport {
    /// Returns the `EncryptionMethod` URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::RsaOaepMgf1p => "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p",
        }
    }

    /// Returns the OAEP digest method URI carried inside `EncryptionMethod`.
    #[must_use]
    pub const fn digest_uri(self) -> &'static str {
        match self {
            Self::RsaOaepMgf1p => crate::algorithm::digest_uris::SHA1,
        }
    }

    /// Parses an `EncryptionMethod` URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        (uri == Self::RsaOaepMgf1p.uri()).then_some(Self::RsaOaepMgf1p)
    }

    /// Encrypts a session key for the holder of `recipient`'s private key.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Encryption`] if the key is too large for the modulus.
    pub fn wrap(self, recipient: &RsaPublicKey, session_key: &[u8]) -> Result<Vec<u8>, CipherError> {
        match self {
            Self::RsaOaepMgf1p => recipient
                .encrypt(&mut rand::thread_rng(), Oaep::new::<Sha1>(), session_key)
                .map_err(|e| CipherError::Encryption(format!("RSA-OAEP: {e}"))),
        }
    }

    /// Recovers a session key.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Decryption`] if the key was not wrapped for `key`.
    pub fn unwrap_key(self, key: &RsaPrivateKey, wrapped: &[u8]) -> Result<Vec<u8>, CipherError> {
        match self {
            Self::RsaOaepMgf1p => key
                .decrypt(Oaep::new::<Sha1>(), wrapped)
                .map_err(|e| CipherError::Decryption(format!("RSA-OAEP: {e}"))),
        }
    }
}
