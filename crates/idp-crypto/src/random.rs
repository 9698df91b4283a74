//! Cryptographically secure random generation.
//!
//! Session keys for XML-Encryption, cipher IVs and document identifiers all
//! come from here.

use rand::RngCore;

/// Generates `len` cryptographically secure random bytes.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Generates a document identifier.
///
/// The value is a UUIDv4 in hyphenated form. Callers emit it behind an
/// underscore (`_<id>`), which keeps the attribute a valid XML NCName.
#[must_use]
pub fn generate_reference_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
