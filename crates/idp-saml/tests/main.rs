//! Integration tests for response generation and relying party trust.
//!
//! Everything runs against the RSA fixtures in the workspace `fixtures/`
//! directory; no network access is needed.

mod common;
mod responses;
mod trust_registry;
