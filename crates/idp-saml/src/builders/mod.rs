//! XML builders for assertions, encrypted assertions and responses.

mod assertion;
mod encryption;
mod response;

pub use assertion::AssertionBuilder;
pub use encryption::{decrypt_assertion, encrypt_assertion};
pub use response::ResponseBuilder;
