//! Core SAML types.

mod constants;
mod context;
mod principal;

pub use constants::*;
pub use context::*;
pub use principal::*;
