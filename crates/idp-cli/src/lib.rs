//! # idp-cli
//!
//! Operator tools for the SAML identity provider.
//!
//! This crate provides command-line utilities for:
//! - Building a signed (or encrypted) response for a principal
//! - Printing the IdP's signed metadata
//! - Refreshing relying party metadata from local files through the trust gate
//! - Checking configuration and key material

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;

pub use cli::Cli;
pub use config::CliConfig;
pub use error::{CliError, CliResult};
