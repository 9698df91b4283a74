//! Command implementations.

pub mod config;
pub mod metadata;
pub mod response;

pub use config::run_config;
pub use metadata::run_metadata;
pub use response::run_response;

use std::sync::Arc;

use idp_saml::{FileMetadataFetcher, InMemoryMetadataStore, ServiceProviderRegistry};

use crate::CliConfig;

/// Builds the relying party registry over local files and an in-memory store.
pub fn local_registry(config: &CliConfig) -> crate::CliResult<ServiceProviderRegistry> {
    let fetcher = match &config.idp.base_dir {
        Some(dir) => FileMetadataFetcher::with_base_dir(dir),
        None => FileMetadataFetcher::new(),
    };
    Ok(config
        .idp
        .registry(Arc::new(fetcher), Arc::new(InMemoryMetadataStore::new()))?)
}
