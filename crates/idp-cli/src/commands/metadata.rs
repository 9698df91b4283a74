//! Metadata commands.

use std::sync::Arc;

use idp_saml::{
    FileMetadataFetcher, IdpMetadataBuilder, InMemoryMetadataStore, PersistedMetadata,
    ServiceProvider,
};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::MetadataCommand;
use crate::commands::local_registry;
use crate::config::OutputFormat;
use crate::output::{notice, render_rows, Notice};
use crate::CliConfig;

/// Runs a metadata command.
pub async fn run_metadata(
    cmd: MetadataCommand,
    config: &CliConfig,
    format: OutputFormat,
) -> crate::CliResult<()> {
    match cmd {
        MetadataCommand::Idp => print_idp_metadata(config),
        MetadataCommand::Refresh {
            sp,
            file,
            require_signature,
        } => {
            let rows = match (sp, file) {
                (Some(sp), Some(file)) => {
                    let file = file.to_string_lossy();
                    vec![refresh_from_file(config, &sp, &file, require_signature).await?]
                }
                (Some(sp), None) => vec![refresh_one(config, &sp, require_signature).await?],
                (None, _) => refresh_all(config).await?,
            };
            let refreshed = rows.iter().filter(|r| r.refreshed).count();
            render_rows(&rows, format)?;
            if refreshed == rows.len() {
                notice(Notice::Done, &format!("{refreshed} relying part(ies) refreshed"));
            } else {
                notice(Notice::Warn, &format!(
                    "{} of {} relying part(ies) not refreshed; see logs",
                    rows.len() - refreshed,
                    rows.len()
                ));
            }
            Ok(())
        }
    }
}

fn print_idp_metadata(config: &CliConfig) -> crate::CliResult<()> {
    let sso = config.idp.single_sign_on_url.as_deref().ok_or_else(|| {
        crate::CliError::Config("single_sign_on_url is required for metadata".to_string())
    })?;
    let signing = config.signing()?;
    let mut builder = IdpMetadataBuilder::new(&signing, &config.idp.issuer_uri, sso)
        .name_id_formats(config.idp.published_name_id_formats());
    if let Some(slo) = &config.idp.single_logout_url {
        builder = builder.single_logout_url(slo);
    }
    println!("{}", builder.signed()?);
    Ok(())
}

/// One line of refresh output.
#[derive(Debug, Serialize, Tabled)]
pub struct RefreshRow {
    /// Entity ID.
    #[tabled(rename = "Identifier")]
    pub identifier: String,
    /// Whether new metadata was accepted.
    #[tabled(rename = "Refreshed")]
    pub refreshed: bool,
    /// `WantAssertionsSigned` from the accepted metadata.
    #[tabled(rename = "Signed Assertions")]
    pub sign_assertions: bool,
    /// Default assertion consumer service.
    #[tabled(rename = "ACS")]
    pub acs: String,
}

impl RefreshRow {
    fn new(identifier: &str, metadata: Option<&PersistedMetadata>) -> Self {
        Self {
            identifier: identifier.to_string(),
            refreshed: metadata.is_some(),
            sign_assertions: metadata.is_some_and(|m| m.sign_assertions),
            acs: metadata
                .and_then(PersistedMetadata::default_acs)
                .map(|acs| acs.location.clone())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

async fn refresh_from_file(
    config: &CliConfig,
    identifier: &str,
    file: &str,
    require_signature: bool,
) -> crate::CliResult<RefreshRow> {
    let mut sp_config = config
        .idp
        .service_providers
        .iter()
        .find(|sp| sp.identifier == identifier)
        .cloned()
        .ok_or_else(|| crate::CliError::NotFound {
            resource_type: "service provider".to_string(),
            id: identifier.to_string(),
        })?;
    sp_config.metadata_url = Some(file.to_string());

    let sp = ServiceProvider::new(
        sp_config,
        Arc::new(FileMetadataFetcher::new()),
        Arc::new(InMemoryMetadataStore::new()),
    )?
    .with_fetch_timeout(config.idp.metadata_fetch_timeout());
    let require = require_signature || sp.should_validate_signature().await;
    let metadata = sp.try_refresh_metadata(require).await?;
    Ok(RefreshRow::new(identifier, Some(&*metadata)))
}

async fn refresh_one(
    config: &CliConfig,
    identifier: &str,
    require_signature: bool,
) -> crate::CliResult<RefreshRow> {
    let registry = local_registry(config)?;
    let sp = registry.get(identifier).ok_or_else(|| crate::CliError::NotFound {
        resource_type: "service provider".to_string(),
        id: identifier.to_string(),
    })?;
    let require = require_signature || sp.should_validate_signature().await;
    let metadata = sp.try_refresh_metadata(require).await?;
    Ok(RefreshRow::new(identifier, Some(&*metadata)))
}

async fn refresh_all(config: &CliConfig) -> crate::CliResult<Vec<RefreshRow>> {
    let registry = local_registry(config)?;
    let mut rows = Vec::new();
    for (identifier, _) in registry.refresh_all().await {
        let metadata = match registry.get(&identifier) {
            Some(sp) => sp.current_metadata().await?,
            None => None,
        };
        rows.push(RefreshRow::new(&identifier, metadata.as_deref()));
    }
    Ok(rows)
}
