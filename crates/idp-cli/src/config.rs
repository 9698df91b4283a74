//! CLI configuration.

use std::path::{Path, PathBuf};

use idp_saml::{IdpConfig, SigningContext};

/// Loaded IdP configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// File the configuration was read from.
    pub path: PathBuf,

    /// The IdP configuration, with environment overrides applied.
    pub idp: IdpConfig,
}

impl CliConfig {
    /// Loads configuration from `path`, or from the default location.
    pub fn load(path: Option<&Path>) -> crate::CliResult<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        if !path.exists() {
            return Err(crate::CliError::Config(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }
        let idp = IdpConfig::load(&path)?;
        Ok(Self { path, idp })
    }

    /// Gets the default configuration file path.
    pub fn default_path() -> crate::CliResult<PathBuf> {
        let dir = dirs_next::config_dir().ok_or_else(|| {
            crate::CliError::Config("could not determine configuration directory".to_string())
        })?;
        Ok(dir.join("idp").join("idp.toml"))
    }

    /// Loads the signing key and certificate.
    pub fn signing(&self) -> crate::CliResult<SigningContext> {
        Ok(SigningContext::from_config(&self.idp)?)
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
    /// Quiet (minimal output).
    Quiet,
}
