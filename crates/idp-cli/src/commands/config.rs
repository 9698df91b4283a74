//! Configuration commands.

use idp_crypto::DigestAlgorithm;

use crate::cli::ConfigCommand;
use crate::commands::local_registry;
use crate::output::{notice, Notice};
use crate::CliConfig;

/// Runs a config command.
pub fn run_config(cmd: ConfigCommand, config: &CliConfig) -> crate::CliResult<()> {
    match cmd {
        ConfigCommand::Path => {
            println!("{}", config.path.display());
            Ok(())
        }
        ConfigCommand::Check => check(config),
    }
}

fn check(config: &CliConfig) -> crate::CliResult<()> {
    let signing = config.signing()?;
    notice(Notice::Note, &format!(
        "signing certificate {}",
        signing.certificate().fingerprint(DigestAlgorithm::Sha256)
    ));
    let registry = local_registry(config)?;
    notice(Notice::Done, &format!(
        "{} is valid: issuer {}, {} relying part(ies), {}",
        config.path.display(),
        config.idp.issuer_uri,
        registry.len(),
        signing.algorithm
    ));
    Ok(())
}
