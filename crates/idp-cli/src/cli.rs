//! CLI argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use idp_crypto::DigestAlgorithm;

use crate::config::OutputFormat;

/// SAML identity provider operator tool.
#[derive(Debug, Parser)]
#[command(name = "idp")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (defaults to the user config directory).
    #[arg(short, long, env = "IDP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value = "table")]
    pub output: OutputFormat,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build a SAML response for a principal.
    Response(ResponseArgs),

    /// Metadata commands.
    #[command(subcommand)]
    Metadata(MetadataCommand),

    /// Configuration management.
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Arguments for `idp response`.
#[derive(Debug, Args)]
pub struct ResponseArgs {
    /// Relying party entity ID.
    #[arg(long)]
    pub sp: String,

    /// Subject name ID.
    #[arg(long)]
    pub name_id: String,

    /// Name ID format URI.
    #[arg(long)]
    pub name_id_format: Option<String>,

    /// Attribute as `name=value`; repeat a name for multiple values.
    #[arg(short, long = "attribute", value_name = "NAME=VALUE")]
    pub attributes: Vec<String>,

    /// `ID` of the request being answered.
    #[arg(long)]
    pub request_id: Option<String>,

    /// Assertion consumer service URL (overrides the relying party's).
    #[arg(long)]
    pub acs_url: Option<String>,

    /// Signature algorithm (overrides config).
    #[arg(long)]
    pub algorithm: Option<DigestAlgorithm>,

    /// Print XML instead of base64.
    #[arg(long)]
    pub xml: bool,
}

/// Metadata commands.
#[derive(Debug, Subcommand)]
pub enum MetadataCommand {
    /// Print the IdP's signed metadata.
    Idp,

    /// Refresh relying party metadata through the trust gate.
    Refresh {
        /// Only this relying party.
        #[arg(long)]
        sp: Option<String>,

        /// Read metadata from this file instead of the configured location.
        #[arg(long, requires = "sp")]
        file: Option<PathBuf>,

        /// Require a trusted signature even if the relying party does not.
        #[arg(long)]
        require_signature: bool,
    },
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the configuration file path.
    Path,

    /// Validate configuration and key material.
    Check,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn response_collects_repeated_attributes() {
        let cli = Cli::parse_from([
            "idp",
            "response",
            "--sp",
            "http://sp.example.com",
            "--name-id",
            "foo@example.com",
            "-a",
            "groups=staff",
            "-a",
            "groups=admins",
            "--algorithm",
            "sha512",
        ]);
        let Command::Response(args) = cli.command else {
            panic!("expected response command");
        };
        assert_eq!(args.attributes, ["groups=staff", "groups=admins"]);
        assert_eq!(args.algorithm, Some(DigestAlgorithm::Sha512));
    }

    #[test]
    fn refresh_file_requires_sp() {
        let result = Cli::try_parse_from(["idp", "metadata", "refresh", "--file", "sp.xml"]);
        assert!(result.is_err());
    }
}
