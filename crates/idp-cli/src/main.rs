//! # idp
//!
//! Operator tool for the SAML identity provider.

#![forbid(unsafe_code)]

use clap::Parser;
use idp_cli::{
    cli::{Cli, Command, ConfigCommand},
    commands::{run_config, run_metadata, run_response},
    config::CliConfig,
    output::{notice, Notice},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr.
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // `config path` works without a readable file.
    if matches!(cli.command, Command::Config(ConfigCommand::Path)) && cli.config.is_none() {
        match CliConfig::default_path() {
            Ok(path) => println!("{}", path.display()),
            Err(e) => {
                notice(Notice::Fail, &e.to_string());
                std::process::exit(1);
            }
        }
        return;
    }

    let config = match CliConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            notice(Notice::Fail, &format!("failed to load configuration: {e}"));
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Response(args) => run_response(args, &config),
        Command::Metadata(cmd) => run_metadata(cmd, &config, cli.output).await,
        Command::Config(cmd) => run_config(cmd, &config),
    };

    if let Err(e) = result {
        notice(Notice::Fail, &e.to_string());
        std::process::exit(1);
    }
}
