use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;

use config::{LogFormat, TrdmConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let config = TrdmConfig::load(&cli.config)?;
    init_tracing(
        cli.log_level.as_deref(),
        config.log_level.as_deref(),
        cli.log_format.unwrap_or(config.log_format),
    );
    commands::run_command(cli, config).await
}

/// `--log-level` beats `RUST_LOG`, which beats `log_level` in the config.
fn init_tracing(flag: Option<&str>, configured: Option<&str>, format: LogFormat) {
    let filter = match flag {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(configured.unwrap_or("info"))),
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
