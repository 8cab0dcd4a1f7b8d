use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use trdm_protocol::AuthMethod;
use trdm_types::{TableIdentifier, Watermark};

use crate::config::LogFormat;

#[derive(Parser, Debug)]
#[command(
    name = "trdm",
    about = "Keeps local LOA and TAC tables in step with TRDM",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true, default_value = "trdm.toml", env = "TRDM_CONFIG")]
    pub config: PathBuf,

    /// Log filter, e.g. `info` or `trdm_sync=debug`
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one sync cycle per table and exit
    Sync(SyncArgs),
    /// Sync now and then on a fixed interval until interrupted
    Schedule(ScheduleArgs),
    /// Print a signed SOAP envelope without sending it
    Envelope(EnvelopeArgs),
    /// Load and validate the configuration and key material
    CheckConfig,
}

#[derive(Args, Debug, Default)]
pub struct SyncArgs {
    /// Table to sync; repeat for several. Defaults to the configured tables.
    #[arg(short, long = "table", value_parser = parse_table)]
    pub tables: Vec<TableIdentifier>,

    #[arg(long, value_parser = parse_auth)]
    pub auth: Option<AuthMethod>,
}

#[derive(Args, Debug)]
pub struct ScheduleArgs {
    #[command(flatten)]
    pub sync: SyncArgs,

    #[arg(long)]
    pub interval_secs: Option<u64>,
}

#[derive(Args, Debug)]
pub struct EnvelopeArgs {
    #[arg(short, long, value_parser = parse_table)]
    pub table: TableIdentifier,

    #[arg(long, value_enum, default_value = "last-update")]
    pub operation: EnvelopeOperation,

    /// `contentUpdatedSinceDateTime` for get-table; defaults to now
    #[arg(long, value_parser = parse_watermark)]
    pub since: Option<Watermark>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum EnvelopeOperation {
    LastUpdate,
    GetTable,
}

fn parse_table(s: &str) -> Result<TableIdentifier, String> {
    s.parse().map_err(|e| format!("{e}"))
}

fn parse_auth(s: &str) -> Result<AuthMethod, String> {
    s.parse()
}

fn parse_watermark(s: &str) -> Result<Watermark, String> {
    Watermark::parse(s).map_err(|e| format!("{e}"))
}
