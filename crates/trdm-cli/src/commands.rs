use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use colored::Colorize;
use trdm_crypto::KeyMaterial;
use trdm_gateway::{
    AssumeRoleProvider, CredentialProvider, SigV4Signer, StaticCredentialProvider,
};
use trdm_protocol::{AuthMethod, SoapCodec, SoapOperation, RET_NS, RET_PREFIX};
use trdm_store::JsonFileRecordStore;
use trdm_sync::{
    AppContext, DeferredReconciler, GatewayClient, HttpTransport, Orchestrator, Scheduler,
    SyncOutcome, SyncReport, TableService, WsSecurityClient,
};
use trdm_types::{TableIdentifier, Watermark};
use trdm_wsse::EnvelopeBuilder;

use crate::cli::{Cli, Command, EnvelopeArgs, EnvelopeOperation, SyncArgs};
use crate::config::TrdmConfig;

/// Errors returned from here are configuration problems. Per-table sync
/// failures are printed and logged, never returned.
pub async fn run_command(cli: Cli, config: TrdmConfig) -> anyhow::Result<()> {
    match cli.command {
        Command::Sync(args) => cmd_sync(config, args).await,
        Command::Schedule(args) => {
            let interval = args.interval_secs.map(Duration::from_secs);
            cmd_schedule(config, args.sync, interval).await
        }
        Command::Envelope(args) => cmd_envelope(&config, args),
        Command::CheckConfig => cmd_check_config(&config),
    }
}

async fn cmd_sync(mut config: TrdmConfig, args: SyncArgs) -> anyhow::Result<()> {
    apply_sync_args(&mut config, &args);
    config.validate()?;
    let orchestrator = build_orchestrator(&config)?;

    let reports = orchestrator.sync_all(&config.sync.tables).await;
    print_reports(&reports);
    Ok(())
}

async fn cmd_schedule(
    mut config: TrdmConfig,
    args: SyncArgs,
    interval: Option<Duration>,
) -> anyhow::Result<()> {
    apply_sync_args(&mut config, &args);
    if let Some(interval) = interval {
        config.sync.interval_secs = interval.as_secs();
    }
    config.validate()?;
    let orchestrator = Arc::new(build_orchestrator(&config)?);
    let scheduler = Scheduler::new(orchestrator, config.sync.tables.clone());

    println!(
        "{} Scheduling {} every {}s (ctrl-c to stop)",
        "▶".cyan().bold(),
        table_list(&config.sync.tables).bold(),
        config.sync.interval_secs
    );
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    let rounds = scheduler
        .run_with(config.sync.interval(), shutdown, print_reports)
        .await;
    println!("{} Stopped after {} round(s).", "■".yellow(), rounds);
    Ok(())
}

fn cmd_envelope(config: &TrdmConfig, args: EnvelopeArgs) -> anyhow::Result<()> {
    let material = config.credentials.load()?;
    let op = match args.operation {
        EnvelopeOperation::LastUpdate => SoapOperation::GetLastTableUpdate { table: args.table },
        EnvelopeOperation::GetTable => SoapOperation::GetTable {
            table: args.table,
            content_updated_since: args.since.unwrap_or_else(Watermark::now),
        },
    };
    println!("{}", render_envelope(&material, config, &op)?);
    Ok(())
}

fn cmd_check_config(config: &TrdmConfig) -> anyhow::Result<()> {
    config.validate()?;
    println!("{} Configuration is valid", "✓".green().bold());
    println!("  Auth: {}", config.sync.auth.to_string().cyan());
    println!("  Tables: {}", table_list(&config.sync.tables));
    println!("  Interval: {}s", config.sync.interval_secs);
    println!("  Store: {}", config.sync.store_dir.display());

    match config.sync.auth {
        AuthMethod::WsSecurity => {
            let material = config.credentials.load()?;
            let cert = material.certificate();
            println!("  SOAP endpoint: {}", config.soap.url.blue());
            println!("  Certificate: {}", cert.subject());
            if cert.is_expired_at(Watermark::now().as_datetime()) {
                println!("  Expires: {} {}", cert.not_after(), "(expired)".red().bold());
            } else {
                println!("  Expires: {}", cert.not_after());
            }
        }
        AuthMethod::Gateway => {
            println!("  Gateway: {}", config.gateway.base_url.blue());
            println!("  Region: {}", config.gateway.region);
            match config.gateway.assume_role() {
                Some(role) => println!("  Role: {}", role.role_arn),
                None => println!("  Role: {}", "none (source credentials)".dimmed()),
            }
        }
    }
    Ok(())
}

fn apply_sync_args(config: &mut TrdmConfig, args: &SyncArgs) {
    if !args.tables.is_empty() {
        let mut tables = args.tables.clone();
        tables.sort_unstable();
        tables.dedup();
        config.sync.tables = tables;
    }
    if let Some(auth) = args.auth {
        config.sync.auth = auth;
    }
}

fn build_orchestrator(config: &TrdmConfig) -> anyhow::Result<Orchestrator> {
    let service = build_service(config)?;
    let store = JsonFileRecordStore::open(config.sync.store_dir.clone())
        .with_context(|| format!("opening store at {}", config.sync.store_dir.display()))?;
    Ok(Orchestrator::new(
        service,
        Arc::new(DeferredReconciler),
        AppContext::new(Arc::new(store)),
    )
    .with_call_timeout(config.soap.request_timeout()))
}

fn build_service(config: &TrdmConfig) -> anyhow::Result<Arc<dyn TableService>> {
    let timeout = config.soap.request_timeout();
    match config.sync.auth {
        AuthMethod::WsSecurity => {
            let material = Arc::new(config.credentials.load()?);
            let transport = HttpTransport::new(timeout)?.with_soap_url(config.soap.url.as_str());
            Ok(Arc::new(
                WsSecurityClient::new(material, Arc::new(transport))
                    .with_validity(config.soap.validity())
                    .with_action(config.soap.soap_action.as_str())
                    .with_verify_before_send(config.soap.verify_before_send),
            ))
        }
        AuthMethod::Gateway => {
            let source: Arc<dyn CredentialProvider> = Arc::new(
                StaticCredentialProvider::from_env().context("gateway source credentials")?,
            );
            let credentials: Arc<dyn CredentialProvider> = match config.gateway.assume_role() {
                Some(role) => Arc::new(AssumeRoleProvider::new(role, source, timeout)?),
                None => source,
            };
            Ok(Arc::new(GatewayClient::new(
                config.gateway.base_url.as_str(),
                SigV4Signer::new(config.gateway.region.as_str()),
                credentials,
                Arc::new(HttpTransport::new(timeout)?),
            )))
        }
    }
}

fn render_envelope(
    material: &KeyMaterial,
    config: &TrdmConfig,
    op: &SoapOperation,
) -> anyhow::Result<String> {
    let envelope = EnvelopeBuilder::new(material)
        .validity(config.soap.validity())
        .namespace(RET_PREFIX, RET_NS)
        .build(SoapCodec::encode_request(op))?
        .digest()?
        .sign(material.signing_key())?;
    envelope.verify(material.certificate())?;
    Ok(envelope.to_xml())
}

fn print_reports(reports: &[SyncReport]) {
    for report in reports {
        print_report(report);
    }
}

fn print_report(report: &SyncReport) {
    let table = report.table.to_string();
    let elapsed = format!("({} ms)", report.duration.as_millis()).dimmed();
    match &report.outcome {
        SyncOutcome::Aborted { kind, reason } => {
            println!("{} {} {} {}", "✗".red().bold(), table.bold(), "aborted".red(), elapsed);
            println!("    {}: {}", kind, reason);
        }
        SyncOutcome::Skipped { status } => {
            println!("{} {} {} {}", "~".yellow(), table.bold(), "skipped".yellow(), elapsed);
            println!("    TRDM status: {}", status);
        }
        SyncOutcome::UpToDate => {
            println!("{} {} {} {}", "✓".green().bold(), table.bold(), "up to date".green(), elapsed);
        }
        SyncOutcome::Synchronized { report: r } => {
            println!("{} {} {} {}", "✓".green().bold(), table.bold(), "synchronized".green().bold(), elapsed);
            println!(
                "    {} stale record(s), {} attachment byte(s), {} written",
                report.stale_count, r.attachment_bytes, r.records_written
            );
        }
        SyncOutcome::AlreadyRunning => {
            println!("{} {} {}", "…".dimmed(), table.bold(), "already running".dimmed());
        }
    }
    if let Some(remote) = &report.remote_watermark {
        println!("    last update: {}", remote.to_string().cyan());
    }
}

fn table_list(tables: &[TableIdentifier]) -> String {
    tables
        .iter()
        .map(TableIdentifier::physical_name)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const CERT_PEM: &str = include_str!("../../trdm-crypto/testdata/cert.pem");
    const KEY_PEM: &str = include_str!("../../trdm-crypto/testdata/key-pkcs1.pem");

    fn config() -> TrdmConfig {
        let mut config = TrdmConfig::default();
        config.soap.url = "https://trdm.example/ws".into();
        config.credentials.certificate_pem = Some(CERT_PEM.into());
        config.credentials.private_key_pem = Some(KEY_PEM.into());
        config
    }

    #[test]
    fn sync_args_override_config() {
        let mut c = config();
        apply_sync_args(
            &mut c,
            &SyncArgs {
                tables: vec![
                    TableIdentifier::TransportationAccountingCode,
                    TableIdentifier::TransportationAccountingCode,
                ],
                auth: Some(AuthMethod::Gateway),
            },
        );
        assert_eq!(c.sync.tables, vec![TableIdentifier::TransportationAccountingCode]);
        assert_eq!(c.sync.auth, AuthMethod::Gateway);

        let mut unchanged = config();
        apply_sync_args(&mut unchanged, &SyncArgs::default());
        assert_eq!(unchanged.sync, config().sync);
    }

    #[test]
    fn rendered_envelope_is_signed_get_table() {
        let c = config();
        let material = c.credentials.load().unwrap();
        let op = SoapOperation::GetTable {
            table: TableIdentifier::LineOfAccounting,
            content_updated_since: Watermark::parse("2020-01-27T16:14:20.000Z").unwrap(),
        };
        let xml = render_envelope(&material, &c, &op).unwrap();
        let root = trdm_wsse::xml::parse(&xml).unwrap();
        trdm_wsse::dsig::verify(&root, material.certificate()).unwrap();
        assert_eq!(
            root.find_local("contentUpdatedSinceDateTime").map(|e| e.text()),
            Some("2020-01-27T16:14:20.000Z".to_string())
        );
        assert_eq!(
            root.find_local("physicalName").map(|e| e.text()),
            Some("LN_OF_ACCT".to_string())
        );
    }

    #[test]
    fn check_config_fails_without_key_material() {
        let mut c = config();
        c.credentials.certificate_pem = None;
        assert!(cmd_check_config(&c).is_err());
        assert!(cmd_check_config(&config()).is_ok());
    }

    #[tokio::test]
    async fn sync_refuses_invalid_config_before_any_request() {
        let mut c = config();
        c.soap.url.clear();
        let err = cmd_sync(c, SyncArgs::default()).await.unwrap_err();
        assert!(err.to_string().contains("soap.url"));
    }

    #[test]
    fn table_list_uses_physical_names() {
        assert_eq!(table_list(&TableIdentifier::ALL), "LN_OF_ACCT, TRNSPRTN_ACNT");
    }
}
