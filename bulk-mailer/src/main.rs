//! BulkMail Send - one-shot campaign runner.
//!
//! Loads a recipient CSV and an HTML template, sends one personalized
//! message per unique recipient through SES (or the in-memory transport
//! with `--dry-run`), and prints the final tally. Ctrl+C stops the run
//! after the in-flight send.

use std::collections::HashMap;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bulkmail::{
    load_csv, AttachmentDir, Campaign, Config, DispatchEngine, DryRunTransport, LogObserver,
    RunContext, RunSummary, Sender, SesClient, SesConfig, TransportClient,
};

/// Send a personalized email campaign from a CSV file.
#[derive(Debug, Parser)]
#[command(name = "bulkmail-send", version, about)]
struct Cli {
    /// CSV file with an `email` column and one column per template variable
    #[arg(long)]
    recipients: PathBuf,

    /// Subject template, may reference `{{ variables }}`
    #[arg(long)]
    subject: String,

    /// HTML body template file
    #[arg(long)]
    body: PathBuf,

    /// Fallback value for a variable, as `name=value` (repeatable)
    #[arg(long = "default", value_parser = parse_default)]
    defaults: Vec<(String, String)>,

    /// Sends per second (overrides RATE_LIMIT_PER_SECOND)
    #[arg(long)]
    rate: Option<usize>,

    /// Recipients dispatched at once (overrides CONCURRENCY)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Directory for per-recipient attachments (overrides ATTACHMENT_DIR)
    #[arg(long)]
    attachment_dir: Option<PathBuf>,

    /// Log messages instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// Write the JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

fn parse_default(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected name=value, got '{raw}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    let cli = Cli::parse();

    // Load configuration from environment, then apply flags
    let mut config = Config::from_env();
    if let Some(rate) = cli.rate {
        config.rate_limit_per_second = rate.max(1);
    }
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency.max(1);
    }
    if let Some(dir) = cli.attachment_dir.clone() {
        config.attachment_dir = Some(dir);
    }
    info!(
        region = %config.aws_region,
        sender = %config.sender_email,
        rate_limit_per_second = config.rate_limit_per_second,
        concurrency = config.concurrency,
        attachment_dir = ?config.attachment_dir,
        dry_run = cli.dry_run,
        "config_loaded"
    );

    let campaign = load_campaign(&cli, &config)?;
    if campaign.is_empty() {
        bail!("no recipients with an email address in {}", cli.recipients.display());
    }
    info!(
        recipients = campaign.len(),
        variables = ?campaign.variables(),
        "campaign_loaded"
    );

    let transport: Arc<dyn TransportClient> = if cli.dry_run {
        Arc::new(DryRunTransport::new())
    } else {
        Arc::new(SesClient::new(SesConfig::from_config(&config)).await)
    };

    let context = RunContext::new(config.rate_limit_per_second, config.concurrency);
    let engine = DispatchEngine::new(
        transport,
        Sender::new(&config.sender_name, &config.sender_email),
        context.clone(),
        Arc::new(LogObserver),
    );

    // Stop the run on Ctrl+C/SIGTERM
    let cancel = context.cancel_token();
    let watcher = tokio::spawn(async move {
        tokio::select! {
            _ = shutdown_signal() => {
                warn!("campaign_interrupted");
                context.request_cancel();
            }
            _ = cancel.cancelled() => {}
        }
    });

    let result = engine.run(campaign).await;
    watcher.abort();
    let summary = result.context("Campaign could not start")?;

    print_summary(&summary);

    if let Some(path) = &cli.report {
        let file = File::create(path)
            .with_context(|| format!("Failed to create report {}", path.display()))?;
        serde_json::to_writer_pretty(file, &summary).context("Failed to write report")?;
        info!(path = %path.display(), "report_written");
    }

    Ok(())
}

/// Read the CSV and template files into a campaign.
fn load_campaign(cli: &Cli, config: &Config) -> Result<Campaign> {
    let file = File::open(&cli.recipients)
        .with_context(|| format!("Failed to open {}", cli.recipients.display()))?;
    let rows = load_csv(file)
        .with_context(|| format!("Failed to read {}", cli.recipients.display()))?;

    let body = std::fs::read_to_string(&cli.body)
        .with_context(|| format!("Failed to read {}", cli.body.display()))?;

    let defaults: HashMap<String, String> = cli.defaults.iter().cloned().collect();
    let mut campaign = Campaign::new(cli.subject.as_str(), &body, rows).with_defaults(defaults);
    if let Some(dir) = &config.attachment_dir {
        campaign = campaign.with_attachment_dir(AttachmentDir::new(dir));
    }
    Ok(campaign)
}

fn print_summary(summary: &RunSummary) {
    println!(
        "sent: {}  failed: {}  unprocessed: {}{}",
        summary.sent_count,
        summary.failed_count,
        summary.unprocessed(),
        if summary.cancelled { "  (cancelled)" } else { "" }
    );
    for failed in &summary.failed {
        println!("  failed {}: {}", failed.email, failed.error);
    }
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default() {
        assert_eq!(
            parse_default("name=there").unwrap(),
            ("name".to_string(), "there".to_string())
        );
        assert_eq!(
            parse_default("url=https://x.io/?a=b").unwrap(),
            ("url".to_string(), "https://x.io/?a=b".to_string())
        );
        assert!(parse_default("novalue").is_err());
        assert!(parse_default("=x").is_err());
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "bulkmail-send",
            "--recipients",
            "list.csv",
            "--subject",
            "Hi {{ name }}",
            "--body",
            "body.html",
            "--default",
            "name=friend",
            "--rate",
            "5",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(cli.rate, Some(5));
        assert!(cli.dry_run);
        assert_eq!(cli.defaults, vec![("name".to_string(), "friend".to_string())]);
        assert!(cli.report.is_none());
    }
}
