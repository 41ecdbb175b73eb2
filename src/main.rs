//! Audit Ledger CLI
//!
//! Operator tool for appending to, searching, verifying and reporting on a
//! ledger configured through `LedgerConfig`.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audit_ledger::audit::catalog::{Category, Severity};
use audit_ledger::audit::entry::{Outcome, SourceContext};
use audit_ledger::audit::{Ledger, LogRequest, ReportSection, Requester, SearchCriteria};
use audit_ledger::config::LedgerConfig;
use audit_ledger::crypto::SigningKey;

#[derive(Parser)]
#[command(name = "audit-ledger")]
#[command(about = "Tamper-evident audit ledger")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); AUDIT_LEDGER_* variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a new random 32-byte key as hex
    Keygen {
        /// Destination file
        path: PathBuf,

        /// Overwrite an existing key
        #[arg(long)]
        force: bool,
    },

    #[command(flatten)]
    Ledger(LedgerCommand),
}

/// Subcommands that open the configured ledger.
#[derive(Subcommand)]
enum LedgerCommand {
    /// Append an event
    Log {
        /// Event type from the catalog
        event_type: String,

        /// Action performed
        #[arg(short, long)]
        action: String,

        #[arg(long)]
        actor: Option<String>,

        /// Subject identifier (sealed before storage)
        #[arg(long)]
        subject: Option<String>,

        #[arg(long, default_value = "")]
        resource_type: String,

        #[arg(long)]
        resource_id: Option<String>,

        #[arg(long, default_value = "success")]
        outcome: String,

        /// Additional details (key=value pairs)
        #[arg(short, long)]
        detail: Vec<String>,

        /// Source IP address
        #[arg(long)]
        ip: Option<String>,

        /// Id of an earlier entry this one corrects
        #[arg(long)]
        corrects: Option<String>,
    },

    /// Search entries, newest first
    Search {
        #[arg(long)]
        from: Option<DateTime<Utc>>,

        #[arg(long)]
        to: Option<DateTime<Utc>>,

        #[arg(long)]
        event_type: Vec<String>,

        #[arg(long)]
        category: Vec<Category>,

        #[arg(long)]
        severity: Vec<Severity>,

        #[arg(long)]
        actor: Vec<String>,

        #[arg(long)]
        subject: Vec<String>,

        #[arg(long)]
        resource_type: Vec<String>,

        #[arg(long)]
        outcome: Vec<String>,

        /// Case-insensitive free text
        #[arg(long)]
        text: Option<String>,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long)]
        limit: Option<usize>,

        /// Identity recorded on the access entry
        #[arg(long, default_value = "cli")]
        requester: String,
    },

    /// Verify chain integrity
    Verify {
        #[arg(long, default_value_t = 0)]
        start: usize,

        /// Last index to check (defaults to the tail)
        #[arg(long)]
        end: Option<usize>,

        /// Print the Merkle root of the verified range
        #[arg(long)]
        merkle: bool,
    },

    /// Generate a compliance report as JSON
    Report {
        /// Period start (defaults to 30 days ago)
        #[arg(long)]
        from: Option<DateTime<Utc>>,

        /// Period end (defaults to now)
        #[arg(long)]
        to: Option<DateTime<Utc>>,

        /// Detail sections (patient_access, security, administrative); all when omitted
        #[arg(long)]
        section: Vec<ReportSection>,

        #[arg(long, default_value = "cli")]
        requester: String,
    },

    /// List entries past their retention period
    Retention {
        /// Reference time (defaults to now)
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
    },

    /// Print the event catalog
    Catalog,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audit_ledger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen { path, force } => keygen(&path, force),
        Commands::Ledger(command) => run(command, cli.config.as_deref()).await,
    }
}

async fn run(command: LedgerCommand, config_path: Option<&Path>) -> Result<()> {
    let config = LedgerConfig::load(config_path).context("Failed to load configuration")?;
    info!("Configuration loaded for ledger {}", config.ledger_name);

    let ledger = Ledger::from_config(config).await.context("Failed to open ledger")?;

    match command {
        LedgerCommand::Log {
            event_type,
            action,
            actor,
            subject,
            resource_type,
            resource_id,
            outcome,
            detail,
            ip,
            corrects,
        } => {
            let mut request = LogRequest::new(&event_type, &action)
                .resource(&resource_type, resource_id.as_deref())
                .outcome(&outcome);
            if let Some(actor) = &actor {
                request = request.actor(actor);
            }
            if let Some(subject) = &subject {
                request = request.subject(subject);
            }
            if let Some(ip) = &ip {
                request = request.source(SourceContext::new(ip));
            }
            if let Some(corrects) = &corrects {
                request = request.corrects(corrects);
            }
            for pair in &detail {
                let (key, value) = parse_detail(pair)?;
                request = request.detail(key, value);
            }

            let receipt = ledger.log_event(request).await?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
        LedgerCommand::Search {
            from,
            to,
            event_type,
            category,
            severity,
            actor,
            subject,
            resource_type,
            outcome,
            text,
            offset,
            limit,
            requester,
        } => {
            let criteria = SearchCriteria {
                from,
                to,
                event_types: event_type,
                categories: category,
                severities: severity,
                actor_ids: actor,
                subject_ids: subject,
                resource_types: resource_type,
                outcomes: outcome.iter().map(|o| Outcome::normalize(o)).collect(),
                text,
                offset,
                limit,
            };

            let results = ledger.search(&criteria, &Requester::new(&requester)).await?;
            for entry in &results.entries {
                println!("{}", entry.summary());
            }
            println!(
                "Showing {} of {} (offset {}{})",
                results.entries.len(),
                results.total,
                results.offset,
                if results.has_more { ", more available" } else { "" }
            );
        }
        LedgerCommand::Verify { start, end, merkle } => {
            let end = end.unwrap_or(usize::MAX);
            let result = ledger.verify(start, end).await?;
            println!("{}", result.summary());
            for failure in result
                .signature_failures
                .iter()
                .chain(&result.chain_breaks)
                .chain(&result.sealed_field_issues)
            {
                println!("  [{}] {:?}: {}", failure.index, failure.kind, failure.detail);
            }
            if merkle {
                let root = ledger.merkle_root(result.start_index, result.end_index).await?;
                println!("Merkle root: {}", root);
            }
            if !result.verified {
                std::process::exit(1);
            }
        }
        LedgerCommand::Report {
            from,
            to,
            section,
            requester,
        } => {
            let end = to.unwrap_or_else(Utc::now);
            let start = from.unwrap_or_else(|| end - Duration::days(30));
            let sections = if section.is_empty() {
                ReportSection::ALL.to_vec()
            } else {
                section
            };

            let report = ledger
                .generate_report(start, end, &sections, &Requester::new(&requester))
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        LedgerCommand::Retention { as_of } => {
            let due = ledger.retention_due(as_of.unwrap_or_else(Utc::now)).await;
            if due.is_empty() {
                println!("No entries past retention");
            }
            for notice in due {
                println!(
                    "[{}] {} {} due {}",
                    notice.index, notice.event_type, notice.entry_id, notice.due_at
                );
            }
        }
        LedgerCommand::Catalog => {
            let catalog = ledger.catalog();
            println!("Event catalog {} ({} types)", catalog.version, catalog.len());
            for (name, entry) in catalog.iter() {
                println!(
                    "  {:<30} {:<15} {:<9} {:>5}d  {}",
                    name, entry.category, entry.severity, entry.retention_days, entry.description
                );
            }
        }
    }

    Ok(())
}

fn keygen(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(anyhow!("{:?} already exists; pass --force to overwrite", path));
    }
    let key = SigningKey::generate();
    key.save(path)?;
    println!("Wrote key {} to {:?}", key.fingerprint(), path);
    Ok(())
}

fn parse_detail(pair: &str) -> Result<(&str, &str)> {
    pair.split_once('=')
        .map(|(k, v)| (k.trim(), v.trim()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| anyhow!("Invalid detail {:?}; expected key=value", pair))
}
