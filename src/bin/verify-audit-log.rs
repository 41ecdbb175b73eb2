use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, Command};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use audit_ledger::audit::entry::AuditEntry;
use audit_ledger::audit::merkle::{merkle_root, DEFAULT_WINDOW};
use audit_ledger::audit::{load_journal_file, IntegrityVerifier};
use audit_ledger::crypto::{EntrySigner, SigningKey};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let matches = Command::new("verify-audit-log")
        .version("1.0.0")
        .about("Verify an audit ledger JSONL journal offline")
        .arg(
            Arg::new("log-path")
                .short('l')
                .long("log-path")
                .value_name("PATH")
                .help("Path to the JSONL journal")
                .required(true),
        )
        .arg(
            Arg::new("key")
                .short('k')
                .long("key")
                .value_name("PATH")
                .help("Path to the hex signing key")
                .required(true),
        )
        .arg(
            Arg::new("merkle-root")
                .short('m')
                .long("merkle-root")
                .value_name("HASH")
                .help("Expected Merkle root over all entry hashes"),
        )
        .arg(
            Arg::new("window")
                .short('w')
                .long("window")
                .value_name("N")
                .value_parser(clap::value_parser!(usize))
                .help("Checkpoint window the ledger was written with"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable verbose output"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Suppress output except errors"),
        )
        .get_matches();

    let verbose = matches.get_flag("verbose");
    let quiet = matches.get_flag("quiet");

    // Set log level based on flags
    let level = if quiet {
        tracing::Level::ERROR
    } else if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let log_path = matches
        .get_one::<String>("log-path")
        .ok_or_else(|| anyhow!("--log-path is required"))?;
    let key_path = matches
        .get_one::<String>("key")
        .ok_or_else(|| anyhow!("--key is required"))?;
    let expected_merkle_root = matches.get_one::<String>("merkle-root");
    let window = matches
        .get_one::<usize>("window")
        .copied()
        .unwrap_or(DEFAULT_WINDOW);

    match verify_journal(log_path, key_path, expected_merkle_root, window, verbose) {
        Ok(true) => {
            if !quiet {
                println!("✓ Audit ledger verification completed successfully");
            }
            Ok(())
        }
        Ok(false) => {
            error!("Audit ledger verification found integrity failures");
            std::process::exit(1);
        }
        Err(e) => {
            error!("Audit ledger verification failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn verify_journal(
    log_path: &str,
    key_path: &str,
    expected_merkle_root: Option<&String>,
    window: usize,
    verbose: bool,
) -> Result<bool> {
    info!("Verifying audit ledger: {}", log_path);

    if !Path::new(log_path).exists() {
        return Err(anyhow!("Journal not found: {}", log_path));
    }

    let key = SigningKey::load(Path::new(key_path))?;
    let signer = EntrySigner::new(key);

    let entries: Vec<Arc<AuditEntry>> = load_journal_file(Path::new(log_path))?
        .into_iter()
        .map(Arc::new)
        .collect();
    if entries.is_empty() {
        return Err(anyhow!("Journal is empty"));
    }

    if verbose {
        println!("Loaded {} entries (key {})", entries.len(), signer.key_fingerprint());
    }

    let result = IntegrityVerifier::new(&signer, window).verify(&entries, 0, entries.len() - 1);
    println!("{}", result.summary());
    for failure in result
        .signature_failures
        .iter()
        .chain(&result.chain_breaks)
        .chain(&result.sealed_field_issues)
    {
        println!("  [{}] {:?}: {}", failure.index, failure.kind, failure.detail);
    }

    let hashes: Vec<&str> = entries.iter().map(|e| e.chain.hash.as_str()).collect();
    let root = merkle_root(&hashes)?;
    let mut root_matches = true;
    if let Some(expected) = expected_merkle_root {
        info!("Verifying Merkle root against expected value");
        root_matches = &root == expected;
        if root_matches {
            println!("✓ Merkle root matches expected value");
        } else {
            println!("✗ Merkle root mismatch. Expected: {}, Got: {}", expected, root);
        }
    }

    if verbose {
        let first = &entries[0];
        let last = &entries[entries.len() - 1];
        println!("\nAudit Ledger Summary:");
        println!("  Total entries: {}", entries.len());
        println!("  First entry: {}", first.timestamp);
        println!("  Last entry: {}", last.timestamp);
        println!("  Merkle root: {}", root);
        println!("  Head hash: {}", last.chain.hash);

        let mut event_types: BTreeMap<&str, usize> = BTreeMap::new();
        for entry in &entries {
            *event_types.entry(entry.event_type.as_str()).or_insert(0) += 1;
        }
        println!("\nEvent type distribution:");
        for (event_type, count) in event_types {
            println!("  {}: {}", event_type, count);
        }
    }

    Ok(result.verified && root_matches)
}
