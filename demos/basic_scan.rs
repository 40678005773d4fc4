//! Basic scan example: scan a file through a running clamd.
//!
//! This example shows how to:
//! - Configure a `ClamdScanner`
//! - Check the daemon is alive and print its version
//! - Scan a file and handle every verdict
//!
//! Run with: cargo run --example basic_scan -- <file> [tcp-address | socket-path]

use clamstream::prelude::*;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,clamstream=debug".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let file = PathBuf::from(args.next().ok_or("usage: basic_scan <file> [address]")?);
    let config = match args.next() {
        Some(addr) if addr.contains(':') => ClamdConfig::tcp(addr),
        Some(path) => ClamdConfig::unix(path),
        None => ClamdConfig::default(),
    };

    println!("=== Clamstream Basic Scan Example ===\n");
    let scanner = ClamdScanner::new(config)?;

    scanner.health_check().await?;
    if let Some(version) = scanner.signature_version().await {
        println!("Daemon: {version}");
    }

    let context = ScanContext::new()
        .with_request_id("req-456")
        .with_source("cli");
    let report = scanner.scan(ScanInput::from_path(&file), context).await?;

    println!("\n=== Scan Results ===");
    println!("Report ID: {}", report.id);
    println!("Peer: {}", report.peer);
    println!("Bytes scanned: {}", report.bytes_scanned);
    println!("Digest: {}", report.digest);
    println!("Duration: {:?}", report.duration);

    match &report.verdict {
        Verdict::Clean => println!("\n{} is CLEAN", file.display()),
        Verdict::Infected { names } => {
            println!("\n{} is INFECTED", file.display());
            for name in names {
                println!("  - {name}");
            }
        }
        Verdict::Inconclusive { response } => println!("\nNo verdict: {response}"),
        Verdict::Error { kind, detail } => {
            println!("\nScan failed [{kind}]: {detail}");
            std::process::exit(2);
        }
    }

    Ok(())
}
