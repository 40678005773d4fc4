//! Pass-through example: copy a file while clamd scans it.
//!
//! The copy and the scan progress side by side. The destination is
//! written whatever the verdict; a real service would hold the upload
//! back or delete it when the verdict says so.
//!
//! Run with: cargo run --example pass_through -- <src> <dst> [tcp-address | socket-path]

use clamstream::prelude::*;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(src), Some(dst)) = (args.next(), args.next()) else {
        return Err("usage: pass_through <src> <dst> [address]".into());
    };
    let config = match args.next() {
        Some(addr) if addr.contains(':') => ClamdConfig::tcp(addr),
        Some(path) => ClamdConfig::unix(path),
        None => ClamdConfig::default(),
    }
    .with_read_timeout(Duration::from_secs(60))
    .with_size_limit(25 * 1024 * 1024);

    let scanner = ClamdScanner::new(config)?;
    let source = tokio::fs::File::open(&src).await?;
    let sink = tokio::fs::File::create(&dst).await?;

    let context = ScanContext::new().with_source("pass-through");
    let (duplex, verdict) = scanner.pass_through(sink, context).await?;

    // Forwarding and the verdict complete independently; wait for both.
    let (forwarded, report) = tokio::join!(duplex.forward(source), verdict);

    match forwarded {
        Ok(bytes) => println!("Copied {bytes} bytes to {dst}"),
        Err(e) => println!("Copy stopped: {e}"),
    }

    let report = report?;
    match &report.verdict {
        Verdict::Clean => println!("Verdict: clean"),
        Verdict::Infected { names } => println!("Verdict: INFECTED ({})", names.join(", ")),
        Verdict::Inconclusive { response } => println!("Verdict: inconclusive ({response})"),
        Verdict::Error { kind, detail } => println!("Scan failed [{kind}]: {detail}"),
    }

    Ok(())
}
