// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Scan the local network for services of one type
//!
//! Browses for the full window, resolves everything it finds, and prints
//! the result set.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use connected_discovery::DiscoveryCoordinator;
use connected_discovery_mdns::MdnsBackend;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "discover")]
#[command(about = "Scan the local network for mDNS services", long_about = None)]
struct Args {
    /// Service type to scan for
    #[arg(long, default_value = "_connected._tcp")]
    service_type: String,

    /// Scan window in seconds
    #[arg(short, long, default_value_t = 10)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    println!();
    println!("{}", "=== Service Scanner ===".bright_cyan().bold());
    println!("{}: {}", "Type".bright_white(), args.service_type);
    println!("{}: {}s", "Window".bright_white(), args.timeout);
    println!();

    match run_scan(&args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            println!();
            error!("Scan failed: {:?}", e);
            println!("FAIL: {e:?}");
            std::process::exit(1);
        }
    }
}

/// Scan for the full window and print what resolved
async fn run_scan(args: &Args) -> Result<()> {
    println!("WAIT: Starting mDNS backend...");
    let backend = MdnsBackend::new().context("Failed to start mDNS backend")?;
    let coordinator = DiscoveryCoordinator::new(Arc::new(backend));
    println!("OK: Backend ready");
    println!();

    println!("{}", "Scanning...".bright_cyan());
    let records = coordinator
        .discover(&args.service_type, Duration::from_secs(args.timeout))
        .await
        .context("Discovery failed")?;

    println!();
    if records.is_empty() {
        println!("- No services found");
        return Ok(());
    }

    println!("OK: Found {} service(s)", records.len());
    for record in &records {
        println!();
        println!("  {}", record.name.bright_white().bold());
        if let Some(host) = record.host {
            println!("    Address: {}:{}", host, record.port);
        }
        for (key, value) in &record.attributes {
            println!("    {key}: {value}");
        }
    }

    Ok(())
}
