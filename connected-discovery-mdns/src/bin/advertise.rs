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

//! Advertise a service on the local network until interrupted
//!
//! Picks an address from the host's interfaces (or uses `--host`),
//! registers the service over mDNS, and withdraws it on Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use connected_discovery::{DiscoveryCoordinator, NetworkInterfaceResolver, ServiceRecord};
use connected_discovery_mdns::{MdnsBackend, SystemInterfaces};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "advertise")]
#[command(about = "Advertise a service on the local network via mDNS", long_about = None)]
struct Args {
    /// Instance name to advertise
    #[arg(long, default_value = "connected-device")]
    name: String,

    /// Service type, with or without the .local. suffix
    #[arg(long, default_value = "_connected._tcp")]
    service_type: String,

    /// Port the service listens on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Explicit address to advertise; picked from the interfaces when omitted
    #[arg(long)]
    host: Option<IpAddr>,

    /// Let mdns-sd advertise addresses from all interfaces instead
    #[arg(long)]
    auto_host: bool,

    /// Attribute to attach, as key=value (repeatable)
    #[arg(long = "attr", value_parser = parse_attr)]
    attrs: Vec<(String, String)>,
}

fn parse_attr(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(format!("expected key=value, got '{raw}'")),
    }
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
    println!("{}", "=== Service Advertiser ===".bright_cyan().bold());
    println!("{}: {}", "Name".bright_white(), args.name.bright_white());
    println!("{}: {}", "Type".bright_white(), args.service_type);
    println!("{}: {}", "Port".bright_white(), args.port);
    println!();

    match run_advertiser(&args).await {
        Ok(()) => {
            println!();
            println!("OK: Advertiser stopped");
            Ok(())
        }
        Err(e) => {
            println!();
            error!("Advertiser failed: {:?}", e);
            println!("FAIL: {e:?}");
            std::process::exit(1);
        }
    }
}

/// Advertise until Ctrl-C, then withdraw
async fn run_advertiser(args: &Args) -> Result<()> {
    // Step 1: Pick the address to advertise
    let host = match (&args.host, args.auto_host) {
        (Some(host), _) => Some(*host),
        (None, true) => None,
        (None, false) => {
            println!("WAIT: Picking a local address...");
            let resolver = NetworkInterfaceResolver::new(SystemInterfaces);
            let addr = resolver
                .first_usable_ipv4()
                .context("No usable IPv4 interface; try --auto-host")?;
            println!(
                "OK: Advertising address {}",
                addr.to_string().bright_white()
            );
            Some(IpAddr::V4(addr))
        }
    };

    // Step 2: Start the mDNS backend
    println!("WAIT: Starting mDNS backend...");
    let backend = MdnsBackend::new().context("Failed to start mDNS backend")?;
    let coordinator = DiscoveryCoordinator::new(Arc::new(backend));
    println!("OK: Backend ready");
    println!();

    // Step 3: Advertise
    let mut record = ServiceRecord::new(&args.name, &args.service_type, args.port);
    if let Some(host) = host {
        record = record.with_host(host);
    }
    if !args.attrs.is_empty() {
        record = record.with_attributes(args.attrs.iter().cloned().collect::<HashMap<_, _>>());
    }

    let handle = coordinator
        .advertise(record)
        .await
        .context("Failed to advertise")?;

    println!(
        "OK: Advertising {} on {}",
        args.name.bright_white(),
        handle.key().service_type.bright_white()
    );
    println!("{}", "Press Ctrl-C to stop...".bright_cyan());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    println!();
    println!("WAIT: Withdrawing advertisement...");
    coordinator.stop_advertising(handle).await;
    info!("Advertisement withdrawn");

    Ok(())
}
