//! # df-nb CLI
//!
//! Command-line utilities for key allocation, version ordering and topics.

use anyhow::{Context, Result};
use df_nb_allocator::{AllocationAuthority, AuthoritySlot};
use df_nb_api::{connect_authority, ApiConfig};
use df_nb_core::{is_newer_than, PartitionName, Version};
use df_nb_proto::TopicScheme;
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), command = %args[1], "Starting df-nb");

    match args[1].as_str() {
        "allocate" => {
            if args.len() < 3 {
                eprintln!("Usage: df-nb allocate <partition> [count]");
                std::process::exit(1);
            }
            let partition = PartitionName::new(args[2].as_str()).context("Invalid partition")?;
            let count: usize = match args.get(3) {
                Some(count) => count.parse().context("Invalid count")?,
                None => 1,
            };
            allocate(&partition, count).await?;
        }
        "compare" => {
            if args.len() < 3 {
                eprintln!("Usage: df-nb compare <candidate> [reference]");
                std::process::exit(1);
            }
            let candidate = parse_version(&args[2]).context("Invalid candidate version")?;
            let reference = args
                .get(3)
                .map(|v| parse_version(v))
                .transpose()
                .context("Invalid reference version")?;

            if is_newer_than(candidate, reference) {
                println!("newer");
            } else {
                println!("not newer");
            }
        }
        "topic" => {
            if args.len() < 4 {
                eprintln!("Usage: df-nb topic <topic> <table>");
                std::process::exit(1);
            }
            let config = ApiConfig::from_env()?;
            let scheme = TopicScheme::new(config.events.tenant);
            println!("{}", scheme.table(Some(args[2].as_str()), &args[3]));
        }
        "help" | "--help" | "-h" => {
            print_help();
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn allocate(partition: &PartitionName, count: usize) -> Result<()> {
    let config = ApiConfig::from_env()?;

    let slot = AuthoritySlot::empty();
    slot.install(connect_authority(&config)?).await;

    let mut allocated = 0;
    let mut result = Ok(());
    for _ in 0..count {
        match slot.allocate_unique_key(partition).await {
            Ok(key) => {
                tracing::debug!(%partition, %key, "Allocated unique key");
                println!("{key}");
                allocated += 1;
            }
            Err(e) => {
                tracing::error!(%partition, allocated, error = %e, "Allocation failed");
                result = Err(e).with_context(|| format!("Allocation in '{partition}' failed"));
                break;
            }
        }
    }

    slot.shutdown().await;
    tracing::info!(%partition, allocated, requested = count, "Allocation finished");
    result
}

fn parse_version(value: &str) -> Result<Version> {
    value
        .parse()
        .with_context(|| format!("expected a non-negative integer, got '{value}'"))
}

fn print_help() {
    println!(
        r#"df-nb CLI

USAGE:
    df-nb <COMMAND> [OPTIONS]

COMMANDS:
    allocate <partition> [count]     Allocate unique keys from the configured authority
    compare <candidate> [reference]  Check whether a version supersedes another
    topic <topic> <table>            Print the MQTT topic for a table's updates
    help                             Show this help message

ENVIRONMENT:
    DFNB_AUTHORITY        memory, sqlite or http (default: memory)
    DFNB_AUTHORITY_URL    Allocation service URL
    DFNB_AUTHORITY_DB     SQLite key database path
    DFNB_TENANT           Tenant used in topics

EXAMPLES:
    DFNB_AUTHORITY=sqlite df-nb allocate lport 3
    df-nb compare 5 3
    df-nb compare 4
    df-nb topic tenant-a lport
"#
    );
}
