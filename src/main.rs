//! SMM Catalog - browse the service catalog of an SMM reseller panel
//!
//! Loads the catalog through the three-tier cache and prints it, its
//! categories, or the state of the cache.

use std::process::ExitCode;
use std::sync::Arc;

use chrono::Local;
use clap::Parser;
use reqwest::Client;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use smm_catalog::cache::{EntryStatus, FileStore, KeyValueStore, MemoryStore, ServiceCache};
use smm_catalog::cli::{Cli, Command, RunConfig};
use smm_catalog::data::{categories, HttpCatalogSource};

/// Installs the stderr log subscriber; `RUST_LOG` wins over `--verbose`
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "smm_catalog=debug" } else { "smm_catalog=warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Picks the persistent store: the requested directory, the XDG cache dir,
/// or memory when neither is available
fn open_store(config: &RunConfig) -> Arc<dyn KeyValueStore> {
    if let Some(dir) = &config.cache_dir {
        return Arc::new(FileStore::with_dir(dir.clone()));
    }
    match FileStore::new() {
        Some(store) => Arc::new(store),
        None => {
            warn!("no cache directory available, catalog will not be persisted");
            Arc::new(MemoryStore::new())
        }
    }
}

/// Renders one cache tier for `status`
fn describe_entry(label: &str, entry: Option<&EntryStatus>) -> String {
    match entry {
        None => format!("{:<10} empty", label),
        Some(entry) => {
            let fetched = entry
                .fetched_at
                .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let freshness = if entry.fresh { "fresh" } else { "expired" };
            format!(
                "{:<10} {} services, fetched {} ({})",
                label, entry.services, fetched, freshness
            )
        }
    }
}

/// Loads the catalog and carries out the requested command
async fn run(config: RunConfig) -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::builder()
        .user_agent(concat!("smm-catalog/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let source = Arc::new(HttpCatalogSource::with_client(
        client,
        config.cache.catalog_url.clone(),
    ));
    let store = open_store(&config);
    let cache = ServiceCache::new(config.cache.clone(), source, store);

    match &config.command {
        Command::List { .. } => {
            let services = cache.get_services().await?;
            let query = config.command.query().unwrap_or_default();
            let page = query.apply(&services);

            for service in &page.services {
                println!(
                    "{:>6}  {:<20} {:>10}  {:>8}-{:<10} {}",
                    service.id,
                    service.category,
                    service.rate,
                    service.min,
                    service.max,
                    service.name
                );
            }
            println!(
                "Showing {} of {} services",
                page.services.len(),
                page.total
            );
        }
        Command::Categories => {
            let services = cache.get_services().await?;
            for category in categories(&services) {
                println!("{}", category);
            }
        }
        Command::Status => {
            let status = cache.status();
            println!("{}", describe_entry("memory", status.memory.as_ref()));
            println!("{}", describe_entry("persisted", status.persisted.as_ref()));
        }
        Command::Clear => {
            cache.clear_cache();
            println!("Catalog cache cleared");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match RunConfig::from_cli_and_env(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {}", err);
            return ExitCode::FAILURE;
        }
    };
    setup_logging(config.verbose);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}
