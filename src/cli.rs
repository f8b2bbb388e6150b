//! Command-line interface parsing for the catalog CLI
//!
//! This module handles parsing of CLI arguments using clap and merges them
//! with environment configuration into the settings the binary runs with.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::config::{CacheConfig, ConfigError};
use crate::data::query::DEFAULT_PAGE_SIZE;
use crate::data::ServiceQuery;

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The catalog URL is not an http(s) URL
    #[error("Invalid catalog URL: '{0}'. Expected an http:// or https:// URL")]
    InvalidUrl(String),

    /// A page size of zero was requested
    #[error("Invalid limit: must be at least 1")]
    InvalidLimit,

    /// The environment held an invalid setting
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// SMM Catalog - browse the panel's service catalog through a local cache
#[derive(Parser, Debug)]
#[command(name = "smm-catalog")]
#[command(about = "Browse the SMM panel service catalog with local caching")]
#[command(version)]
pub struct Cli {
    /// Base URL of the catalog worker (overrides CATALOG_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub url: Option<String>,

    /// Directory for the persisted catalog (defaults to the XDG cache dir)
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Log cache decisions to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// What to do with the catalog
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List services, optionally filtered by category or search term
    List {
        /// Only show services in this category
        #[arg(long, short)]
        category: Option<String>,

        /// Match against service name or id
        #[arg(long, short)]
        search: Option<String>,

        /// Number of matches to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Number of matches to show
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: usize,
    },
    /// List the distinct service categories
    Categories,
    /// Show what the memory and persisted caches hold
    Status,
    /// Remove the persisted catalog
    Clear,
}

impl Default for Command {
    fn default() -> Self {
        Command::List {
            category: None,
            search: None,
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Command {
    /// The catalog query a `list` command asks for
    pub fn query(&self) -> Option<ServiceQuery> {
        match self {
            Command::List {
                category,
                search,
                offset,
                limit,
            } => Some(ServiceQuery {
                search: search.clone(),
                category: category.clone(),
                offset: *offset,
                limit: *limit,
            }),
            _ => None,
        }
    }
}

/// Settings derived from CLI arguments and the environment
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Cache configuration with CLI overrides applied
    pub cache: CacheConfig,
    /// Custom store directory, if any
    pub cache_dir: Option<PathBuf>,
    /// Command to run
    pub command: Command,
    /// Whether verbose logging was requested
    pub verbose: bool,
}

/// Validates a catalog URL argument
///
/// # Returns
/// * `Ok(String)` with surrounding whitespace removed
/// * `Err(CliError::InvalidUrl)` if the value is not an http(s) URL
pub fn parse_url_arg(s: &str) -> Result<String, CliError> {
    let url = s.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url.to_string())
    } else {
        Err(CliError::InvalidUrl(s.to_string()))
    }
}

impl RunConfig {
    /// Creates a RunConfig from parsed CLI arguments on top of `base`
    ///
    /// # Returns
    /// * `Ok(RunConfig)` with CLI flags taking precedence over `base`
    /// * `Err(CliError)` if a flag value is invalid
    pub fn from_cli(cli: &Cli, base: CacheConfig) -> Result<Self, CliError> {
        let mut cache = base;
        if let Some(url) = &cli.url {
            cache.catalog_url = parse_url_arg(url)?;
        }

        let command = cli.command.clone().unwrap_or_default();
        if let Command::List { limit: 0, .. } = command {
            return Err(CliError::InvalidLimit);
        }

        Ok(RunConfig {
            cache,
            cache_dir: cli.cache_dir.clone(),
            command,
            verbose: cli.verbose,
        })
    }

    /// Creates a RunConfig from CLI arguments and the process environment
    pub fn from_cli_and_env(cli: &Cli) -> Result<Self, CliError> {
        Self::from_cli(cli, CacheConfig::from_env()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_arg_accepts_http_and_https() {
        assert_eq!(
            parse_url_arg("https://worker.example.dev").unwrap(),
            "https://worker.example.dev"
        );
        assert_eq!(
            parse_url_arg(" http://localhost:8787 ").unwrap(),
            "http://localhost:8787"
        );
    }

    #[test]
    fn test_parse_url_arg_invalid() {
        let result = parse_url_arg("worker.example.dev");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Invalid catalog URL"));
        assert!(err.to_string().contains("worker.example.dev"));
    }

    #[test]
    fn test_cli_parse_no_args() {
        let cli = Cli::parse_from(["smm-catalog"]);
        assert!(cli.command.is_none());
        assert!(cli.url.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_parse_list_with_filters() {
        let cli = Cli::parse_from([
            "smm-catalog",
            "list",
            "--category",
            "Instagram",
            "-s",
            "followers",
            "--limit",
            "5",
        ]);
        assert_eq!(
            cli.command,
            Some(Command::List {
                category: Some("Instagram".to_string()),
                search: Some("followers".to_string()),
                offset: 0,
                limit: 5,
            })
        );
    }

    #[test]
    fn test_cli_parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["smm-catalog", "status", "--cache-dir", "/tmp/smm", "-v"]);
        assert_eq!(cli.command, Some(Command::Status));
        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/smm")));
        assert!(cli.verbose);
    }

    #[test]
    fn test_run_config_defaults_to_list() {
        let cli = Cli::parse_from(["smm-catalog"]);
        let config = RunConfig::from_cli(&cli, CacheConfig::default()).unwrap();
        assert_eq!(config.command, Command::default());
        assert_eq!(config.cache, CacheConfig::default());
        assert!(config.cache_dir.is_none());
    }

    #[test]
    fn test_run_config_url_flag_overrides_base() {
        let cli = Cli::parse_from(["smm-catalog", "--url", "http://localhost:8787", "clear"]);
        let config = RunConfig::from_cli(&cli, CacheConfig::default()).unwrap();
        assert_eq!(config.cache.catalog_url, "http://localhost:8787");
        assert_eq!(config.command, Command::Clear);
    }

    #[test]
    fn test_run_config_rejects_bad_url() {
        let cli = Cli::parse_from(["smm-catalog", "--url", "ftp://nope"]);
        let result = RunConfig::from_cli(&cli, CacheConfig::default());
        assert!(matches!(result, Err(CliError::InvalidUrl(_))));
    }

    #[test]
    fn test_run_config_rejects_zero_limit() {
        let cli = Cli::parse_from(["smm-catalog", "list", "--limit", "0"]);
        let result = RunConfig::from_cli(&cli, CacheConfig::default());
        assert!(matches!(result, Err(CliError::InvalidLimit)));
    }

    #[test]
    fn test_command_query_only_for_list() {
        let query = Command::default().query().expect("list has a query");
        assert_eq!(query, ServiceQuery::default());
        assert!(Command::Status.query().is_none());
    }
}
