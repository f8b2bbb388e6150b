//! SMM Catalog Library
//!
//! A cached client for the service catalog of an SMM reseller panel. Consumers
//! build one `ServiceCache` and ask it for the catalog; the cache decides
//! whether memory, the persistent store or the catalog worker answers.

pub mod cache;
pub mod cli;
pub mod config;
pub mod data;

pub use cache::{CacheError, ServiceCache};
pub use config::CacheConfig;
pub use data::{Catalog, Service};
