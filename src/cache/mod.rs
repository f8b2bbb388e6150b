//! Cache module for the service catalog
//!
//! This module provides the `ServiceCache` coordinator, which keeps the catalog
//! in process memory and in a persistent key-value store with a fixed freshness
//! window. It supports graceful degradation by serving an expired persisted
//! catalog when the network is unavailable.

pub mod clock;
mod coordinator;
pub mod store;

pub use clock::{is_fresh, Clock, ManualClock, SystemClock};
pub use coordinator::{CacheError, CacheStatus, EntryStatus, ServiceCache};
pub use store::{FileStore, KeyValueStore, MemoryStore, StorageError};
