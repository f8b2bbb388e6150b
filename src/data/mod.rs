//! Core data models for the service catalog
//!
//! This module contains the `Service` type sold through the panel, the
//! metadata the catalog worker attaches to its responses, and the typed
//! decode step that turns a response body into a list of services.

pub mod query;
pub mod source;

pub use query::{categories, QueryPage, ServiceQuery};
pub use source::{CatalogSource, FetchError, HttpCatalogSource};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// A shared, immutable snapshot of the catalog
pub type Catalog = Arc<Vec<Service>>;

/// A sellable service as listed by the upstream SMM API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Identifier assigned by the upstream API
    #[serde(rename = "service", alias = "id")]
    pub id: u64,
    /// Display name
    pub name: String,
    /// Optional classification (e.g. "Default", "Custom Comments")
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Grouping shown in the dashboard
    pub category: String,
    /// Price per 1000 units, kept as a decimal string
    pub rate: String,
    /// Smallest orderable quantity
    pub min: u64,
    /// Largest orderable quantity
    pub max: u64,
    /// Any other upstream fields (`refill`, `cancel`, `dripfeed`, ...), kept as received
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Metadata the catalog worker sends alongside the services
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogMeta {
    /// Number of services the worker believes it returned
    #[serde(default)]
    pub count: Option<u64>,
    /// When the worker last synced with the upstream API
    #[serde(default)]
    pub last_sync: Option<String>,
}

/// A successfully decoded catalog response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCatalog {
    /// Services in source order
    pub services: Vec<Service>,
    /// Worker metadata, if the response was wrapped
    pub meta: Option<CatalogMeta>,
}

/// A response that carries the services under a `services` field
#[derive(Debug, Deserialize)]
struct WrappedCatalog {
    services: Vec<Service>,
    #[serde(default)]
    meta: Option<CatalogMeta>,
}

/// Decodes a catalog response body
///
/// Accepts either a bare array of services or an object carrying them under
/// `services`. Anything else (an object without `services`, a scalar, `null`,
/// or entries that are not service-shaped) is rejected with
/// `FetchError::InvalidShape` rather than read as an empty catalog. The
/// message keeps serde's reason and position.
pub fn decode_catalog(body: &[u8]) -> Result<DecodedCatalog, FetchError> {
    let first = body.iter().copied().find(|b| !b.is_ascii_whitespace());

    let decoded = match first {
        Some(b'[') => DecodedCatalog {
            services: serde_json::from_slice(body)
                .map_err(|e| FetchError::InvalidShape(format!("service list: {}", e)))?,
            meta: None,
        },
        Some(b'{') => {
            let wrapped: WrappedCatalog = serde_json::from_slice(body)
                .map_err(|e| FetchError::InvalidShape(format!("catalog object: {}", e)))?;
            DecodedCatalog {
                services: wrapped.services,
                meta: wrapped.meta,
            }
        }
        _ => {
            return Err(FetchError::InvalidShape(
                "expected a list of services or an object with `services`".to_string(),
            ))
        }
    };

    if let Some(count) = decoded.meta.as_ref().and_then(|meta| meta.count) {
        if count != decoded.services.len() as u64 {
            warn!(
                reported = count,
                received = decoded.services.len(),
                "catalog meta count disagrees with service list"
            );
        }
    }

    Ok(decoded)
}
