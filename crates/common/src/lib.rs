#![deny(missing_docs)]

//! Shared configuration, error types, IDs, and observability primitives for
//! FlowShuffle crates.
//!
//! Architecture role:
//! - defines tracker configuration passed across authority/client layers
//! - provides common [`FshError`] / [`Result`] contracts
//! - hosts typed block/location identifiers and the metrics registry
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`ids`]
//! - [`metrics`]

/// Shared tracker configuration types.
pub mod config;
/// Shared error taxonomy.
pub mod error;
/// Strongly-typed identifier wrappers.
pub mod ids;
/// Metrics registry and Prometheus rendering helpers.
pub mod metrics;

pub use config::TrackerConfig;
pub use error::{FshError, Result};
pub use ids::{BlockManagerId, ShuffleBlockId};
pub use metrics::{global_metrics, MetricsRegistry};
