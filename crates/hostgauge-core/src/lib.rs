//! hostgauge-core - sampling and publishing core of the hostgauge exporter.
//!
//! Provides:
//! - `registry` - the shared gauge registry and its exposition rendering
//! - `collector` - disk I/O, CPU and memory collectors plus their OS seams
//! - `scheduler` - the tick loop that drives the collectors

pub mod collector;
pub mod registry;
pub mod scheduler;

pub use registry::{Family, MetricRegistry, RegistryError};

/// Crate version with the short git SHA it was built from.
pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("HOSTGAUGE_GIT_SHA"),
    ")"
);
