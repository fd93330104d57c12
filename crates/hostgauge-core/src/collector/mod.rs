//! Host metric collectors.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Scheduler                           │
//! │  ┌──────────────────┐ ┌──────────────┐ ┌──────────────────┐  │
//! │  │ DiskIoCollector  │ │ CpuCollector │ │ MemoryCollector  │  │
//! │  │ - iostat -d -x   │ │ - /proc/stat │ │ - /proc/meminfo  │  │
//! │  └────────┬─────────┘ └──────┬───────┘ └────────┬─────────┘  │
//! │           │                  │                  │            │
//! │   ┌───────▼───────┐        ┌─▼──────────────────▼─┐          │
//! │   │ CommandRunner │        │      FileSystem      │ (traits) │
//! │   └───────┬───────┘        └──────────┬───────────┘          │
//! └───────────┼───────────────────────────┼──────────────────────┘
//!             │                           │
//!      ┌──────┴──────┐             ┌──────┴──────┐
//!      │ RealCommand │             │   RealFs    │
//!      │ MockCommand │             │   MockFs    │
//!      └─────────────┘             └─────────────┘
//! ```
//!
//! Every collector writes only its own metric families into the shared
//! [`MetricRegistry`](crate::registry::MetricRegistry). A collector parses all
//! of its input before it writes anything, so a failed cycle leaves the last
//! published values in place.
//!
//! # Usage
//!
//! ```
//! use hostgauge_core::MetricRegistry;
//! use hostgauge_core::collector::{Collector, MemoryCollector, MockFs};
//!
//! let registry = MetricRegistry::new().unwrap();
//! let collector = MemoryCollector::new(MockFs::typical_system(), "/proc");
//! collector.collect(&registry).unwrap();
//! assert!(registry.render_snapshot().unwrap().contains("mem_total 16384000"));
//! ```

pub mod cpu;
pub mod disk;
pub mod memory;
pub mod mock;
pub mod parser;
pub mod traits;

pub use cpu::CpuCollector;
pub use disk::DiskIoCollector;
pub use memory::MemoryCollector;
pub use mock::{MockCommand, MockFs};
pub use parser::{DiskColumns, ParseError};
pub use traits::{CommandOutput, CommandRunner, FileSystem, RealCommand, RealFs};

use crate::registry::{MetricRegistry, RegistryError};

/// Error type for a failed collection cycle.
#[derive(Debug)]
pub enum CollectError {
    /// I/O error reading a pseudo-file.
    Io(std::io::Error),
    /// External program could not be run or did not succeed.
    Command { program: String, message: String },
    /// Input could not be interpreted.
    Parse(String),
    /// Publishing into the registry failed.
    Registry(RegistryError),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::Io(e) => write!(f, "I/O error: {}", e),
            CollectError::Command { program, message } => {
                write!(f, "command {} failed: {}", program, message)
            }
            CollectError::Parse(msg) => write!(f, "parse error: {}", msg),
            CollectError::Registry(e) => write!(f, "registry error: {}", e),
        }
    }
}

impl std::error::Error for CollectError {}

impl From<std::io::Error> for CollectError {
    fn from(e: std::io::Error) -> Self {
        CollectError::Io(e)
    }
}

impl From<ParseError> for CollectError {
    fn from(e: ParseError) -> Self {
        CollectError::Parse(e.message)
    }
}

impl From<RegistryError> for CollectError {
    fn from(e: RegistryError) -> Self {
        CollectError::Registry(e)
    }
}

/// One independently fallible source of gauges.
///
/// `collect` may block (sleeping through a sampling window or waiting on a
/// subprocess); the scheduler runs it off the async runtime.
pub trait Collector: Send + Sync {
    /// Short name used in logs and tick reports.
    fn name(&self) -> &'static str;

    /// Samples the subsystem and publishes into `registry`.
    ///
    /// Returns the number of gauges written.
    fn collect(&self, registry: &MetricRegistry) -> Result<usize, CollectError>;
}
