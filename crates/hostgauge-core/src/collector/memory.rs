//! Memory and swap collector backed by `/proc/meminfo`.

use std::path::Path;

use tracing::info;

use crate::collector::parser::{MemInfoField, parse_meminfo};
use crate::collector::traits::FileSystem;
use crate::collector::{CollectError, Collector};
use crate::registry::{Family, MetricRegistry};

/// Publishes the eight memory/swap scalars, in kB as the kernel reports them.
pub struct MemoryCollector<F: FileSystem> {
    fs: F,
    proc_path: String,
}

impl<F: FileSystem> MemoryCollector<F> {
    /// Creates a new memory collector.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
        }
    }
}

fn family_for(field: MemInfoField) -> Family {
    match field {
        MemInfoField::MemTotal => Family::MemTotal,
        MemInfoField::MemFree => Family::MemFree,
        MemInfoField::MemAvailable => Family::MemAvailable,
        MemInfoField::Buffers => Family::MemBuffers,
        MemInfoField::Cached => Family::MemCached,
        MemInfoField::SwapTotal => Family::SwapTotal,
        MemInfoField::SwapFree => Family::SwapFree,
        MemInfoField::SwapCached => Family::SwapCached,
    }
}

impl<F: FileSystem> Collector for MemoryCollector<F> {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn collect(&self, registry: &MetricRegistry) -> Result<usize, CollectError> {
        let path = format!("{}/meminfo", self.proc_path);
        let content = self.fs.read_to_string(Path::new(&path))?;
        let values = parse_meminfo(&content)?;

        for &(field, value) in &values {
            registry.set_gauge(family_for(field), &[], value as f64)?;
        }

        info!(gauges = values.len(), "memory stats collected");
        Ok(values.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    fn registry() -> MetricRegistry {
        MetricRegistry::new().unwrap()
    }

    #[test]
    fn test_collect_typical_system() {
        let registry = registry();
        let collector = MemoryCollector::new(MockFs::typical_system(), "/proc");

        assert_eq!(collector.collect(&registry).unwrap(), 8);
        assert_eq!(registry.value(Family::MemTotal, &[]), Some(16384000.0));
        assert_eq!(registry.value(Family::MemFree, &[]), Some(8192000.0));
        assert_eq!(registry.value(Family::MemAvailable, &[]), Some(12000000.0));
        assert_eq!(registry.value(Family::MemBuffers, &[]), Some(512000.0));
        assert_eq!(registry.value(Family::MemCached, &[]), Some(2048000.0));
        assert_eq!(registry.value(Family::SwapTotal, &[]), Some(4096000.0));
        assert_eq!(registry.value(Family::SwapFree, &[]), Some(4096000.0));
        assert_eq!(registry.value(Family::SwapCached, &[]), Some(0.0));
    }

    #[test]
    fn test_unrecognized_keys_never_create_gauges() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/meminfo", "MemTotal:  16384000 kB\nBogus: 5 kB\n");
        let registry = registry();

        MemoryCollector::new(fs, "/proc").collect(&registry).unwrap();

        let text = registry.render_snapshot().unwrap();
        assert!(text.contains("mem_total 16384000\n"));
        assert!(!text.contains("bogus"));
        assert_eq!(registry.value(Family::MemFree, &[]), None);
    }

    #[test]
    fn test_collect_is_idempotent() {
        let registry = registry();
        let collector = MemoryCollector::new(MockFs::typical_system(), "/proc");

        collector.collect(&registry).unwrap();
        let first = registry.render_snapshot().unwrap();
        collector.collect(&registry).unwrap();
        assert_eq!(registry.render_snapshot().unwrap(), first);
    }

    #[test]
    fn test_missing_file_keeps_previous_values() {
        let registry = registry();
        MemoryCollector::new(MockFs::typical_system(), "/proc")
            .collect(&registry)
            .unwrap();

        let mut fs = MockFs::typical_system();
        fs.remove_file("/proc/meminfo");
        let err = MemoryCollector::new(fs, "/proc")
            .collect(&registry)
            .unwrap_err();

        assert!(matches!(err, CollectError::Io(_)));
        assert_eq!(registry.value(Family::MemTotal, &[]), Some(16384000.0));
    }

    #[test]
    fn test_invalid_value_aborts_cycle_without_partial_writes() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/meminfo", "MemTotal: 100 kB\nMemFree: ??? kB\n");
        let registry = registry();

        let err = MemoryCollector::new(fs, "/proc")
            .collect(&registry)
            .unwrap_err();

        assert!(matches!(err, CollectError::Parse(_)));
        assert_eq!(registry.value(Family::MemTotal, &[]), None);
    }

    #[test]
    fn test_memory_pressure_values() {
        let registry = registry();
        MemoryCollector::new(MockFs::memory_pressure(), "/proc")
            .collect(&registry)
            .unwrap();
        assert_eq!(registry.value(Family::SwapFree, &[]), Some(200000.0));
        assert_eq!(registry.value(Family::SwapCached, &[]), Some(512000.0));
    }
}
