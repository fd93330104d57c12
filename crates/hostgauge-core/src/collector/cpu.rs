//! CPU time breakdown collector backed by `/proc/stat`.

use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::collector::parser::{CpuTimes, parse_cpu_times};
use crate::collector::traits::FileSystem;
use crate::collector::{CollectError, Collector};
use crate::registry::{Family, MetricRegistry};

/// Default blocking sampling window.
pub const DEFAULT_CPU_WINDOW: Duration = Duration::from_secs(1);

/// Share of CPU time per mode over one sampling window, in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuPercent {
    pub user: f64,
    pub system: f64,
    pub idle: f64,
    pub iowait: f64,
}

impl CpuPercent {
    /// Computes percentages from two samples of the aggregate counters.
    ///
    /// Fails if the counters went backwards or did not advance at all.
    pub fn between(prev: &CpuTimes, cur: &CpuTimes) -> Result<Self, CollectError> {
        if cur.total() < prev.total() {
            return Err(CollectError::Parse(
                "cpu counters went backwards between samples".to_string(),
            ));
        }
        let total = cur.total() - prev.total();
        if total == 0 {
            return Err(CollectError::Parse(
                "cpu counters did not advance during sampling window".to_string(),
            ));
        }

        let pct = |prev: u64, cur: u64| cur.saturating_sub(prev) as f64 * 100.0 / total as f64;

        Ok(Self {
            user: pct(prev.user, cur.user),
            system: pct(prev.system, cur.system),
            idle: pct(prev.idle, cur.idle),
            iowait: pct(prev.iowait, cur.iowait),
        })
    }
}

/// Publishes `cpu_avg_percent{mode}` for user, system, idle and iowait.
///
/// Each cycle blocks for the sampling window between its two reads of
/// `/proc/stat`.
pub struct CpuCollector<F: FileSystem> {
    fs: F,
    proc_path: String,
    window: Duration,
}

impl<F: FileSystem> CpuCollector<F> {
    /// Creates a new CPU collector with a one-second sampling window.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            window: DEFAULT_CPU_WINDOW,
        }
    }

    /// Sets the sampling window. `Duration::ZERO` reads twice back to back.
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    fn read_times(&self) -> Result<CpuTimes, CollectError> {
        let path = format!("{}/stat", self.proc_path);
        let content = self.fs.read_to_string(Path::new(&path))?;
        Ok(parse_cpu_times(&content)?)
    }

    /// Takes two samples one window apart.
    pub fn sample(&self) -> Result<CpuPercent, CollectError> {
        let prev = self.read_times()?;
        if !self.window.is_zero() {
            std::thread::sleep(self.window);
        }
        let cur = self.read_times()?;
        CpuPercent::between(&prev, &cur)
    }
}

impl<F: FileSystem> Collector for CpuCollector<F> {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn collect(&self, registry: &MetricRegistry) -> Result<usize, CollectError> {
        let pct = self.sample()?;

        let modes = [
            ("user", pct.user),
            ("system", pct.system),
            ("idle", pct.idle),
            ("iowait", pct.iowait),
        ];
        for (mode, value) in modes {
            registry.set_gauge(Family::CpuAvgPercent, &[mode], value)?;
        }

        info!(
            user = pct.user,
            system = pct.system,
            idle = pct.idle,
            iowait = pct.iowait,
            "cpu usage collected"
        );
        Ok(modes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    fn collector(fs: MockFs) -> CpuCollector<MockFs> {
        CpuCollector::new(fs, "/proc").with_window(Duration::ZERO)
    }

    #[test]
    fn test_collect_typical_system() {
        let registry = MetricRegistry::new().unwrap();

        let written = collector(MockFs::typical_system())
            .collect(&registry)
            .unwrap();

        assert_eq!(written, 4);
        assert_eq!(registry.value(Family::CpuAvgPercent, &["user"]), Some(10.0));
        assert_eq!(registry.value(Family::CpuAvgPercent, &["system"]), Some(5.0));
        assert_eq!(registry.value(Family::CpuAvgPercent, &["idle"]), Some(80.0));
        assert_eq!(registry.value(Family::CpuAvgPercent, &["iowait"]), Some(5.0));
        assert_eq!(registry.instance_count(Family::CpuAvgPercent), 4);
    }

    #[test]
    fn test_iowait_defaults_to_zero() {
        let mut fs = MockFs::new();
        fs.add_file_sequence("/proc/stat", ["cpu 100 0 100 800\n", "cpu 150 0 150 900\n"]);
        let pct = collector(fs).sample().unwrap();

        assert_eq!(pct.user, 25.0);
        assert_eq!(pct.system, 25.0);
        assert_eq!(pct.idle, 50.0);
        assert_eq!(pct.iowait, 0.0);
    }

    #[test]
    fn test_counters_not_advancing_keeps_previous_values() {
        let registry = MetricRegistry::new().unwrap();
        collector(MockFs::typical_system())
            .collect(&registry)
            .unwrap();

        let mut fs = MockFs::new();
        fs.add_file("/proc/stat", "cpu 1 1 1 1 1 0 0 0 0 0\n");
        let err = collector(fs).collect(&registry).unwrap_err();

        assert!(matches!(err, CollectError::Parse(_)));
        assert_eq!(registry.value(Family::CpuAvgPercent, &["user"]), Some(10.0));
    }

    #[test]
    fn test_counters_going_backwards_is_an_error() {
        let prev = CpuTimes {
            user: 100,
            idle: 100,
            ..CpuTimes::default()
        };
        let cur = CpuTimes {
            user: 50,
            idle: 100,
            ..CpuTimes::default()
        };
        assert!(CpuPercent::between(&prev, &cur).is_err());
    }

    #[test]
    fn test_missing_stat_is_io_error() {
        let registry = MetricRegistry::new().unwrap();
        let err = collector(MockFs::new()).collect(&registry).unwrap_err();
        assert!(matches!(err, CollectError::Io(_)));
        assert_eq!(registry.instance_count(Family::CpuAvgPercent), 0);
    }
}
