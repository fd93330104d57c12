//! Process-wide gauge registry.
//!
//! Every exposed metric family is registered up front on a private
//! `prometheus::Registry`. Instances inside a family are created lazily on the
//! first write for a label combination and are never removed, so a device that
//! disappears keeps its last value in the snapshot.
//!
//! Gauge values are atomic f64 stores and the label-to-instance map is guarded
//! by the family's own lock, so a render running concurrently with a collector
//! sees either the old or the new value of every gauge, never a torn one.

use std::collections::HashMap;

use prometheus::proto::MetricFamily;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

/// Error type for registry operations.
#[derive(Debug)]
pub enum RegistryError {
    /// Label values do not match the family's label schema.
    Labels {
        family: &'static str,
        expected: usize,
        got: usize,
    },
    /// Error reported by the underlying metrics library.
    Prometheus(prometheus::Error),
    /// Rendered exposition text was not valid UTF-8.
    Encoding(std::string::FromUtf8Error),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::Labels {
                family,
                expected,
                got,
            } => write!(
                f,
                "family {} expects {} label value(s), got {}",
                family, expected, got
            ),
            RegistryError::Prometheus(e) => write!(f, "metrics error: {}", e),
            RegistryError::Encoding(e) => write!(f, "exposition encoding error: {}", e),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<prometheus::Error> for RegistryError {
    fn from(e: prometheus::Error) -> Self {
        RegistryError::Prometheus(e)
    }
}

impl From<std::string::FromUtf8Error> for RegistryError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        RegistryError::Encoding(e)
    }
}

/// Every metric family the exporter publishes.
///
/// Names and help texts match the historical exporter so existing dashboards
/// keep working. Memory and swap values are in kB as reported by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    IoReadRate,
    IoWriteRate,
    IoTps,
    IoReadBytes,
    IoWriteBytes,
    CpuAvgPercent,
    MemTotal,
    MemFree,
    MemAvailable,
    MemBuffers,
    MemCached,
    SwapTotal,
    SwapFree,
    SwapCached,
}

impl Family {
    pub const ALL: [Family; 14] = [
        Family::IoReadRate,
        Family::IoWriteRate,
        Family::IoTps,
        Family::IoReadBytes,
        Family::IoWriteBytes,
        Family::CpuAvgPercent,
        Family::MemTotal,
        Family::MemFree,
        Family::MemAvailable,
        Family::MemBuffers,
        Family::MemCached,
        Family::SwapTotal,
        Family::SwapFree,
        Family::SwapCached,
    ];

    /// Metric name as exposed on the scrape endpoint.
    pub fn name(self) -> &'static str {
        match self {
            Family::IoReadRate => "io_read_rate",
            Family::IoWriteRate => "io_write_rate",
            Family::IoTps => "io_tps",
            Family::IoReadBytes => "io_read_bytes",
            Family::IoWriteBytes => "io_write_bytes",
            Family::CpuAvgPercent => "cpu_avg_percent",
            Family::MemTotal => "mem_total",
            Family::MemFree => "mem_free",
            Family::MemAvailable => "mem_available",
            Family::MemBuffers => "mem_buffers",
            Family::MemCached => "mem_cached",
            Family::SwapTotal => "swap_total",
            Family::SwapFree => "swap_free",
            Family::SwapCached => "swap_cached",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            Family::IoReadRate => "Rate of reads from the disk (in reads per second)",
            Family::IoWriteRate => "Rate of writes to the disk (in writes per second)",
            Family::IoTps => "Number of transfers per second",
            Family::IoReadBytes => "Total bytes read from the disk",
            Family::IoWriteBytes => "Total bytes written to the disk",
            Family::CpuAvgPercent => "CPU usage by mode (user, system, iowait, idle)",
            Family::MemTotal => "Total memory",
            Family::MemFree => "Free memory",
            Family::MemAvailable => "Available memory",
            Family::MemBuffers => "Memory used by buffers",
            Family::MemCached => "Memory used by cache",
            Family::SwapTotal => "Total swap memory",
            Family::SwapFree => "Free swap memory",
            Family::SwapCached => "Swap memory used as cache",
        }
    }

    /// Label keys accepted by this family.
    pub fn label_names(self) -> &'static [&'static str] {
        match self {
            Family::IoReadRate
            | Family::IoWriteRate
            | Family::IoTps
            | Family::IoReadBytes
            | Family::IoWriteBytes => &["device"],
            Family::CpuAvgPercent => &["mode"],
            _ => &[],
        }
    }
}

/// Thread-safe store of the latest value of every gauge.
///
/// Constructed once at startup and shared as `Arc<MetricRegistry>` between the
/// scheduler and the scrape handler.
pub struct MetricRegistry {
    registry: Registry,
    families: HashMap<Family, GaugeVec>,
}

impl MetricRegistry {
    /// Creates a registry with all exporter families registered and empty.
    pub fn new() -> Result<Self, RegistryError> {
        let registry = Registry::new();
        let mut families = HashMap::with_capacity(Family::ALL.len());

        for family in Family::ALL {
            let vec = GaugeVec::new(
                Opts::new(family.name(), family.help()),
                family.label_names(),
            )?;
            registry.register(Box::new(vec.clone()))?;
            families.insert(family, vec);
        }

        Ok(Self { registry, families })
    }

    /// Upserts the gauge instance identified by `(family, labels)`.
    ///
    /// The instance is created on first use. Last write wins.
    pub fn set_gauge(
        &self,
        family: Family,
        labels: &[&str],
        value: f64,
    ) -> Result<(), RegistryError> {
        let expected = family.label_names().len();
        if labels.len() != expected {
            return Err(RegistryError::Labels {
                family: family.name(),
                expected,
                got: labels.len(),
            });
        }
        let vec = self.family(family)?;
        vec.get_metric_with_label_values(labels)?.set(value);
        Ok(())
    }

    /// Returns the current value of an instance without creating it.
    pub fn value(&self, family: Family, labels: &[&str]) -> Option<f64> {
        let mf = self.gather_family(family)?;
        mf.get_metric()
            .iter()
            .find(|m| {
                let pairs = m.get_label();
                pairs.len() == labels.len()
                    && pairs
                        .iter()
                        .zip(labels)
                        .all(|(pair, value)| pair.get_value() == *value)
            })
            .map(|m| m.get_gauge().get_value())
    }

    /// Number of instances observed so far in a family.
    pub fn instance_count(&self, family: Family) -> usize {
        self.gather_family(family)
            .map(|mf| mf.get_metric().len())
            .unwrap_or(0)
    }

    /// Renders the current snapshot in the text exposition format.
    ///
    /// Families without any instance yet are omitted.
    pub fn render_snapshot(&self) -> Result<String, RegistryError> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Content type of [`render_snapshot`](Self::render_snapshot) output.
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    fn family(&self, family: Family) -> Result<&GaugeVec, RegistryError> {
        self.families.get(&family).ok_or_else(|| {
            RegistryError::Prometheus(prometheus::Error::Msg(format!(
                "family {} is not registered",
                family.name()
            )))
        })
    }

    fn gather_family(&self, family: Family) -> Option<MetricFamily> {
        self.registry
            .gather()
            .into_iter()
            .find(|mf| mf.get_name() == family.name())
    }
}
