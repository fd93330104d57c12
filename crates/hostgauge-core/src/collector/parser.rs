//! Parsers for `/proc` files and `iostat` output.
//!
//! These are pure functions that parse raw text into structured data. They are
//! designed to be easily testable with string inputs.

use std::str::FromStr;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

// ---------------------------------------------------------------------------
// /proc/meminfo
// ---------------------------------------------------------------------------

/// The `/proc/meminfo` keys the exporter publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemInfoField {
    MemTotal,
    MemFree,
    MemAvailable,
    Buffers,
    Cached,
    SwapTotal,
    SwapFree,
    SwapCached,
}

impl MemInfoField {
    /// Maps a meminfo key to a field. Unknown keys return `None`.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "MemTotal" => Some(MemInfoField::MemTotal),
            "MemFree" => Some(MemInfoField::MemFree),
            "MemAvailable" => Some(MemInfoField::MemAvailable),
            "Buffers" => Some(MemInfoField::Buffers),
            "Cached" => Some(MemInfoField::Cached),
            "SwapTotal" => Some(MemInfoField::SwapTotal),
            "SwapFree" => Some(MemInfoField::SwapFree),
            "SwapCached" => Some(MemInfoField::SwapCached),
            _ => None,
        }
    }
}

/// Parses `/proc/meminfo` content.
///
/// Each line is `Key:   value [unit]`. Values are returned in the unit the
/// kernel reports (kB), in file order. Lines without a colon or a value token
/// are skipped, as are keys not in [`MemInfoField`]. A known key with a
/// non-integer value is an error.
pub fn parse_meminfo(content: &str) -> Result<Vec<(MemInfoField, u64)>, ParseError> {
    let mut values = Vec::new();

    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(field) = MemInfoField::from_key(key.trim()) else {
            continue;
        };
        let Some(token) = rest.split_whitespace().next() else {
            continue;
        };
        let value: u64 = token
            .parse()
            .map_err(|_| ParseError::new(format!("invalid value {:?} for {}", token, key.trim())))?;
        values.push((field, value));
    }

    Ok(values)
}

// ---------------------------------------------------------------------------
// /proc/stat
// ---------------------------------------------------------------------------

/// Aggregate CPU jiffies from the `cpu` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    /// Sum of all accounted states. Guest time is already part of user/nice.
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }
}

/// Parses the aggregate `cpu` line of `/proc/stat`.
///
/// Columns the kernel does not report (iowait and later on old kernels) are 0.
pub fn parse_cpu_times(content: &str) -> Result<CpuTimes, ParseError> {
    let line = content
        .lines()
        .find(|l| l.split_whitespace().next() == Some("cpu"))
        .ok_or_else(|| ParseError::new("missing aggregate cpu line in stat"))?;
    let parts: Vec<&str> = line.split_whitespace().collect();

    let get_val = |idx: usize, name: &str| -> Result<u64, ParseError> {
        match parts.get(idx) {
            Some(s) => s
                .parse()
                .map_err(|_| ParseError::new(format!("invalid cpu {}: {:?}", name, s))),
            None => Ok(0),
        }
    };

    if parts.len() < 5 {
        return Err(ParseError::new(format!(
            "not enough fields in cpu line: expected 4+, got {}",
            parts.len() - 1
        )));
    }

    Ok(CpuTimes {
        user: get_val(1, "user")?,
        nice: get_val(2, "nice")?,
        system: get_val(3, "system")?,
        idle: get_val(4, "idle")?,
        iowait: get_val(5, "iowait")?,
        irq: get_val(6, "irq")?,
        softirq: get_val(7, "softirq")?,
        steal: get_val(8, "steal")?,
    })
}

// ---------------------------------------------------------------------------
// iostat -d -x
// ---------------------------------------------------------------------------

/// Column layout of `iostat` extended device output.
///
/// Indices are zero-based whitespace-separated fields. The defaults are the
/// layout the exporter has always used; other sysstat versions or locales can
/// be accommodated by overriding them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskColumns {
    pub device: usize,
    pub tps: usize,
    pub reads: usize,
    pub writes: usize,
    pub read_bytes: usize,
    pub write_bytes: usize,
    /// Rows with fewer fields are skipped.
    pub min_fields: usize,
    /// Lines containing this token are headers.
    pub header_token: String,
}

impl Default for DiskColumns {
    fn default() -> Self {
        Self {
            device: 0,
            tps: 2,
            reads: 3,
            writes: 4,
            read_bytes: 5,
            write_bytes: 6,
            min_fields: 11,
            header_token: "Device".to_string(),
        }
    }
}

impl DiskColumns {
    fn max_index(&self) -> usize {
        [
            self.device,
            self.tps,
            self.reads,
            self.writes,
            self.read_bytes,
            self.write_bytes,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

/// Parses `tps,reads,writes,read_bytes,write_bytes` column indices.
///
/// The device column stays at 0 and `min_fields` grows to cover the largest
/// index when needed.
impl FromStr for DiskColumns {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let indices = s
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<usize>()
                    .map_err(|_| ParseError::new(format!("invalid column index {:?}", part)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let &[tps, reads, writes, read_bytes, write_bytes] = indices.as_slice() else {
            return Err(ParseError::new(format!(
                "expected 5 column indices (tps,reads,writes,read_bytes,write_bytes), got {}",
                indices.len()
            )));
        };
        if indices.contains(&0) {
            return Err(ParseError::new("column 0 is the device name"));
        }

        let mut columns = DiskColumns {
            tps,
            reads,
            writes,
            read_bytes,
            write_bytes,
            ..DiskColumns::default()
        };
        columns.min_fields = columns.min_fields.max(columns.max_index() + 1);
        Ok(columns)
    }
}

/// One device row of an `iostat` report.
#[derive(Debug, Clone, PartialEq)]
pub struct IostatRow {
    pub device: String,
    pub tps: f64,
    pub read_rate: f64,
    pub write_rate: f64,
    pub read_bytes: f64,
    pub write_bytes: f64,
}

/// Parses `iostat -d -x` output and returns the rows of the last report.
///
/// Header lines start a new report. With `iostat -d -x 1 2` the first report
/// is the average since boot, so only the last one is kept. Lines shorter than
/// `min_fields` (the banner, blank lines) are ignored. A mapped column that is
/// not a number, in any report, fails the whole parse.
pub fn parse_iostat(content: &str, columns: &DiskColumns) -> Result<Vec<IostatRow>, ParseError> {
    let mut previous = Vec::new();
    let mut current = Vec::new();

    for line in content.lines() {
        if line.contains(&columns.header_token) {
            if !current.is_empty() {
                previous = std::mem::take(&mut current);
            }
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < columns.min_fields || fields.len() <= columns.max_index() {
            continue;
        }

        current.push(parse_iostat_row(&fields, columns)?);
    }

    Ok(if current.is_empty() { previous } else { current })
}

fn parse_iostat_row(fields: &[&str], columns: &DiskColumns) -> Result<IostatRow, ParseError> {
    let device = fields[columns.device];
    let parse_field = |idx: usize, name: &str| -> Result<f64, ParseError> {
        fields[idx].parse().map_err(|_| {
            ParseError::new(format!(
                "invalid {} {:?} for device {}",
                name, fields[idx], device
            ))
        })
    };

    Ok(IostatRow {
        device: device.to_string(),
        tps: parse_field(columns.tps, "tps")?,
        read_rate: parse_field(columns.reads, "reads/s")?,
        write_rate: parse_field(columns.writes, "writes/s")?,
        read_bytes: parse_field(columns.read_bytes, "read throughput")?,
        write_bytes: parse_field(columns.write_bytes, "write throughput")?,
    })
}
