//! Pre-built mock scenarios for testing.
//!
//! These provide realistic `/proc` contents and `iostat` output for the
//! collectors, and back the exporter on platforms without `/proc`.

use super::command::MockCommand;
use super::filesystem::MockFs;

/// Two `iostat -d -x 1 2` reports: the since-boot average and one interval.
pub const TYPICAL_IOSTAT: &str = "\
Linux 6.1.0-18-amd64 (db01) \t03/14/2024 \t_x86_64_\t(8 CPU)

Device            r/s     w/s     rkB/s     wkB/s   rrqm/s   wrqm/s  %rrqm  %wrqm r_await w_await aqu-sz rareq-sz wareq-sz  svctm  %util
nvme0n1          0.50    9.00      1.20      7.80    40.00   120.00   0.00   0.00    0.10    0.20   0.01    16.00    30.00   0.05   0.40
sda              0.10    1.00      0.05      0.95     2.00    10.00   0.00   0.00    0.30    0.50   0.00     8.00    12.00   0.10   0.02

Device            r/s     w/s     rkB/s     wkB/s   rrqm/s   wrqm/s  %rrqm  %wrqm r_await w_await aqu-sz rareq-sz wareq-sz  svctm  %util
nvme0n1          2.00   14.00      4.00     10.00   64.00   256.00   0.00   0.00    0.12    0.25   0.02    16.00    25.60   0.06   0.90
sda              0.00    3.00      0.00      3.00     0.00    24.00   0.00   0.00    0.00    0.40   0.00     0.00     8.00   0.10   0.03

";

#[allow(dead_code)]
impl MockFs {
    /// Creates a typical system: 16 GB of RAM, 4 GB of swap and a CPU that is
    /// 10% user, 5% system, 5% iowait and 80% idle between two samples.
    pub fn typical_system() -> Self {
        let mut fs = Self::new();

        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:       16384000 kB
MemFree:         8192000 kB
MemAvailable:   12000000 kB
Buffers:          512000 kB
Cached:          2048000 kB
SwapCached:            0 kB
Active:          4096000 kB
Inactive:        2048000 kB
SwapTotal:       4096000 kB
SwapFree:        4096000 kB
Dirty:              1024 kB
Writeback:             0 kB
Slab:             512000 kB
SReclaimable:     256000 kB
HugePages_Total:       0
Hugepagesize:       2048 kB
",
        );
        fs.add_file_sequence(
            "/proc/stat",
            [
                "\
cpu  10000 500 3000 80000 1000 200 100 0 0 0
cpu0 2500 125 750 20000 250 50 25 0 0 0
cpu1 2500 125 750 20000 250 50 25 0 0 0
cpu2 2500 125 750 20000 250 50 25 0 0 0
cpu3 2500 125 750 20000 250 50 25 0 0 0
intr 1000000 50 0 0 0 0 0 0 0 1 0 0 0 100 0 0 1000
ctxt 500000
btime 1700000000
processes 10000
procs_running 2
procs_blocked 0
",
                "\
cpu  10100 500 3050 80800 1050 200 100 0 0 0
cpu0 2525 125 762 20200 263 50 25 0 0 0
cpu1 2525 125 763 20200 262 50 25 0 0 0
cpu2 2525 125 762 20200 263 50 25 0 0 0
cpu3 2525 125 763 20200 262 50 25 0 0 0
intr 1000500 50 0 0 0 0 0 0 0 1 0 0 0 100 0 0 1000
ctxt 500900
btime 1700000000
processes 10004
procs_running 1
procs_blocked 0
",
            ],
        );

        fs
    }

    /// Creates a system under memory pressure with most swap in use.
    pub fn memory_pressure() -> Self {
        let mut fs = Self::typical_system();
        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:       16384000 kB
MemFree:          128000 kB
MemAvailable:     256000 kB
Buffers:           16000 kB
Cached:           100000 kB
SwapCached:       512000 kB
SwapTotal:       4096000 kB
SwapFree:         200000 kB
",
        );
        fs
    }
}

impl MockCommand {
    /// `iostat` returning [`TYPICAL_IOSTAT`].
    pub fn typical_iostat() -> Self {
        Self::stdout(TYPICAL_IOSTAT)
    }
}
