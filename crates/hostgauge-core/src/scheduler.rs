//! Collection loop: runs every collector once per tick until shutdown.
//!
//! Collectors block (sampling windows, subprocesses), so each one runs on
//! `spawn_blocking`. Cadence comes from a [`Ticker`]; with the real
//! [`IntervalTicker`] the poll interval is the minimum spacing between tick
//! starts, and a tick that takes longer than the interval is logged so the
//! real period is visible. Tests drive the loop with [`ManualTicker`].

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::collector::Collector;
use crate::registry::MetricRegistry;

/// Source of tick events.
pub trait Ticker: Send {
    /// Waits for the next tick. Returns `false` when no more ticks will come.
    fn tick(&mut self) -> impl Future<Output = bool> + Send;
}

/// Ticker backed by `tokio::time::interval`.
///
/// The first tick fires immediately. Must be created inside a tokio runtime.
pub struct IntervalTicker {
    interval: tokio::time::Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Ticker that fires a fixed number of times without waiting.
#[derive(Debug, Clone)]
pub struct ManualTicker {
    remaining: usize,
}

impl ManualTicker {
    pub fn new(ticks: usize) -> Self {
        Self { remaining: ticks }
    }
}

impl Ticker for ManualTicker {
    async fn tick(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        tokio::task::yield_now().await;
        true
    }
}

/// How collectors run within one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// One after another; the tick lasts the sum of all collectors.
    Sequential,
    /// All at once, joined before the tick ends.
    #[default]
    Concurrent,
}

/// Result of one collector within a tick.
#[derive(Debug, Clone, Serialize)]
pub struct CollectorOutcome {
    pub collector: &'static str,
    pub duration_ms: u64,
    /// Gauges written, `None` when the cycle failed.
    pub gauges: Option<usize>,
    pub error: Option<String>,
}

impl CollectorOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of one tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcomes: Vec<CollectorOutcome>,
}

impl TickReport {
    /// Names of collectors that failed in this tick.
    pub fn failed(&self) -> Vec<&'static str> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_ok())
            .map(|o| o.collector)
            .collect()
    }
}

/// Tick counter and last report, shared with the HTTP layer.
#[derive(Debug, Default)]
pub struct SchedulerStatus {
    ticks: AtomicU64,
    last: Mutex<Option<TickReport>>,
}

impl SchedulerStatus {
    /// Number of completed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn last_report(&self) -> Option<TickReport> {
        self.last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn record(&self, report: TickReport) {
        *self
            .last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(report);
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }
}

/// Drives all collectors against one registry.
pub struct Scheduler {
    registry: Arc<MetricRegistry>,
    collectors: Vec<Arc<dyn Collector>>,
    mode: ExecutionMode,
    interval: Duration,
    status: Arc<SchedulerStatus>,
}

impl Scheduler {
    /// Creates a scheduler with no collectors.
    ///
    /// `interval` is the nominal poll interval, used to flag slow ticks.
    pub fn new(registry: Arc<MetricRegistry>, interval: Duration) -> Self {
        Self {
            registry,
            collectors: Vec::new(),
            mode: ExecutionMode::default(),
            interval,
            status: Arc::new(SchedulerStatus::default()),
        }
    }

    pub fn with_collector(mut self, collector: impl Collector + 'static) -> Self {
        self.collectors.push(Arc::new(collector));
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn status(&self) -> Arc<SchedulerStatus> {
        self.status.clone()
    }

    pub fn collector_names(&self) -> Vec<&'static str> {
        self.collectors.iter().map(|c| c.name()).collect()
    }

    /// Runs ticks until the ticker is exhausted or `true` is sent on `shutdown`.
    ///
    /// An in-flight tick is abandoned on shutdown; collectors already running
    /// finish on their blocking threads and only perform whole-value writes.
    pub async fn run<T: Ticker>(&self, mut ticker: T, mut shutdown: watch::Receiver<bool>) {
        info!(
            collectors = ?self.collector_names(),
            mode = ?self.mode,
            interval_ms = self.interval.as_millis() as u64,
            "starting collection loop"
        );

        if *shutdown.borrow() {
            info!("shutdown requested before first tick");
            return;
        }

        let mut tick: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                more = ticker.tick() => if !more { break },
            }

            tick += 1;
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                report = self.run_tick(tick) => self.status.record(report),
            }
        }

        info!(ticks = self.status.ticks(), "collection loop stopped");
    }

    /// Runs every collector once and logs the outcome.
    pub async fn run_tick(&self, tick: u64) -> TickReport {
        let started_at = Utc::now();
        let t0 = Instant::now();

        let outcomes = match self.mode {
            ExecutionMode::Concurrent => {
                let handles: Vec<_> = self
                    .collectors
                    .iter()
                    .map(|c| (c.name(), self.spawn_collector(c.clone())))
                    .collect();
                let mut outcomes = Vec::with_capacity(handles.len());
                for (name, handle) in handles {
                    outcomes.push(join_outcome(name, handle).await);
                }
                outcomes
            }
            ExecutionMode::Sequential => {
                let mut outcomes = Vec::with_capacity(self.collectors.len());
                for c in &self.collectors {
                    let handle = self.spawn_collector(c.clone());
                    outcomes.push(join_outcome(c.name(), handle).await);
                }
                outcomes
            }
        };

        let elapsed = t0.elapsed();
        let report = TickReport {
            tick,
            started_at,
            duration_ms: elapsed.as_millis() as u64,
            outcomes,
        };

        for outcome in &report.outcomes {
            match &outcome.error {
                None => debug!(
                    collector = outcome.collector,
                    gauges = outcome.gauges,
                    duration_ms = outcome.duration_ms,
                    "collector finished"
                ),
                Some(e) => error!(
                    collector = outcome.collector,
                    error = %e,
                    duration_ms = outcome.duration_ms,
                    "collection failed, keeping previous values"
                ),
            }
        }

        if tick == 1 {
            info!(duration_ms = report.duration_ms, "first tick completed");
        } else {
            debug!(tick, duration_ms = report.duration_ms, "tick completed");
        }

        if elapsed > self.interval {
            warn!(
                duration_ms = report.duration_ms,
                interval_ms = self.interval.as_millis() as u64,
                "tick exceeded poll interval"
            );
        }

        report
    }

    fn spawn_collector(
        &self,
        collector: Arc<dyn Collector>,
    ) -> tokio::task::JoinHandle<(Result<usize, String>, Duration)> {
        let registry = self.registry.clone();
        tokio::task::spawn_blocking(move || {
            let t0 = Instant::now();
            let result = collector.collect(&registry).map_err(|e| e.to_string());
            (result, t0.elapsed())
        })
    }
}

/// Resolves once `true` is sent. A channel whose senders are all gone can
/// never request shutdown, so it stays pending.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn join_outcome(
    name: &'static str,
    handle: tokio::task::JoinHandle<(Result<usize, String>, Duration)>,
) -> CollectorOutcome {
    match handle.await {
        Ok((result, elapsed)) => {
            let duration_ms = elapsed.as_millis() as u64;
            match result {
                Ok(gauges) => CollectorOutcome {
                    collector: name,
                    duration_ms,
                    gauges: Some(gauges),
                    error: None,
                },
                Err(e) => CollectorOutcome {
                    collector: name,
                    duration_ms,
                    gauges: None,
                    error: Some(e),
                },
            }
        }
        Err(e) => CollectorOutcome {
            collector: name,
            duration_ms: 0,
            gauges: None,
            error: Some(format!("collector task failed: {}", e)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{
        CollectError, CpuCollector, DiskIoCollector, MemoryCollector, MockCommand, MockFs,
    };
    use crate::registry::Family;
    use std::sync::atomic::AtomicUsize;

    /// Writes `io_tps{device=<name>}` = call count; fails when asked to.
    struct CountingCollector {
        name: &'static str,
        calls: Arc<AtomicUsize>,
        fail: bool,
        stop_after: Option<(usize, Arc<watch::Sender<bool>>)>,
    }

    impl CountingCollector {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                calls: Arc::new(AtomicUsize::new(0)),
                fail: false,
                stop_after: None,
            }
        }
    }

    impl Collector for CountingCollector {
        fn name(&self) -> &'static str {
            self.name
        }

        fn collect(&self, registry: &MetricRegistry) -> Result<usize, CollectError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((limit, tx)) = &self.stop_after
                && n >= *limit
            {
                let _ = tx.send(true);
            }
            if self.fail {
                return Err(CollectError::Parse("injected failure".to_string()));
            }
            registry.set_gauge(Family::IoTps, &[self.name], n as f64)?;
            Ok(1)
        }
    }

    fn registry() -> Arc<MetricRegistry> {
        Arc::new(MetricRegistry::new().unwrap())
    }

    fn mock_collectors(scheduler: Scheduler, disk: MockCommand) -> Scheduler {
        scheduler
            .with_collector(DiskIoCollector::new(disk))
            .with_collector(
                CpuCollector::new(MockFs::typical_system(), "/proc").with_window(Duration::ZERO),
            )
            .with_collector(MemoryCollector::new(MockFs::typical_system(), "/proc"))
    }

    #[tokio::test]
    async fn test_run_tick_updates_all_collectors() {
        let registry = registry();
        let scheduler = mock_collectors(
            Scheduler::new(registry.clone(), Duration::from_secs(1)),
            MockCommand::typical_iostat(),
        );

        let report = scheduler.run_tick(1).await;

        assert!(report.failed().is_empty());
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(registry.value(Family::IoTps, &["sda"]), Some(3.0));
        assert_eq!(registry.value(Family::CpuAvgPercent, &["idle"]), Some(80.0));
        assert_eq!(registry.value(Family::MemTotal, &[]), Some(16384000.0));
    }

    #[tokio::test]
    async fn test_failing_collector_is_isolated() {
        let registry = registry();
        let scheduler = mock_collectors(
            Scheduler::new(registry.clone(), Duration::from_secs(1)),
            MockCommand::missing(),
        )
        .with_mode(ExecutionMode::Sequential);

        let report = scheduler.run_tick(1).await;

        assert_eq!(report.failed(), vec!["disk_io"]);
        let disk = &report.outcomes[0];
        assert!(disk.gauges.is_none());
        assert!(disk.error.as_deref().unwrap().contains("iostat"));
        assert_eq!(registry.instance_count(Family::IoTps), 0);
        assert_eq!(registry.value(Family::CpuAvgPercent, &["user"]), Some(10.0));
        assert_eq!(registry.value(Family::SwapTotal, &[]), Some(4096000.0));
    }

    #[tokio::test]
    async fn test_run_stops_when_ticker_exhausted() {
        let registry = registry();
        let counter = CountingCollector::new("a");
        let calls = counter.calls.clone();
        let scheduler =
            Scheduler::new(registry.clone(), Duration::from_secs(1)).with_collector(counter);
        let (_tx, rx) = watch::channel(false);

        scheduler.run(ManualTicker::new(3), rx).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.status().ticks(), 3);
        let last = scheduler.status().last_report().unwrap();
        assert_eq!(last.tick, 3);
        assert_eq!(registry.value(Family::IoTps, &["a"]), Some(3.0));
    }

    #[tokio::test]
    async fn test_failure_keeps_value_across_ticks() {
        let registry = registry();
        registry.set_gauge(Family::IoTps, &["b"], 42.0).unwrap();
        let mut failing = CountingCollector::new("b");
        failing.fail = true;
        let scheduler = Scheduler::new(registry.clone(), Duration::from_secs(1))
            .with_collector(failing)
            .with_collector(CountingCollector::new("c"));
        let (_tx, rx) = watch::channel(false);

        scheduler.run(ManualTicker::new(2), rx).await;

        assert_eq!(registry.value(Family::IoTps, &["b"]), Some(42.0));
        assert_eq!(registry.value(Family::IoTps, &["c"]), Some(2.0));
        let last = scheduler.status().last_report().unwrap();
        assert_eq!(last.failed(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_shutdown_before_start_runs_nothing() {
        let counter = CountingCollector::new("a");
        let calls = counter.calls.clone();
        let scheduler = Scheduler::new(registry(), Duration::from_secs(1)).with_collector(counter);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        scheduler.run(ManualTicker::new(5), rx).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.status().ticks(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_loop() {
        let (tx, rx) = watch::channel(false);
        let mut counter = CountingCollector::new("a");
        counter.stop_after = Some((2, Arc::new(tx)));
        let calls = counter.calls.clone();
        let scheduler = Scheduler::new(registry(), Duration::from_secs(1)).with_collector(counter);

        scheduler.run(ManualTicker::new(100), rx).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(scheduler.status().ticks() <= 2);
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_keeps_running() {
        let counter = CountingCollector::new("a");
        let calls = counter.calls.clone();
        let scheduler = Scheduler::new(registry(), Duration::from_secs(1)).with_collector(counter);
        let (tx, rx) = watch::channel(false);
        drop(tx);

        scheduler.run(ManualTicker::new(3), rx).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.status().ticks(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_ticker_spacing() {
        let mut ticker = IntervalTicker::new(Duration::from_secs(5));
        let t0 = tokio::time::Instant::now();

        assert!(ticker.tick().await);
        assert_eq!(t0.elapsed(), Duration::ZERO);
        assert!(ticker.tick().await);
        assert_eq!(t0.elapsed(), Duration::from_secs(5));
    }

    #[test]
    fn test_tick_report_serializes() {
        let report = TickReport {
            tick: 7,
            started_at: Utc::now(),
            duration_ms: 2010,
            outcomes: vec![CollectorOutcome {
                collector: "memory",
                duration_ms: 1,
                gauges: Some(8),
                error: None,
            }],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["tick"], 7);
        assert_eq!(json["outcomes"][0]["collector"], "memory");
        assert_eq!(json["outcomes"][0]["gauges"], 8);
    }
}
