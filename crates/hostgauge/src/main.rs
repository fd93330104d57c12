//! hostgauge - host resource gauge exporter.
//!
//! Samples disk I/O, CPU and memory counters on a fixed cadence and serves the
//! latest values on `/metrics` in the text exposition format.

mod handlers;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use hostgauge_core::MetricRegistry;
use hostgauge_core::collector::disk::{DEFAULT_IOSTAT_ARGS, DEFAULT_IOSTAT_PROGRAM};
use hostgauge_core::collector::DiskColumns;
use hostgauge_core::scheduler::{ExecutionMode, IntervalTicker, Scheduler};

use handlers::AppState;

/// Host resource gauge exporter.
#[derive(Parser, Debug)]
#[command(name = "hostgauge", about = "Host resource gauge exporter", version = hostgauge_core::VERSION)]
struct Args {
    /// Listen address of the scrape endpoint.
    #[arg(long, default_value = "0.0.0.0:18000", env = "HOSTGAUGE_LISTEN")]
    listen: SocketAddr,

    /// Minimum spacing between collection ticks, in seconds.
    #[arg(short, long, default_value = "1", env = "HOSTGAUGE_INTERVAL",
        value_parser = clap::value_parser!(u64).range(1..))]
    interval: u64,

    /// CPU sampling window, in seconds.
    #[arg(long, default_value = "1", env = "HOSTGAUGE_CPU_WINDOW",
        value_parser = clap::value_parser!(u64).range(1..))]
    cpu_window: u64,

    /// Path to /proc filesystem.
    #[arg(long, default_value = "/proc", env = "HOSTGAUGE_PROC_PATH")]
    proc_path: String,

    /// Program producing extended per-device I/O statistics.
    #[arg(long, default_value = DEFAULT_IOSTAT_PROGRAM, env = "HOSTGAUGE_IOSTAT_PROGRAM")]
    iostat_program: String,

    /// Comma-separated arguments for the I/O statistics program.
    #[arg(
        long,
        default_values = DEFAULT_IOSTAT_ARGS,
        value_delimiter = ',',
        allow_hyphen_values = true,
        env = "HOSTGAUGE_IOSTAT_ARGS"
    )]
    iostat_args: Vec<String>,

    /// Column indices of tps,reads,writes,read_bytes,write_bytes in the
    /// program's output (device name is column 0).
    #[arg(long, default_value = "2,3,4,5,6", env = "HOSTGAUGE_IOSTAT_COLUMNS")]
    iostat_columns: DiskColumns,

    /// Run collectors one after another instead of concurrently.
    #[arg(long, env = "HOSTGAUGE_SEQUENTIAL")]
    sequential: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["hostgauge", "hostgauge_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            process::exit(1);
        }
    };

    let code = runtime.block_on(async_main(args));
    // Blocking collectors may still be sampling; do not wait for them.
    runtime.shutdown_timeout(Duration::from_secs(3));
    process::exit(code);
}

async fn async_main(args: Args) -> i32 {
    info!(version = hostgauge_core::VERSION, "hostgauge starting");
    info!(
        listen = %args.listen,
        interval_s = args.interval,
        cpu_window_s = args.cpu_window,
        proc_path = %args.proc_path,
        iostat = %format!("{} {}", args.iostat_program, args.iostat_args.join(" ")),
        sequential = args.sequential,
        "configuration"
    );

    let registry = match MetricRegistry::new() {
        Ok(r) => Arc::new(r),
        Err(e) => {
            error!(error = %e, "failed to create metric registry");
            return 1;
        }
    };

    let scheduler = build_scheduler(&args, registry.clone());
    let status = scheduler.status();

    // Setup graceful shutdown. The sender outlives the handler so a failed
    // install leaves the channel open instead of reading as shutdown.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let handler_tx = shutdown_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        let _ = handler_tx.send(true);
    }) {
        warn!(error = %e, "failed to set shutdown signal handler, signals will stop the process without draining");
    }

    let interval = Duration::from_secs(args.interval);
    let loop_rx = shutdown_rx.clone();
    let collection = tokio::spawn(async move {
        scheduler.run(IntervalTicker::new(interval), loop_rx).await;
    });

    let app = handlers::router(AppState { registry, status });

    let listener = match tokio::net::TcpListener::bind(args.listen).await {
        Ok(l) => l,
        Err(e) => {
            error!(addr = %args.listen, error = %e, "failed to bind scrape endpoint");
            collection.abort();
            return 1;
        }
    };
    info!(addr = %args.listen, "serving metrics on http://{}/metrics", args.listen);

    let mut server_rx = shutdown_rx;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if server_rx.wait_for(|stop| *stop).await.is_err() {
                std::future::pending::<()>().await;
            }
        })
        .await;
    drop(shutdown_tx);

    if let Err(e) = served {
        error!(error = %e, "server error");
        collection.abort();
        return 1;
    }

    if let Err(e) = collection.await {
        warn!(error = %e, "collection loop ended abnormally");
    }

    info!("Shutdown complete");
    0
}

fn execution_mode(sequential: bool) -> ExecutionMode {
    if sequential {
        ExecutionMode::Sequential
    } else {
        ExecutionMode::Concurrent
    }
}

#[cfg(target_os = "linux")]
fn build_scheduler(args: &Args, registry: Arc<MetricRegistry>) -> Scheduler {
    use hostgauge_core::collector::{
        CpuCollector, DiskIoCollector, FileSystem, MemoryCollector, RealCommand, RealFs,
    };
    use std::path::Path;

    if !RealFs::new().exists(Path::new(&args.proc_path)) {
        warn!(proc_path = %args.proc_path, "proc path does not exist, CPU and memory collection will fail");
    }

    Scheduler::new(registry, Duration::from_secs(args.interval))
        .with_mode(execution_mode(args.sequential))
        .with_collector(
            DiskIoCollector::new(RealCommand::new())
                .with_command(&args.iostat_program, args.iostat_args.clone())
                .with_columns(args.iostat_columns.clone()),
        )
        .with_collector(
            CpuCollector::new(RealFs::new(), &args.proc_path)
                .with_window(Duration::from_secs(args.cpu_window)),
        )
        .with_collector(MemoryCollector::new(RealFs::new(), &args.proc_path))
}

#[cfg(not(target_os = "linux"))]
fn build_scheduler(args: &Args, registry: Arc<MetricRegistry>) -> Scheduler {
    warn!("not running on Linux, no collectors registered and /metrics stays empty");

    Scheduler::new(registry, Duration::from_secs(args.interval))
        .with_mode(execution_mode(args.sequential))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn args_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn args_defaults() {
        let args = Args::try_parse_from(["hostgauge"]).unwrap();
        assert_eq!(args.listen, "0.0.0.0:18000".parse::<SocketAddr>().unwrap());
        assert_eq!(args.interval, 1);
        assert_eq!(args.cpu_window, 1);
        assert_eq!(args.proc_path, "/proc");
        assert_eq!(args.iostat_program, "iostat");
        assert_eq!(args.iostat_args, vec!["-d", "-x", "1", "2"]);
        assert_eq!(args.iostat_columns, DiskColumns::default());
        assert!(!args.sequential);
    }

    #[test]
    fn args_overrides() {
        let args = Args::try_parse_from([
            "hostgauge",
            "--listen",
            "127.0.0.1:9100",
            "--interval",
            "5",
            "--iostat-args",
            "-d,-x,-k,1,2",
            "--iostat-columns",
            "1,2,3,4,5",
            "--sequential",
        ])
        .unwrap();
        assert_eq!(args.listen.port(), 9100);
        assert_eq!(args.interval, 5);
        assert_eq!(args.iostat_args, vec!["-d", "-x", "-k", "1", "2"]);
        assert_eq!(args.iostat_columns.tps, 1);
        assert_eq!(execution_mode(args.sequential), ExecutionMode::Sequential);
    }

    #[test]
    fn args_reject_zero_interval() {
        assert!(Args::try_parse_from(["hostgauge", "--interval", "0"]).is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn build_scheduler_registers_three_collectors() {
        let args = Args::try_parse_from(["hostgauge"]).unwrap();
        let registry = Arc::new(MetricRegistry::new().unwrap());
        let scheduler = build_scheduler(&args, registry);
        assert_eq!(scheduler.collector_names(), vec!["disk_io", "cpu", "memory"]);
    }

    #[cfg(not(target_os = "linux"))]
    #[test]
    fn build_scheduler_without_procfs_registers_nothing() {
        let args = Args::try_parse_from(["hostgauge"]).unwrap();
        let registry = Arc::new(MetricRegistry::new().unwrap());
        let scheduler = build_scheduler(&args, registry);
        assert!(scheduler.collector_names().is_empty());
    }
}
