use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::PanicHookInfo;
use std::path::PathBuf;
use std::sync::Once;

use etl_config::Environment;
use thiserror::Error;
use tracing::subscriber::{SetGlobalDefaultError, set_global_default};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, InitError};
use tracing_log::LogTracer;
use tracing_log::log_tracer::SetLoggerError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to build the rolling log file appender: {0}")]
    Appender(#[from] InitError),

    #[error("failed to forward `log` records to tracing: {0}")]
    LogTracer(#[from] SetLoggerError),

    #[error("a global tracing subscriber is already installed: {0}")]
    GlobalDefault(#[from] SetGlobalDefaultError),

    #[error("failed to detect the environment: {0}")]
    Environment(#[from] std::io::Error),
}

/// Keeps buffered log output alive. Drop it only right before the process exits.
#[must_use]
pub enum LogFlusher {
    Flusher(WorkerGuard),
    NullFlusher,
}

/// Where and how a copy process writes its logs.
#[derive(Debug, Clone)]
pub struct TracingOptions {
    /// Prefix of the log files.
    pub app_name: String,
    /// Directory of the daily rotated log files, used in production-like environments.
    pub log_dir: PathBuf,
    /// Number of daily log files kept around.
    pub max_log_files: usize,
    /// Filter used when `RUST_LOG` is not set.
    pub default_filter: String,
}

impl TracingOptions {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            log_dir: PathBuf::from("logs"),
            max_log_files: 5,
            default_filter: "info".to_string(),
        }
    }
}

static INIT_TEST_TRACING: Once = Once::new();

/// Enables terminal tracing for tests when `ENABLE_TRACING` is set:
///
/// ENABLE_TRACING=1 cargo test <test_name>
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var("ENABLE_TRACING").is_ok() {
            // Without an explicit environment we would default to prod and log to files.
            Environment::Dev.set();
            let mut options = TracingOptions::new("test");
            options.default_filter = "info,etl_snapshot=debug".to_string();

            let _log_flusher =
                init_tracing_with(options).expect("Failed to initialize tracing for tests");
        }
    });
}

/// Installs the global subscriber with the default [`TracingOptions`] for `app_name`.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    init_tracing_with(TracingOptions::new(app_name))
}

/// Installs the global subscriber.
///
/// Production-like environments write JSON lines with their span list to daily rotated files,
/// so that every line of a copy carries its `copy_worker` and `log_stream` spans. Other
/// environments pretty-print to the terminal.
pub fn init_tracing_with(options: TracingOptions) -> Result<LogFlusher, TracingError> {
    // Forwards records of libraries using the `log` crate.
    LogTracer::init()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&options.default_filter));

    let log_flusher = if Environment::load()?.is_prod() {
        let file_appender = rolling::Builder::new()
            .filename_prefix(&options.app_name)
            .filename_suffix("log")
            .rotation(rolling::Rotation::DAILY)
            .max_log_files(options.max_log_files)
            .build(&options.log_dir)?;
        let (writer, guard) = tracing_appender::non_blocking(file_appender);

        let json = fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(writer)
            .json()
            .with_current_span(true)
            .with_span_list(true);
        set_global_default(Registry::default().with(filter).with(json))?;

        LogFlusher::Flusher(guard)
    } else {
        let pretty = fmt::layer()
            .with_ansi(true)
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .pretty();
        set_global_default(Registry::default().with(filter).with(pretty))?;

        LogFlusher::NullFlusher
    };

    set_tracing_panic_hook();

    Ok(log_flusher)
}

/// Logs panics through `tracing` before running the previous hook, so that a panicking copy
/// worker or log stream task shows up in the log files.
fn set_tracing_panic_hook() {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        log_panic(info);
        prev_hook(info);
    }));
}

fn log_panic(info: &PanicHookInfo) {
    let payload = info
        .payload()
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| info.payload().downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic payload");
    let location = info.location().map(ToString::to_string);
    let thread = std::thread::current().name().map(ToString::to_string);

    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => tracing::error!(
            panic.payload = payload,
            panic.location = location,
            panic.thread = thread,
            panic.backtrace = %backtrace,
            "a panic occurred"
        ),
        _ => tracing::error!(
            panic.payload = payload,
            panic.location = location,
            panic.thread = thread,
            panic.note = "run with RUST_BACKTRACE=1 to display backtraces",
            "a panic occurred"
        ),
    }
}
