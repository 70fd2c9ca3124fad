// Logging System for Lorikeet
//
// This module provides a unified logging interface for the lorikeet runtime.
// It's built on top of the `tracing` ecosystem; every process task runs inside
// a span carrying its pid, so events emitted from handlers are attributed to
// the process that produced them.
//
// # Usage Examples
//
// ## Basic Initialization
//
// ```rust
// use lorikeet::logging;
//
// // Initialize with default settings (INFO level, console output)
// logging::init(logging::LogConfig::default());
//
// // Or pick a preset
// logging::init_development();
// logging::init_production();
// ```
//
// ## Using Log Macros
//
// ```rust
// use lorikeet::{log_lifecycle, process_span};
//
// let pid = ProcessRef::new();
// let span = process_span!(pid);
// let _guard = span.enter();
// log_lifecycle!(pid, "restarted", child = "worker");
// ```

use std::sync::Once;
use tracing::{Level, Subscriber};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Configuration for the lorikeet logging system
///
/// # Examples
///
/// ```rust
/// use lorikeet::logging::LogConfig;
/// use tracing::Level;
///
/// let config = LogConfig {
///     level: Level::DEBUG,
///     target_filters: Some("lorikeet::supervisor=trace".to_string()),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to use JSON format for logs
    pub json_format: bool,
    /// Whether to include file and line information
    pub show_file_line: bool,
    /// Whether to include thread name/id
    pub show_thread_info: bool,
    /// Whether to include timestamps
    pub show_time: bool,
    /// Target filter expressions (format: "target=level,target2=level2,...")
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

// Initialization guard to ensure we only initialize once
static INIT: Once = Once::new();

/// Initialize the logging system with the given configuration
///
/// It's safe to call multiple times; only the first call will take effect.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let mut env_filter = EnvFilter::from_default_env().add_directive(config.level.into());

        if let Some(filters) = config.target_filters {
            for filter in filters.split(',') {
                if let Ok(directive) = filter.parse() {
                    env_filter = env_filter.add_directive(directive);
                }
            }
        }

        let registry = tracing_subscriber::registry().with(env_filter);

        let subscriber: Box<dyn Subscriber + Send + Sync> = match (config.json_format, config.show_time) {
            (true, _) => Box::new(registry.with(fmt::layer().json().flatten_event(true))),
            (false, true) => Box::new(registry.with(
                fmt::layer()
                    .with_ansi(atty::is(atty::Stream::Stdout))
                    .with_file(config.show_file_line)
                    .with_line_number(config.show_file_line)
                    .with_thread_names(config.show_thread_info)
                    .with_thread_ids(config.show_thread_info),
            )),
            (false, false) => Box::new(registry.with(
                fmt::layer()
                    .without_time()
                    .with_ansi(atty::is(atty::Stream::Stdout))
                    .with_file(config.show_file_line)
                    .with_line_number(config.show_file_line)
                    .with_thread_names(config.show_thread_info)
                    .with_thread_ids(config.show_thread_info),
            )),
        };

        set_global_subscriber(subscriber);
    });
}

// Helper function to set the global subscriber
fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error setting global tracing subscriber: {}", err);
    }
}

/// Initialize logging optimized for development environments
///
/// - DEBUG level for all lorikeet modules
/// - TRACE level for the supervisor engine
/// - Colorized console output with file/line information
pub fn init_development() {
    init(LogConfig {
        level: Level::DEBUG,
        json_format: false,
        show_file_line: true,
        show_thread_info: true,
        show_time: true,
        target_filters: Some("lorikeet=debug,lorikeet::supervisor=trace".to_string()),
    });
}

/// Initialize logging optimized for production environments
///
/// JSON output for log aggregators, no file/line information.
pub fn init_production() {
    init(LogConfig {
        level: Level::INFO,
        json_format: true,
        show_file_line: false,
        show_thread_info: true,
        show_time: true,
        target_filters: None,
    });
}

/// Initialize logging for testing
///
/// Only shows warnings and errors by default to keep test output clean.
pub fn init_test() {
    init(LogConfig {
        level: Level::WARN,
        json_format: false,
        show_file_line: true,
        show_thread_info: false,
        show_time: false,
        target_filters: None,
    });
}

/// Create a span for everything a process does
///
/// # Examples
///
/// ```rust
/// use lorikeet::process_span;
/// use lorikeet_api::ProcessRef;
///
/// let pid = ProcessRef::new();
/// let span = process_span!(pid);
/// let _guard = span.enter();
/// let _span = process_span!(pid, kind = "supervisor");
/// ```
#[macro_export]
macro_rules! process_span {
    ($pid:expr) => {
        tracing::info_span!("process", pid = %$pid)
    };
    ($pid:expr, $($fields:tt)*) => {
        tracing::info_span!("process", pid = %$pid, $($fields)*)
    };
}

/// Create a span for a supervisor's handling of one child
///
/// # Examples
///
/// ```rust
/// use lorikeet::supervisor_span;
/// use lorikeet_api::ProcessRef;
///
/// let pid = ProcessRef::new();
/// let _span = supervisor_span!(pid, "worker");
/// ```
#[macro_export]
macro_rules! supervisor_span {
    ($pid:expr, $child:expr) => {
        tracing::debug_span!("supervisor", supervisor = %$pid, child = %$child)
    };
}

/// Log process lifecycle events - use for state changes of a process
///
/// # Examples
///
/// ```rust
/// use lorikeet::log_lifecycle;
/// use lorikeet_api::{ExitReason, ProcessRef};
///
/// let pid = ProcessRef::new();
/// let reason = ExitReason::Normal;
/// log_lifecycle!(pid, "started");
/// log_lifecycle!(pid, "disposed", reason = %reason);
/// ```
#[macro_export]
macro_rules! log_lifecycle {
    ($pid:expr, $event:expr) => {
        tracing::debug!(pid = %$pid, event = $event);
    };
    ($pid:expr, $event:expr, $($fields:tt)*) => {
        tracing::debug!(pid = %$pid, event = $event, $($fields)*);
    };
}

/// Log error events - use for all error conditions
///
/// # Examples
///
/// ```rust
/// use lorikeet::log_error;
/// use lorikeet_api::ProcessRef;
///
/// let pid = ProcessRef::new();
/// let error = std::io::Error::other("peer unreachable");
/// log_error!(error);
/// log_error!(error, peer = %pid, operation = "notify");
/// ```
#[macro_export]
macro_rules! log_error {
    ($error:expr) => {
        tracing::error!(error = %$error);
    };
    ($error:expr, $($fields:tt)*) => {
        tracing::error!(error = %$error, $($fields)*);
    };
}

// Re-export the most commonly used tracing macros for convenience
pub use tracing::{debug, error, info, trace, warn};
