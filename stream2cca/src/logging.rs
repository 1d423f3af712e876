//! Logging setup for the stream2cca binary
//!
//! The interactive player owns the terminal, so by default it logs to a
//! file and only lets warnings through to stderr. One-shot commands log
//! compactly to stderr.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Log file written by [`LoggingMode::File`], truncated at start
pub const LOG_FILE: &str = "s2c.log";

/// Where log output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LoggingMode {
    /// No output
    Silent,
    /// Compact stderr output
    Console,
    /// INFO and up to the log file, warnings also to stderr
    File,
    /// Verbose stderr output with thread ids and source locations
    Debug,
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Failed to create log file {path}: {source}")]
    LogFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Install the global subscriber for `mode`.
///
/// The filter comes from `CCA_LOG_LEVEL`, then `RUST_LOG`, then the mode's
/// default level.
pub fn init_logging(mode: LoggingMode, log_file: &Path) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    match mode {
        LoggingMode::Silent => Ok(()),
        LoggingMode::Console => Registry::default()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .compact(),
            )
            .with(create_env_filter("info"))
            .try_init()
            .map_err(|e| LoggingError::TracingInit(e.to_string())),
        LoggingMode::File => {
            let file = File::create(log_file).map_err(|source| LoggingError::LogFile {
                path: log_file.display().to_string(),
                source,
            })?;

            Registry::default()
                .with(
                    fmt::layer()
                        .with_writer(Arc::new(file))
                        .with_ansi(false)
                        .with_thread_names(true),
                )
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr.with_max_level(Level::WARN))
                        .with_target(false)
                        .compact(),
                )
                .with(create_env_filter("info"))
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
        LoggingMode::Debug => Registry::default()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .pretty()
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .with(create_env_filter("debug"))
            .try_init()
            .map_err(|e| LoggingError::TracingInit(e.to_string())),
    }
}

fn create_env_filter(default_level: &str) -> EnvFilter {
    filter_directive(
        std::env::var("CCA_LOG_LEVEL").ok(),
        std::env::var("RUST_LOG").ok(),
        default_level,
    )
    .parse()
    .unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn filter_directive(cca_level: Option<String>, rust_log: Option<String>, default_level: &str) -> String {
    cca_level
        .or(rust_log)
        .unwrap_or_else(|| default_level.to_string())
}
