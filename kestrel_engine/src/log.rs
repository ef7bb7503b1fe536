//! Internal logging system for the Kestrel engine
//!
//! This module provides:
//! - A replaceable logger via the [`Logger`] trait
//! - Severity levels (Trace, Debug, Info, Warn, Error)
//! - Colored console output by default
//! - File and line information for ERROR logs
//!
//! Logging is a side channel: the `engine_err!` family logs and then hands an
//! [`Error`](crate::kestrel::Error) back to the caller, control flow stays in
//! the `Result`.

use colored::*;
use std::time::SystemTime;
use chrono::{DateTime, Local};

/// Logger trait for custom logging implementations
///
/// # Example
///
/// ```no_run
/// use kestrel_engine::kestrel::log::{Logger, LogEntry};
///
/// struct FileLogger {
///     file: std::fs::File,
/// }
///
/// impl Logger for FileLogger {
///     fn log(&self, entry: &LogEntry) {
///         // Write to file...
///     }
/// }
/// ```
pub trait Logger: Send + Sync {
    /// Process one log entry
    fn log(&self, entry: &LogEntry);
}

/// Log entry containing all information about a log message
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Severity level
    pub severity: LogSeverity,

    /// Timestamp when the log was created
    pub timestamp: SystemTime,

    /// Source module (e.g., "kestrel::Renderer", "kestrel::vulkan")
    pub source: String,

    /// Log message
    pub message: String,

    /// Source file (only for detailed logs)
    pub file: Option<&'static str>,

    /// Source line (only for detailed logs)
    pub line: Option<u32>,
}

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogSeverity {
    /// Very verbose per-frame information
    Trace,

    /// Development/debugging information
    Debug,

    /// Important informational messages
    Info,

    /// Potential issues, recovered automatically
    Warn,

    /// Failures, reported with file:line
    Error,
}

/// Default logger, colored console output
///
/// Format:
/// - Normal: `[timestamp] [SEVERITY] [source] message`
/// - Detailed: `[timestamp] [SEVERITY] [source] message (file:line)`
pub struct DefaultLogger;

impl DefaultLogger {
    /// Render an entry to the exact line printed (without color codes when
    /// colors are disabled by the terminal)
    pub fn format_entry(entry: &LogEntry) -> String {
        let datetime: DateTime<Local> = entry.timestamp.into();
        let timestamp = datetime.format("%Y-%m-%d %H:%M:%S%.3f").to_string();

        let severity_str = match entry.severity {
            LogSeverity::Trace => "TRACE".bright_black(),
            LogSeverity::Debug => "DEBUG".cyan(),
            LogSeverity::Info => "INFO ".green(),
            LogSeverity::Warn => "WARN ".yellow(),
            LogSeverity::Error => "ERROR".red().bold(),
        };

        let source = entry.source.bright_blue();

        if let (Some(file), Some(line)) = (entry.file, entry.line) {
            format!(
                "[{}] [{}] [{}] {} ({}:{})",
                timestamp, severity_str, source, entry.message, file, line
            )
        } else {
            format!("[{}] [{}] [{}] {}", timestamp, severity_str, source, entry.message)
        }
    }
}

impl Logger for DefaultLogger {
    fn log(&self, entry: &LogEntry) {
        println!("{}", Self::format_entry(entry));
    }
}

// ===== LOGGING MACROS =====

/// Log a TRACE message (per-frame detail)
#[macro_export]
macro_rules! engine_trace {
    ($source:expr, $($arg:tt)*) => {
        $crate::kestrel::Engine::log(
            $crate::kestrel::log::LogSeverity::Trace,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log a DEBUG message
#[macro_export]
macro_rules! engine_debug {
    ($source:expr, $($arg:tt)*) => {
        $crate::kestrel::Engine::log(
            $crate::kestrel::log::LogSeverity::Debug,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log an INFO message
///
/// ```no_run
/// # use kestrel_engine::engine_info;
/// engine_info!("kestrel::Renderer", "Swapchain recreated at {}x{}", 1280, 720);
/// ```
#[macro_export]
macro_rules! engine_info {
    ($source:expr, $($arg:tt)*) => {
        $crate::kestrel::Engine::log(
            $crate::kestrel::log::LogSeverity::Info,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log a WARN message
#[macro_export]
macro_rules! engine_warn {
    ($source:expr, $($arg:tt)*) => {
        $crate::kestrel::Engine::log(
            $crate::kestrel::log::LogSeverity::Warn,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log an ERROR message with file:line information
#[macro_export]
macro_rules! engine_error {
    ($source:expr, $($arg:tt)*) => {
        $crate::kestrel::Engine::log_detailed(
            $crate::kestrel::log::LogSeverity::Error,
            $source,
            format!($($arg)*),
            file!(),
            line!()
        )
    };
}

/// Log at ERROR and evaluate to an `Error::BackendError` carrying the same message
///
/// ```no_run
/// # use kestrel_engine::engine_err;
/// # fn f() -> kestrel_engine::kestrel::Result<()> {
/// let code = -4;
/// Err(engine_err!("kestrel::vulkan", "vkCreateBuffer failed: {}", code))
/// # }
/// ```
#[macro_export]
macro_rules! engine_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::kestrel::Engine::log_detailed(
            $crate::kestrel::log::LogSeverity::Error,
            $source,
            message.clone(),
            file!(),
            line!()
        );
        $crate::kestrel::Error::BackendError(message)
    }};
}

/// Log at ERROR and return `Err(Error::BackendError)` from the enclosing function
#[macro_export]
macro_rules! engine_bail {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::engine_err!($source, $($arg)*))
    };
}

/// Log at WARN and evaluate to an `Error::BackendError`
#[macro_export]
macro_rules! engine_warn_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::kestrel::Engine::log(
            $crate::kestrel::log::LogSeverity::Warn,
            $source,
            message.clone()
        );
        $crate::kestrel::Error::BackendError(message)
    }};
}

/// Log at WARN and return `Err(Error::BackendError)` from the enclosing function
#[macro_export]
macro_rules! engine_bail_warn {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::engine_warn_err!($source, $($arg)*))
    };
}

/// Log at ERROR and evaluate to an `Error::ContractViolation`
#[macro_export]
macro_rules! engine_violation {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::kestrel::Engine::log_detailed(
            $crate::kestrel::log::LogSeverity::Error,
            $source,
            message.clone(),
            file!(),
            line!()
        );
        $crate::kestrel::Error::ContractViolation(message)
    }};
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
