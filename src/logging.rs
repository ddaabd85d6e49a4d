//! Leveled stderr logging for the Flight dispatch surfaces.
//!
//! Verbosity is a process-wide threshold read once from
//! `AIRPORT_LOG_LEVEL`.  Every line names the dispatch surface that wrote
//! it, and handlers append their catalog call context as trailing
//! `key=value` pairs, so a single grep per surface (`[scan]`, `[dml]`)
//! follows a request through the server.

use std::env;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Parse a level name; unrecognized names are `None` so the caller
    /// decides the fallback.
    pub fn parse(value: &str) -> Option<LogLevel> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("error") {
            Some(LogLevel::Error)
        } else if value.eq_ignore_ascii_case("warn") || value.eq_ignore_ascii_case("warning") {
            Some(LogLevel::Warn)
        } else if value.eq_ignore_ascii_case("info") {
            Some(LogLevel::Info)
        } else if value.eq_ignore_ascii_case("debug") {
            Some(LogLevel::Debug)
        } else if value.eq_ignore_ascii_case("trace") {
            Some(LogLevel::Trace)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    /// The process-wide threshold, resolved from `AIRPORT_LOG_LEVEL` on
    /// first use and fixed for the lifetime of the server.
    pub fn threshold() -> LogLevel {
        static THRESHOLD: OnceLock<LogLevel> = OnceLock::new();
        *THRESHOLD.get_or_init(|| {
            env::var("AIRPORT_LOG_LEVEL")
                .ok()
                .and_then(|value| LogLevel::parse(&value))
                .unwrap_or(LogLevel::Info)
        })
    }
}

/// The surfaces that write log lines, one per handler family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    /// Server lifecycle: construction, listeners, shutdown, registry.
    Server,
    /// ListFlights, GetFlightInfo and GetSchema.
    Discovery,
    /// DoGet.
    Scan,
    /// DoPut and DoExchange.
    Dml,
    /// DoAction and ListActions.
    Actions,
    /// Transaction coordination.
    Transaction,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Server => "server",
            LogCategory::Discovery => "discovery",
            LogCategory::Scan => "scan",
            LogCategory::Dml => "dml",
            LogCategory::Actions => "actions",
            LogCategory::Transaction => "transaction",
        }
    }
}

pub struct AirportLogger;

impl AirportLogger {
    /// Write `[ts] [LEVEL] [surface] message key=value ...` to stderr
    /// when `level` passes the threshold.
    pub fn log(level: LogLevel, category: LogCategory, message: &str, context: &[(&str, &str)]) {
        if level > LogLevel::threshold() {
            return;
        }
        let clock = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let mut line = format!(
            "[{}.{:03}] [{}] [{}] {}",
            clock.as_secs(),
            clock.subsec_millis(),
            level.as_str(),
            category.as_str(),
            message
        );
        for (key, value) in context {
            line.push(' ');
            line.push_str(key);
            line.push('=');
            line.push_str(value);
        }
        eprintln!("{line}");
    }
}

#[macro_export]
macro_rules! airport_error {
    ($category:ident, $($arg:tt)*) => {
        $crate::logging::AirportLogger::log(
            $crate::logging::LogLevel::Error,
            $crate::logging::LogCategory::$category,
            &format!($($arg)*),
            &[],
        )
    };
}

#[macro_export]
macro_rules! airport_warn {
    ($category:ident, $($arg:tt)*) => {
        $crate::logging::AirportLogger::log(
            $crate::logging::LogLevel::Warn,
            $crate::logging::LogCategory::$category,
            &format!($($arg)*),
            &[],
        )
    };
}

#[macro_export]
macro_rules! airport_info {
    ($category:ident, $($arg:tt)*) => {
        $crate::logging::AirportLogger::log(
            $crate::logging::LogLevel::Info,
            $crate::logging::LogCategory::$category,
            &format!($($arg)*),
            &[],
        )
    };
}

#[macro_export]
macro_rules! airport_debug {
    ($category:ident, $($arg:tt)*) => {
        $crate::logging::AirportLogger::log(
            $crate::logging::LogLevel::Debug,
            $crate::logging::LogCategory::$category,
            &format!($($arg)*),
            &[],
        )
    };
}

#[macro_export]
macro_rules! airport_trace {
    ($category:ident, $($arg:tt)*) => {
        $crate::logging::AirportLogger::log(
            $crate::logging::LogLevel::Trace,
            $crate::logging::LogCategory::$category,
            &format!($($arg)*),
            &[],
        )
    };
}
