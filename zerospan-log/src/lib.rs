// Copyright (c) 2023 Contributors to the Eclipse Foundation
//
// See the NOTICE file(s) distributed with this work for additional
// information regarding copyright ownership.
//
// This program and the accompanying materials are made available under the
// terms of the Apache Software License 2.0 which is available at
// https://www.apache.org/licenses/LICENSE-2.0, or the MIT license
// which is available at https://opensource.org/licenses/MIT.
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The logging API for `zerospan`. Six [`LogLevel`]s, settable via
//! [`set_log_level()`] and readable via [`get_log_level()`], plus an
//! environment-driven initializer reading `ZEROSPAN_LOG_LEVEL`.
//!
//! The [`fail`] macro logs and returns an error from the calling function.
//! The [`fatal_panic`] macro logs and aborts. Both accept `from self` or
//! `from "Origin"` to tag the log line.

use std::env;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

/// Severity of a log line, ordered from most to least verbose.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

const DEFAULT_LOG_LEVEL: LogLevel = LogLevel::Info;
static LOG_LEVEL: AtomicU8 = AtomicU8::new(DEFAULT_LOG_LEVEL as u8);

/// Host-provided sink for `(level, origin, message)` triples.
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, origin: std::fmt::Arguments, args: std::fmt::Arguments);
}

struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, level: LogLevel, origin: std::fmt::Arguments, args: std::fmt::Arguments) {
        eprintln!("{level:?} [{origin}] {args}");
    }
}

static LOGGER: OnceLock<&'static dyn Logger> = OnceLock::new();

fn logger() -> &'static dyn Logger {
    *LOGGER.get_or_init(|| &ConsoleLogger)
}

/// Installs a custom logger. Only the first call has an effect; returns
/// whether this call was the one that installed it.
pub fn set_logger(logger: &'static dyn Logger) -> bool {
    LOGGER.set(logger).is_ok()
}

pub fn set_log_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn get_log_level() -> LogLevel {
    match LOG_LEVEL.load(Ordering::Relaxed) {
        0 => LogLevel::Trace,
        1 => LogLevel::Debug,
        2 => LogLevel::Info,
        3 => LogLevel::Warn,
        4 => LogLevel::Error,
        _ => LogLevel::Fatal,
    }
}

fn level_from_str_fuzzy(value: &str, fallback: LogLevel) -> LogLevel {
    match value.to_lowercase().as_str() {
        "trace" => LogLevel::Trace,
        "debug" => LogLevel::Debug,
        "info" => LogLevel::Info,
        "warn" => LogLevel::Warn,
        "error" => LogLevel::Error,
        "fatal" => LogLevel::Fatal,
        _ => {
            eprintln!(
                "Invalid value for 'ZEROSPAN_LOG_LEVEL' environment variable! Found: {value:?}. \
                 Allowed: trace, debug, info, warn, error, fatal. Using {fallback:?}."
            );
            fallback
        }
    }
}

/// Reads `ZEROSPAN_LOG_LEVEL`, falling back to `fallback` when unset.
pub fn set_log_level_from_env_or(fallback: LogLevel) {
    let level = env::var("ZEROSPAN_LOG_LEVEL")
        .ok()
        .map(|v| level_from_str_fuzzy(&v, fallback))
        .unwrap_or(fallback);
    set_log_level(level);
}

pub fn set_log_level_from_env_or_default() {
    set_log_level_from_env_or(DEFAULT_LOG_LEVEL);
}

#[doc(hidden)]
pub fn __print_log_msg(level: LogLevel, origin: std::fmt::Arguments, args: std::fmt::Arguments) {
    if level >= get_log_level() {
        logger().log(level, origin, args);
    }
}

/// Logs at [`LogLevel::Trace`]. Accepts an optional `from self`/`from "Origin"` prefix.
#[macro_export]
macro_rules! trace {
    (from $origin:expr, $($arg:tt)*) => {
        $crate::__print_log_msg($crate::LogLevel::Trace, format_args!("{:?}", $origin), format_args!($($arg)*))
    };
    ($($arg:tt)*) => {
        $crate::__print_log_msg($crate::LogLevel::Trace, format_args!(""), format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! debug {
    (from $origin:expr, $($arg:tt)*) => {
        $crate::__print_log_msg($crate::LogLevel::Debug, format_args!("{:?}", $origin), format_args!($($arg)*))
    };
    ($($arg:tt)*) => {
        $crate::__print_log_msg($crate::LogLevel::Debug, format_args!(""), format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! info {
    (from $origin:expr, $($arg:tt)*) => {
        $crate::__print_log_msg($crate::LogLevel::Info, format_args!("{:?}", $origin), format_args!($($arg)*))
    };
    ($($arg:tt)*) => {
        $crate::__print_log_msg($crate::LogLevel::Info, format_args!(""), format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! warn {
    (from $origin:expr, $($arg:tt)*) => {
        $crate::__print_log_msg($crate::LogLevel::Warn, format_args!("{:?}", $origin), format_args!($($arg)*))
    };
    ($($arg:tt)*) => {
        $crate::__print_log_msg($crate::LogLevel::Warn, format_args!(""), format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! error {
    (from $origin:expr, $($arg:tt)*) => {
        $crate::__print_log_msg($crate::LogLevel::Error, format_args!("{:?}", $origin), format_args!($($arg)*))
    };
    ($($arg:tt)*) => {
        $crate::__print_log_msg($crate::LogLevel::Error, format_args!(""), format_args!($($arg)*))
    };
}

/// Logs at [`LogLevel::Error`] and returns `Err(with-value)` from the
/// calling function, optionally forwarding an existing `Result`'s error via
/// `when <expr>`.
#[macro_export]
macro_rules! fail {
    (from $origin:expr, when $e:expr, with $rv:expr, $($arg:tt)*) => {
        match $e {
            Ok(v) => v,
            Err(_) => {
                $crate::error!(from $origin, $($arg)*);
                return Err($rv);
            }
        }
    };
    (from $origin:expr, when $e:expr, $($arg:tt)*) => {
        match $e {
            Ok(v) => v,
            Err(e) => {
                $crate::error!(from $origin, $($arg)*);
                return Err(e.into());
            }
        }
    };
    (from $origin:expr, with $rv:expr, $($arg:tt)*) => {{
        $crate::error!(from $origin, $($arg)*);
        return Err($rv);
    }};
}

/// Logs at [`LogLevel::Fatal`] and panics.
#[macro_export]
macro_rules! fatal_panic {
    (from $origin:expr, when $e:expr, $($arg:tt)*) => {
        match $e {
            Ok(v) => v,
            Err(_) => {
                $crate::error!(from $origin, $($arg)*);
                panic!($($arg)*);
            }
        }
    };
    (from $origin:expr, $($arg:tt)*) => {{
        $crate::error!(from $origin, $($arg)*);
        panic!($($arg)*);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_log_level_is_info() {
        assert_eq!(get_log_level(), LogLevel::Info);
    }

    #[test]
    fn env_fallback_is_used_when_unset() {
        // SAFETY: test-only, single-threaded env mutation guarded by the test harness default.
        unsafe { env::remove_var("ZEROSPAN_LOG_LEVEL") };
        set_log_level_from_env_or(LogLevel::Warn);
        assert_eq!(get_log_level(), LogLevel::Warn);
    }

    #[test]
    fn fuzzy_level_parses_case_insensitively() {
        assert_eq!(level_from_str_fuzzy("WARN", LogLevel::Info), LogLevel::Warn);
        assert_eq!(level_from_str_fuzzy("bogus", LogLevel::Info), LogLevel::Info);
    }
}
