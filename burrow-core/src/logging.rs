// burrow-core/src/logging.rs
//! Leveled diagnostics on stderr, tunable at runtime.
//!
//! The adapter embeds into host processes that may have no logging framework
//! of their own, so diagnostics go through a small stderr channel gated by a
//! global atomic threshold rather than a logger dependency. Failures proper
//! are never logged here; they travel back to the caller as errors.

use std::sync::atomic::{AtomicU8, Ordering};

/// Diagnostic verbosity threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// Nothing is emitted.
    Off = 0,
    /// Degraded-but-working situations, e.g. ignored definition flags or a
    /// skipped corrupt journal line. The default.
    Warn = 1,
    /// Connection and collection lifecycle milestones.
    Info = 2,
    /// Per-operation detail.
    Debug = 3,
}

impl LogLevel {
    fn tag(self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

static THRESHOLD: AtomicU8 = AtomicU8::new(LogLevel::Warn as u8);

pub fn set_log_level(level: LogLevel) {
    THRESHOLD.store(level as u8, Ordering::Relaxed);
}

pub fn get_log_level() -> LogLevel {
    match THRESHOLD.load(Ordering::Relaxed) {
        0 => LogLevel::Off,
        1 => LogLevel::Warn,
        2 => LogLevel::Info,
        _ => LogLevel::Debug,
    }
}

#[doc(hidden)]
pub fn emit(level: LogLevel, target: &str, message: &str) {
    if level == LogLevel::Off || level > get_log_level() {
        return;
    }
    eprintln!("[{}] {}: {}", level.tag(), target, message);
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::emit(
            $crate::logging::LogLevel::Warn,
            module_path!(),
            &format!($($arg)*)
        )
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::emit(
            $crate::logging::LogLevel::Info,
            module_path!(),
            &format!($($arg)*)
        )
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::emit(
            $crate::logging::LogLevel::Debug,
            module_path!(),
            &format!($($arg)*)
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_order_by_verbosity() {
        assert!(LogLevel::Off < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
    }

    #[test]
    fn test_set_and_get_round_trip() {
        let previous = get_log_level();
        set_log_level(LogLevel::Debug);
        assert_eq!(get_log_level(), LogLevel::Debug);
        set_log_level(LogLevel::Off);
        assert_eq!(get_log_level(), LogLevel::Off);
        set_log_level(previous);
    }
}
