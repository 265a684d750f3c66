//! Buffers core log lines so the UI shell can drain and show them, and forwards
//! every line to the `log` facade so a host logger (android_logger, env_logger, ...) sees them.

use log::Level;
use once_cell::sync::Lazy;
use std::sync::Mutex;

static RUST_LOG_BUFFER: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(Vec::new()));

const MAX_BUFFER_LEN: usize = 500;

fn should_buffer(level: Level, s: &str) -> bool {
    if level <= Level::Warn {
        return true;
    }
    let lower = s.to_lowercase();
    if lower.contains("error") || lower.contains("failed") {
        return true;
    }

    // Keep background activity the user cannot otherwise see; drop the rest to reduce noise.
    lower.contains("sync") || lower.contains("feed") || lower.contains("connectivity")
}

/// Push a log line. Called by the rust_log! macro.
pub fn push(level: Level, s: String) {
    log::log!(target: "toast_rs", level, "{}", s);
    if !should_buffer(level, &s) {
        return;
    }
    if let Ok(mut v) = RUST_LOG_BUFFER.lock() {
        v.push(s);
        let n = v.len();
        if n > MAX_BUFFER_LEN {
            v.drain(0..n - MAX_BUFFER_LEN);
        }
    }
}

/// Drain and clear buffered log lines.
pub fn drain_rust_logs() -> Vec<String> {
    RUST_LOG_BUFFER
        .lock()
        .map(|mut v| std::mem::take(&mut *v))
        .unwrap_or_default()
}

#[macro_export]
macro_rules! rust_log {
    (error, $($t:tt)*) => {
        $crate::log_bridge::push(::log::Level::Error, format!($($t)*))
    };
    (warn, $($t:tt)*) => {
        $crate::log_bridge::push(::log::Level::Warn, format!($($t)*))
    };
    (debug, $($t:tt)*) => {
        $crate::log_bridge::push(::log::Level::Debug, format!($($t)*))
    };
    ($($t:tt)*) => {
        $crate::log_bridge::push(::log::Level::Info, format!($($t)*))
    };
}
