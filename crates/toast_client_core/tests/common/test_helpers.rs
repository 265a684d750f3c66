//! Shared helpers for integration tests: argument parsing, polling, remote fixtures.

use std::time::{Duration, Instant};
use toast_client_core::Fields;

pub const WAIT: Duration = Duration::from_secs(5);

/// Split on spaces, keeping "quoted strings" together (quotes removed).
pub fn parse_args(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    for c in input.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == ' ' && !in_quotes {
            if !buf.is_empty() {
                args.push(std::mem::take(&mut buf));
            }
        } else {
            buf.push(c);
        }
    }
    if !buf.is_empty() {
        args.push(buf);
    }
    args
}

/// Poll `f` until it holds or `timeout` elapses. Background passes run on the core's runtime.
pub fn wait_until(timeout: Duration, mut f: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    f()
}

/// An RSVP document as another guest's client would write it.
pub fn rsvp_fields(name: &str, status: &str) -> Fields {
    let mut m = Fields::new();
    m.insert("userName".into(), name.into());
    m.insert("status".into(), status.into());
    m
}
