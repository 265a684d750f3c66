//! Run assertion "commands" against an app's canonical event list and the shared backend.
//! Same style as run_commands: e.g. "events count 2", "event party pending", "uploads party 1".
//! Empty lines and # comments are skipped.
//!
//! Commands:
//!   events count <n> | events count >= <n>
//!   events unique                 no logical event appears twice
//!   event <label> pending | synced | absent
//!   event <label> title "<title>"
//!   pending count <n>
//!   remote events count <n>
//!   uploads <label> <n>           upload attempts seen by the backend

use std::collections::{HashMap, HashSet};

use toast_client_core::{CanonicalEventView, EventId, EVENTS};

use super::app_instance::AppInstance;
use super::test_helpers::parse_args;

pub fn assert_commands(
    app: &AppInstance,
    labels: &HashMap<String, EventId>,
    commands: &[&str],
) -> Result<(), String> {
    let events = app
        .core()
        .load_canonical_events(&app.user_id)
        .map_err(String::from)?;
    for cmd in commands {
        let cmd = cmd.trim();
        if cmd.is_empty() || cmd.starts_with('#') {
            continue;
        }
        run_one(app, labels, &events, cmd).map_err(|e| format!("{} (assert: {})", e, cmd))?;
    }
    Ok(())
}

fn check_count(what: &str, args: &[&str], got: usize) -> Result<(), String> {
    let (op, n) = match args {
        [">=", n] => (">=", n),
        [n] => ("==", n),
        _ => return Err(format!("{} count: need [>=] <n>, got {:?}", what, args)),
    };
    let n: usize = n.parse().map_err(|_| format!("{} count: bad number {}", what, n))?;
    let ok = if op == ">=" { got >= n } else { got == n };
    if ok {
        Ok(())
    } else {
        Err(format!("{} count {} {}; got {}", what, op, n, got))
    }
}

fn run_one(
    app: &AppInstance,
    labels: &HashMap<String, EventId>,
    events: &[CanonicalEventView],
    command: &str,
) -> Result<(), String> {
    let args = parse_args(command);
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let label_id = |label: &str| {
        labels
            .get(label)
            .cloned()
            .ok_or_else(|| format!("Event label not found: {}", label))
    };

    match args.as_slice() {
        ["events", "count", rest @ ..] => check_count("events", rest, events.len()),
        ["events", "unique"] => {
            let raw: HashSet<&EventId> = events.iter().map(|v| v.display_id.raw()).collect();
            if raw.len() == events.len() {
                Ok(())
            } else {
                Err(format!("duplicate logical events in {:?}", display_ids(events)))
            }
        }
        ["pending", "count", rest @ ..] => {
            let n = app.core().pending_count().map_err(String::from)?;
            check_count("pending", rest, n as usize)
        }
        ["remote", "events", "count", rest @ ..] => {
            check_count("remote events", rest, app.remote.document_count(EVENTS))
        }
        ["uploads", label, n] => {
            let id = label_id(label)?;
            let want: usize = n.parse().map_err(|_| format!("bad number {}", n))?;
            let got = app.remote.set_attempts(EVENTS, id.as_str());
            if got == want {
                Ok(())
            } else {
                Err(format!("uploads {} = {}; got {}", label, want, got))
            }
        }
        ["event", label, state] if matches!(*state, "pending" | "synced" | "absent") => {
            let id = label_id(label)?;
            let found = events.iter().find(|v| v.display_id.raw() == &id);
            match (*state, found) {
                ("absent", None) => Ok(()),
                ("pending", Some(v)) if v.is_pending() => Ok(()),
                ("synced", Some(v)) if !v.is_pending() => Ok(()),
                _ => Err(format!(
                    "event {} expected {}; list is {:?}",
                    label,
                    state,
                    display_ids(events)
                )),
            }
        }
        ["event", label, "title", title] => {
            let id = label_id(label)?;
            let got = events
                .iter()
                .find(|v| v.display_id.raw() == &id)
                .map(|v| v.record.title.as_str());
            if got == Some(*title) {
                Ok(())
            } else {
                Err(format!("event {} title \"{}\"; got {:?}", label, title, got))
            }
        }
        _ => Err(format!("Unknown assert command: {:?}", args)),
    }
}

fn display_ids(events: &[CanonicalEventView]) -> Vec<String> {
    events.iter().map(|v| v.display_id.to_string()).collect()
}
