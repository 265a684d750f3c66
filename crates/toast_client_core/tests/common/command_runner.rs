//! Run text commands against an app instance.
//! Commands:
//!   event create "Title" [label]      create an event (pending until synced)
//!   online | offline                  platform network state
//!   remote down | remote up           backend reachability (network stays as reported)
//!   remote reject label | remote accept
//!   rsvp label guestId status ["Name"]  another guest answers through the backend
//!   respond label status              this user answers
//!   signout
//!   sync                              explicit pass, errors are returned
//!   await synced                      wait for background passes to drain the queue
//!   wait <ms>
//! Empty lines and # comments are skipped.

use std::collections::HashMap;
use std::time::Duration;

use toast_client_core::{rsvps_collection, EventId, NewEvent, RemoteStore, RsvpStatus};

use super::app_instance::AppInstance;
use super::test_helpers::{parse_args, rsvp_fields, wait_until, WAIT};

/// Tracks label -> event id; runs commands via the core API.
pub struct CommandRunner {
    pub event_ids: HashMap<String, EventId>,
}

impl CommandRunner {
    pub fn new() -> Self {
        Self {
            event_ids: HashMap::new(),
        }
    }

    /// Execute a list of commands. Returns Err on first failure.
    pub fn execute_commands(&mut self, app: &AppInstance, commands: &[&str]) -> Result<(), String> {
        for cmd in commands {
            let cmd = cmd.trim();
            if cmd.is_empty() || cmd.starts_with('#') {
                continue;
            }
            self.execute_command(app, cmd)
                .map_err(|e| format!("{} (command: {})", e, cmd))?;
        }
        Ok(())
    }

    fn label(&self, label: &str) -> Result<EventId, String> {
        self.event_ids
            .get(label)
            .cloned()
            .ok_or_else(|| format!("Event label not found: {}", label))
    }

    pub fn execute_command(&mut self, app: &AppInstance, command: &str) -> Result<(), String> {
        let args = parse_args(command);
        if args.is_empty() {
            return Err("Empty command".to_string());
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match args[0].to_lowercase().as_str() {
            "event" => self.do_event(app, &args[1..]),
            "online" => {
                app.go_online();
                Ok(())
            }
            "offline" => {
                app.go_offline();
                Ok(())
            }
            "remote" => match args.get(1).copied() {
                Some("down") => {
                    app.remote.set_offline(true);
                    Ok(())
                }
                Some("up") => {
                    app.remote.set_offline(false);
                    Ok(())
                }
                Some("reject") => {
                    let id = self.label(args.get(2).copied().unwrap_or(""))?;
                    app.remote.fail_uploads_for(id.as_str());
                    Ok(())
                }
                Some("accept") => {
                    app.remote.clear_failures();
                    Ok(())
                }
                other => Err(format!("Unknown remote action: {:?}", other)),
            },
            "rsvp" => {
                if args.len() < 4 {
                    return Err("rsvp requires label guestId status".to_string());
                }
                let id = self.label(args[1])?;
                let name = args.get(4).copied().unwrap_or("Guest");
                app.remote
                    .set(&rsvps_collection(&id), args[2], rsvp_fields(name, args[3]))
                    .map_err(String::from)
            }
            "respond" => {
                if args.len() < 3 {
                    return Err("respond requires label status".to_string());
                }
                let id = self.label(args[1])?;
                let display = toast_client_core::DisplayId::Remote(id);
                app.core()
                    .respond(&display, RsvpStatus::parse(args[2]), None, None)
                    .map(|_| ())
                    .map_err(String::from)
            }
            "signout" => app.auth().sign_out().map_err(String::from),
            "sync" => app.core().sync_now().map(|_| ()).map_err(String::from),
            "await" if args.get(1) == Some(&"synced") => {
                if wait_until(WAIT, || matches!(app.core().pending_count(), Ok(0))) {
                    Ok(())
                } else {
                    Err(format!("still pending: {:?}", app.core().pending_count()))
                }
            }
            "wait" => {
                let ms = args.get(1).and_then(|s| s.parse::<u64>().ok()).unwrap_or(100);
                std::thread::sleep(Duration::from_millis(ms));
                Ok(())
            }
            other => Err(format!("Unknown action: {}", other)),
        }
    }

    fn do_event(&mut self, app: &AppInstance, args: &[&str]) -> Result<(), String> {
        match args.first().map(|s| s.to_lowercase()).as_deref() {
            Some("create") => {
                let title = args.get(1).ok_or("event create requires a title")?.to_string();
                let label = args
                    .get(2)
                    .map(|s| s.to_lowercase())
                    .unwrap_or_else(|| title.to_lowercase().replace(' ', "_"));
                let record = app
                    .core()
                    .create_event(NewEvent {
                        title,
                        category: "Party".into(),
                        ..Default::default()
                    })
                    .map_err(String::from)?;
                self.event_ids.insert(label, record.id);
                Ok(())
            }
            other => Err(format!("Unknown event action: {:?}", other)),
        }
    }
}
