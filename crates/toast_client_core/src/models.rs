//! Data models for events, guests and the reconciled display view.
//! Remote documents are JSON objects; the mapping to and from them lives here too.

use crate::ids::{DisplayId, EventId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where a record was read from. A field, not a type distinction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Local,
    Remote,
}

/// Fields the host fills in when creating an event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub date: String,
    pub time: String,
    pub location: String,
    pub category: String,
    pub drive_link: String,
    pub dietary_options: Vec<String>,
    pub music_suggestions: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    pub owner_id: String,
    /// Empty when the auth provider has no address for the owner.
    pub owner_email: String,
    pub title: String,
    pub description: String,
    pub date: String,
    pub time: String,
    pub location: String,
    pub category: String,
    pub drive_link: String,
    pub dietary_options: Vec<String>,
    pub music_suggestions: Vec<String>,
    /// Milliseconds since epoch.
    pub created_at: i64,
    pub synced: bool,
    pub origin: Origin,
}

impl EventRecord {
    /// A fresh, pending local record.
    pub fn from_new(input: NewEvent, owner_id: &str, created_at: i64) -> Self {
        Self {
            id: EventId::new_local(),
            owner_id: owner_id.to_string(),
            owner_email: String::new(),
            title: input.title,
            description: input.description,
            date: input.date,
            time: input.time,
            location: input.location,
            category: input.category,
            drive_link: input.drive_link,
            dietary_options: input.dietary_options,
            music_suggestions: input.music_suggestions,
            created_at,
            synced: false,
            origin: Origin::Local,
        }
    }

    /// Fields written to `events/{id}`.
    pub fn to_remote_fields(&self) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("title".into(), Value::from(self.title.clone()));
        m.insert("description".into(), Value::from(self.description.clone()));
        m.insert("date".into(), Value::from(self.date.clone()));
        m.insert("time".into(), Value::from(self.time.clone()));
        m.insert("location".into(), Value::from(self.location.clone()));
        m.insert("category".into(), Value::from(self.category.clone()));
        m.insert("googleDriveLink".into(), Value::from(self.drive_link.clone()));
        m.insert("dietaryRequirements".into(), Value::from(self.dietary_options.clone()));
        m.insert("musicSuggestions".into(), Value::from(self.music_suggestions.clone()));
        m.insert("hostUserId".into(), Value::from(self.owner_id.clone()));
        m.insert("hostEmail".into(), Value::from(self.owner_email.clone()));
        m.insert("createdAt".into(), Value::from(self.created_at.to_string()));
        m
    }

    /// Read a remote document. Missing fields fall back to empty values; an unusable id is rejected.
    pub fn from_remote(id: &str, fields: &Map<String, Value>) -> Option<Self> {
        let id = EventId::parse(id).ok()?;
        let text = |k: &str| fields.get(k).and_then(|v| v.as_str()).unwrap_or("").to_string();
        let list = |k: &str| match fields.get(k) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            Some(Value::String(s)) => split_list(s),
            _ => Vec::new(),
        };
        let created_at = match fields.get("createdAt") {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        };
        Some(Self {
            id,
            owner_id: text("hostUserId"),
            owner_email: text("hostEmail"),
            title: text("title"),
            description: text("description"),
            date: text("date"),
            time: text("time"),
            location: text("location"),
            category: text("category"),
            drive_link: text("googleDriveLink"),
            dietary_options: list("dietaryRequirements"),
            music_suggestions: list("musicSuggestions"),
            created_at,
            synced: true,
            origin: Origin::Remote,
        })
    }
}

/// Values are stored comma-joined in one column. Values must not contain a comma.
pub fn join_list(items: &[String]) -> String {
    items.join(",")
}

pub fn split_list(s: &str) -> Vec<String> {
    if s.is_empty() {
        return Vec::new();
    }
    s.split(',').map(String::from).collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum RsvpStatus {
    Going,
    NotGoing,
    Maybe,
    #[default]
    Unset,
}

impl RsvpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RsvpStatus::Going => "going",
            RsvpStatus::NotGoing => "notGoing",
            RsvpStatus::Maybe => "maybe",
            RsvpStatus::Unset => "unset",
        }
    }

    /// Case-insensitive; anything unknown is `Unset`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "going" => RsvpStatus::Going,
            "notgoing" | "not_going" | "not going" => RsvpStatus::NotGoing,
            "maybe" => RsvpStatus::Maybe,
            _ => RsvpStatus::Unset,
        }
    }
}

impl std::fmt::Display for RsvpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One respondent's answer for one event, keyed by respondent id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestEntry {
    pub guest_id: String,
    pub user_name: String,
    pub status: RsvpStatus,
    pub dietary_choice: String,
    pub music_choice: String,
}

impl GuestEntry {
    pub fn from_remote(guest_id: &str, fields: &Map<String, Value>) -> Self {
        let text = |k: &str, default: &str| {
            fields
                .get(k)
                .and_then(|v| v.as_str())
                .unwrap_or(default)
                .to_string()
        };
        Self {
            guest_id: guest_id.to_string(),
            user_name: text("userName", "Anonymous"),
            status: RsvpStatus::parse(&text("status", "")),
            dietary_choice: text("dietaryChoice", "Not specified"),
            music_choice: text("musicChoice", "Not specified"),
        }
    }

    pub fn to_remote_fields(&self) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("userName".into(), Value::from(self.user_name.clone()));
        m.insert("status".into(), Value::from(self.status.as_str()));
        m.insert("dietaryChoice".into(), Value::from(self.dietary_choice.clone()));
        m.insert("musicChoice".into(), Value::from(self.music_choice.clone()));
        m
    }

    pub fn is_going(&self) -> bool {
        self.status == RsvpStatus::Going
    }
}

/// Reconciled, display-ready event. Never persisted.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CanonicalEventView {
    pub display_id: DisplayId,
    pub record: EventRecord,
    pub attendee_count: usize,
    pub going_count: usize,
    pub guests: Vec<GuestEntry>,
}

impl CanonicalEventView {
    pub fn new(display_id: DisplayId, record: EventRecord) -> Self {
        Self {
            display_id,
            record,
            attendee_count: 0,
            going_count: 0,
            guests: Vec::new(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.display_id.is_local()
    }

    pub fn apply_guests(&mut self, going_count: usize, guests: &[GuestEntry]) {
        self.going_count = going_count;
        self.attendee_count = going_count;
        self.guests = guests.to_vec();
    }
}
