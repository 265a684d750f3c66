//! Strongly-typed IDs. Use these instead of raw strings.
//!
//! An event has one raw id for its whole life: generated on the device, then reused as the
//! remote document key. What differs is how it is *displayed*: a record that has not been
//! accepted by the remote store yet is shown under the local namespace.

use crate::error::CoreError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Marker used by the string form of a local-namespaced display id.
pub const LOCAL_MARKER: &str = "offline_";

fn validate_raw(s: &str) -> Result<String, CoreError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(CoreError::Storage("empty id".to_string()));
    }
    if s.starts_with(LOCAL_MARKER) {
        return Err(CoreError::Storage(format!("raw id must not carry the local marker: {}", s)));
    }
    if s.contains('/') {
        return Err(CoreError::Storage(format!("id must not contain '/': {}", s)));
    }
    Ok(s.to_string())
}

/// Raw event id, shared by the local row and the remote document.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(String);

/// Identity of a user as handed over by the auth collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl EventId {
    /// Fresh client-side id (v4 UUID), never reused.
    pub fn new_local() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn parse(s: impl AsRef<str>) -> Result<Self, CoreError> {
        Self::from_str(s.as_ref())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for EventId {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(validate_raw(s)?))
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl UserId {
    pub fn parse(s: impl AsRef<str>) -> Result<Self, CoreError> {
        let s = s.as_ref().trim();
        if s.is_empty() {
            return Err(CoreError::Auth("empty user id".to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The id a canonical view is shown under.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DisplayId {
    /// Pending: exists only in the local store.
    Local(EventId),
    /// Accepted by the remote store.
    Remote(EventId),
}

impl DisplayId {
    pub fn raw(&self) -> &EventId {
        match self {
            DisplayId::Local(id) | DisplayId::Remote(id) => id,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, DisplayId::Local(_))
    }

    /// Same logical event, regardless of namespace.
    pub fn same_event(&self, other: &DisplayId) -> bool {
        self.raw() == other.raw()
    }

    /// The bare (remote-namespace) form of this id.
    pub fn bare(&self) -> DisplayId {
        DisplayId::Remote(self.raw().clone())
    }

    pub fn parse(s: impl AsRef<str>) -> Result<Self, CoreError> {
        Self::from_str(s.as_ref())
    }
}

impl FromStr for DisplayId {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().strip_prefix(LOCAL_MARKER) {
            Some(rest) => Ok(DisplayId::Local(EventId::from_str(rest)?)),
            None => Ok(DisplayId::Remote(EventId::from_str(s)?)),
        }
    }
}

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayId::Local(id) => write!(f, "{}{}", LOCAL_MARKER, id),
            DisplayId::Remote(id) => write!(f, "{}", id),
        }
    }
}

macro_rules! id_serde {
    ($name:ident) => {
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
                ser.serialize_str(&self.to_string())
            }
        }
        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
                let s = String::deserialize(de)?;
                $name::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}
id_serde!(EventId);
id_serde!(UserId);
id_serde!(DisplayId);
