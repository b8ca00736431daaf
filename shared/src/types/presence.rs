//! Presence event definitions
//!
//! These types represent the notifications delivered by the virtual-space
//! session before they are turned into ledger records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ephemeral id of a live connection. Only meaningful while the session is up.
pub type ConnectionId = String;

/// Stable, globally unique participant id
pub type IdentityId = String;

/// Whether a participant entered or left the space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Enter,
    Exit,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enter => "enter",
            Self::Exit => "exit",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "enter" => Ok(EventKind::Enter),
            "exit" => Ok(EventKind::Exit),
            _ => Err(format!("Invalid event kind: {}", s)),
        }
    }
}

/// A single entry/exit notification from the event source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub kind: EventKind,

    /// Connection the event was observed on
    pub connection_id: ConnectionId,

    /// When the event was observed
    pub timestamp: DateTime<Utc>,
}

impl PresenceEvent {
    pub fn new(kind: EventKind, connection_id: impl Into<ConnectionId>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            connection_id: connection_id.into(),
            timestamp,
        }
    }

    /// Event stamped with the current wall clock
    pub fn now(kind: EventKind, connection_id: impl Into<ConnectionId>) -> Self {
        Self::new(kind, connection_id, Utc::now())
    }
}

/// A participant as known by the event source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,

    /// Not yet known right after a participant joins
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<IdentityId>, display_name: Option<String>) -> Self {
        Self {
            id: id.into(),
            display_name,
        }
    }

    /// The display name, if it has propagated and is not blank
    pub fn name(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
    }
}
