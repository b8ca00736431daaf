//! Ledger record types

use super::presence::{EventKind, IdentityId, PresenceEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One append-only attendance row, before formatting for the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub identity_id: IdentityId,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl AttendanceRecord {
    pub fn new(identity_id: impl Into<IdentityId>, timestamp: DateTime<Utc>, kind: EventKind) -> Self {
        Self {
            identity_id: identity_id.into(),
            timestamp,
            kind,
        }
    }

    /// Build the record for an event whose connection resolved to `identity_id`
    pub fn from_event(identity_id: impl Into<IdentityId>, event: &PresenceEvent) -> Self {
        Self::new(identity_id, event.timestamp, event.kind)
    }
}

/// Text written in the label column for each event kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLabels {
    pub enter: String,
    pub exit: String,
}

impl EventLabels {
    pub fn label(&self, kind: EventKind) -> &str {
        match kind {
            EventKind::Enter => &self.enter,
            EventKind::Exit => &self.exit,
        }
    }
}

impl Default for EventLabels {
    fn default() -> Self {
        Self {
            enter: "Enter".to_string(),
            exit: "Exit".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_from_event() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let event = PresenceEvent::new(EventKind::Exit, "conn-7", ts);
        let record = AttendanceRecord::from_event("U1", &event);
        assert_eq!(record.identity_id, "U1");
        assert_eq!(record.kind, EventKind::Exit);
        assert_eq!(record.timestamp, ts);
    }

    #[test]
    fn test_custom_labels() {
        let labels = EventLabels {
            enter: "入室".to_string(),
            exit: "退室".to_string(),
        };
        assert_eq!(labels.label(EventKind::Enter), "入室");
        assert_eq!(EventLabels::default().label(EventKind::Exit), "Exit");
    }
}
