//! Change-notification event types.
//!
//! The service publishes one [`ChangeEvent`] per committed mutation,
//! carrying the full current row rather than a diff, and streams them to
//! WebSocket subscribers as [`StreamFrame`]s. A subscriber that falls
//! behind receives a `resync` frame instead of the rows it missed and is
//! expected to refetch.

use serde::{Deserialize, Serialize};

/// Table an event originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTable {
    Rooms,
    Participants,
    Messages,
    Suggestions,
}

impl ChangeTable {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeTable::Rooms => "rooms",
            ChangeTable::Participants => "participants",
            ChangeTable::Messages => "messages",
            ChangeTable::Suggestions => "suggestions",
        }
    }
}

/// Kind of mutation an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// One committed mutation, carrying the full row as it looks now.
///
/// Room rows are published in their public projection, so a join code
/// never travels through the fanout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangeEvent {
    /// Table the row belongs to.
    pub table: ChangeTable,

    /// Kind of mutation.
    pub operation: ChangeOp,

    /// Full current row in its public wire shape.
    pub new_value: serde_json::Value,
}

/// One frame on a subscription stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    /// A committed mutation.
    Change(ChangeEvent),

    /// The subscriber lagged and missed `skipped` events; it must
    /// refetch current state instead of relying on the stream.
    Resync {
        /// Number of events dropped from this subscriber's buffer.
        skipped: u64,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn change_frame_serializes_with_type_tag() {
        let frame = StreamFrame::Change(ChangeEvent {
            table: ChangeTable::Participants,
            operation: ChangeOp::Update,
            new_value: serde_json::json!({"is_active": false}),
        });

        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "change");
        assert_eq!(json["table"], "participants");
        assert_eq!(json["operation"], "update");
    }

    #[test]
    fn resync_frame_round_trips() {
        let json = r#"{"type":"resync","skipped":12}"#;
        let frame: StreamFrame = serde_json::from_str(json).unwrap();

        assert!(matches!(frame, StreamFrame::Resync { skipped: 12 }));
    }
}
