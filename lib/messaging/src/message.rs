//! Persisted message records.

use alumnet_core::{MessageId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message as stored by the persistence gateway.
///
/// This is also the exact payload pushed to live connections, so sender and
/// receiver observe the same id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Identifier assigned at insert.
    pub id: MessageId,
    /// Who sent the message.
    pub sender_id: UserId,
    /// Who the message is addressed to.
    pub recipient_id: UserId,
    /// Message text.
    pub body: String,
    /// When the store accepted the message.
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    /// Builds a record with a fresh id and the current time.
    ///
    /// Only store implementations should call this.
    #[must_use]
    pub fn assign(sender_id: UserId, recipient_id: UserId, body: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            sender_id,
            recipient_id,
            body: body.into(),
            created_at: Utc::now(),
        }
    }

    /// Returns true if the message was exchanged between `a` and `b`, in
    /// either direction.
    #[must_use]
    pub fn is_between(&self, a: UserId, b: UserId) -> bool {
        (self.sender_id == a && self.recipient_id == b)
            || (self.sender_id == b && self.recipient_id == a)
    }
}
