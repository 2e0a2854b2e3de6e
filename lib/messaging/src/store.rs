//! Persistence gateway for messages.
//!
//! The messaging core only depends on the [`MessageStore`] contract. The
//! server provides a PostgreSQL implementation; [`InMemoryMessageStore`]
//! backs tests and local runs without a database.

use crate::error::StoreError;
use crate::message::MessageRecord;
use crate::room::RoomKey;
use alumnet_core::UserId;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Durable storage boundary for messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Atomically stores a message, assigning its id and timestamp.
    async fn insert_message(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        body: &str,
    ) -> Result<MessageRecord, StoreError>;

    /// Lists the messages delivered to a room, oldest first.
    ///
    /// Rooms that do not belong to a user have no history.
    async fn list_messages(&self, room: &RoomKey) -> Result<Vec<MessageRecord>, StoreError>;

    /// Lists the messages exchanged between two users, oldest first.
    async fn list_conversation(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Vec<MessageRecord>, StoreError>;
}

/// Process-local message store.
///
/// Insertion order is chronological order. Can be switched into an
/// unavailable state to exercise persistence failures.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    records: Mutex<Vec<MessageRecord>>,
    unavailable: AtomicBool,
}

impl InMemoryMessageStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "in-memory store switched off".to_string(),
            });
        }
        Ok(())
    }

    fn filtered(&self, keep: impl Fn(&MessageRecord) -> bool) -> Vec<MessageRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|record| keep(record))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn insert_message(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        body: &str,
    ) -> Result<MessageRecord, StoreError> {
        self.check_available()?;
        let record = MessageRecord::assign(sender_id, recipient_id, body);
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(record)
    }

    async fn list_messages(&self, room: &RoomKey) -> Result<Vec<MessageRecord>, StoreError> {
        self.check_available()?;
        let Some(user_id) = room.user() else {
            return Ok(Vec::new());
        };
        Ok(self.filtered(|record| record.recipient_id == user_id))
    }

    async fn list_conversation(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        self.check_available()?;
        Ok(self.filtered(|record| record.is_between(a, b)))
    }
}
