//! Message ingest: the single entry point for new messages.
//!
//! `submit` persists first and dispatches second. A message that was not
//! stored is never pushed, and a push that reaches nobody never fails the
//! submission. Submissions to the same room are serialized so that the
//! store and every live subscriber see them in submission order.

use crate::dispatch::{DeliveryOutcome, Dispatcher};
use crate::error::IngestError;
use crate::message::MessageRecord;
use crate::room::RoomKey;
use crate::store::MessageStore;
use alumnet_core::UserId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, instrument, warn};

/// A successfully stored message and what happened when it was pushed.
#[derive(Debug, Clone)]
pub struct Submission {
    /// The persisted record, identical to what subscribers received.
    pub record: Arc<MessageRecord>,
    /// Live delivery result.
    pub delivery: DeliveryOutcome,
}

/// Per-room ordering locks.
///
/// Entries are dropped once nobody holds or waits on them.
#[derive(Debug, Default)]
struct RoomLocks {
    locks: Mutex<HashMap<RoomKey, Arc<AsyncMutex<()>>>>,
}

impl RoomLocks {
    /// Waits for exclusive access to `room`.
    ///
    /// The returned turn releases the room when dropped, including when the
    /// caller is cancelled while holding it.
    async fn acquire(&self, room: &RoomKey) -> RoomTurn<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(room.clone()).or_default())
        };
        let mut turn = RoomTurn {
            locks: self,
            room: room.clone(),
            lock,
            guard: None,
        };
        turn.guard = Some(Arc::clone(&turn.lock).lock_owned().await);
        turn
    }

    fn release(&self, room: &RoomKey, lock: &Arc<AsyncMutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // The map and the finished turn are the only owners.
        if Arc::strong_count(lock) == 2 {
            locks.remove(room);
        }
    }

    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Exclusive access to one room's submission path.
struct RoomTurn<'a> {
    locks: &'a RoomLocks,
    room: RoomKey,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RoomTurn<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.room, &self.lock);
    }
}

/// Coordinates persistence and live delivery of new messages.
pub struct MessageIngest {
    store: Arc<dyn MessageStore>,
    dispatcher: Dispatcher,
    max_body_len: usize,
    room_locks: RoomLocks,
}

impl MessageIngest {
    /// Creates an ingest path over the given store and dispatcher.
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>, dispatcher: Dispatcher, max_body_len: usize) -> Self {
        Self {
            store,
            dispatcher,
            max_body_len,
            room_locks: RoomLocks::default(),
        }
    }

    /// Validates, persists and then pushes a message to the recipient's room.
    ///
    /// # Errors
    ///
    /// - [`IngestError::InvalidArgument`] if the body is blank or too long.
    /// - [`IngestError::Persistence`] if the store failed; nothing is pushed.
    #[instrument(skip(self, body), fields(sender = %sender_id, recipient = %recipient_id))]
    pub async fn submit(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        body: &str,
    ) -> Result<Submission, IngestError> {
        self.validate_body(body)?;

        // Only the recipient's room is targeted; the sender sees its own
        // message through the submission response.
        let room = RoomKey::for_user(recipient_id);
        let _turn = self.room_locks.acquire(&room).await;

        self.persist_and_push(&room, sender_id, recipient_id, body).await
    }

    async fn persist_and_push(
        &self,
        room: &RoomKey,
        sender_id: UserId,
        recipient_id: UserId,
        body: &str,
    ) -> Result<Submission, IngestError> {
        let record = self
            .store
            .insert_message(sender_id, recipient_id, body)
            .await
            .map_err(|e| {
                warn!(error = %e, "message not stored, skipping dispatch");
                IngestError::Persistence(e)
            })?;
        let record = Arc::new(record);

        let delivery = self.dispatcher.push(room, Arc::clone(&record)).await;
        info!(
            message_id = %record.id,
            delivered = delivery.delivered,
            attempted = delivery.attempted,
            partial = delivery.is_partial(),
            "message submitted"
        );

        Ok(Submission { record, delivery })
    }

    fn validate_body(&self, body: &str) -> Result<(), IngestError> {
        if body.trim().is_empty() {
            return Err(IngestError::invalid("message body must not be empty"));
        }
        let len = body.chars().count();
        if len > self.max_body_len {
            return Err(IngestError::invalid(format!(
                "message body is {len} characters, limit is {}",
                self.max_body_len
            )));
        }
        Ok(())
    }

    /// Stored messages addressed to a room, oldest first.
    pub async fn history(&self, room: &RoomKey) -> Result<Vec<MessageRecord>, IngestError> {
        Ok(self.store.list_messages(room).await?)
    }

    /// Stored messages between two users, oldest first.
    pub async fn conversation(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Vec<MessageRecord>, IngestError> {
        Ok(self.store.list_conversation(a, b).await?)
    }
}
