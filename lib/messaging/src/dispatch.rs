//! Best-effort fan-out of persisted messages to live connections.
//!
//! A push is fire-and-forget per connection: every member of the room gets
//! at most one attempt per call, attempts run concurrently, and each one is
//! bounded by a send timeout. Nothing is retried here; clients that missed a
//! push read the message back from history.

use crate::message::MessageRecord;
use crate::registry::{ConnectionRegistry, Subscriber};
use crate::room::{ConnectionId, RoomKey};
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Why a single transmission did not land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitFailure {
    /// The connection's writer has gone away.
    Closed,
    /// The outbox stayed full for longer than the send timeout.
    TimedOut,
}

impl fmt::Display for TransmitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "connection closed"),
            Self::TimedOut => write!(f, "send timed out"),
        }
    }
}

/// A connection that did not receive a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    /// The connection that missed the push.
    pub connection_id: ConnectionId,
    /// What went wrong.
    pub reason: TransmitFailure,
}

/// Result of pushing one message to one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    /// The room that was targeted.
    pub room: RoomKey,
    /// How many live members were attempted.
    pub attempted: usize,
    /// How many transmissions succeeded.
    pub delivered: usize,
    /// Per-connection failures.
    pub failures: Vec<DeliveryFailure>,
}

impl DeliveryOutcome {
    fn empty(room: RoomKey) -> Self {
        Self {
            room,
            attempted: 0,
            delivered: 0,
            failures: Vec::new(),
        }
    }

    /// True when nobody was subscribed, so the message waits in history.
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        self.attempted == 0
    }

    /// True when some but not all members received the push.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.delivered > 0 && self.delivered < self.attempted
    }
}

/// Pushes messages to the members of a room.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    send_timeout: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher reading memberships from `registry`.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, send_timeout: Duration) -> Self {
        Self {
            registry,
            send_timeout,
        }
    }

    /// Pushes `record` to every connection currently joined to `room`.
    ///
    /// Never fails: closed or stalled connections are counted in the
    /// outcome and logged. Every member receives the same `Arc`.
    #[instrument(skip(self, record), fields(room = %room, message_id = %record.id))]
    pub async fn push(&self, room: &RoomKey, record: Arc<MessageRecord>) -> DeliveryOutcome {
        let subscribers = self.registry.subscribers(room);
        if subscribers.is_empty() {
            debug!("no live subscribers, message left for history");
            return DeliveryOutcome::empty(room.clone());
        }

        let attempted = subscribers.len();
        let send_timeout = self.send_timeout;
        let attempts = subscribers.into_iter().map(|subscriber| {
            let record = Arc::clone(&record);
            async move {
                let result = transmit(&subscriber, record, send_timeout).await;
                (subscriber.connection_id, result)
            }
        });

        let mut outcome = DeliveryOutcome::empty(room.clone());
        outcome.attempted = attempted;
        for (connection_id, result) in join_all(attempts).await {
            match result {
                Ok(()) => outcome.delivered += 1,
                Err(reason) => {
                    warn!(%connection_id, %reason, "push not delivered");
                    outcome.failures.push(DeliveryFailure {
                        connection_id,
                        reason,
                    });
                }
            }
        }

        debug!(
            attempted = outcome.attempted,
            delivered = outcome.delivered,
            "push complete"
        );
        outcome
    }
}

async fn transmit(
    subscriber: &Subscriber,
    record: Arc<MessageRecord>,
    send_timeout: Duration,
) -> Result<(), TransmitFailure> {
    match tokio::time::timeout(send_timeout, subscriber.outbox.send(record)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(TransmitFailure::Closed),
        Err(_) => Err(TransmitFailure::TimedOut),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alumnet_core::UserId;
    use tokio::sync::mpsc;

    const TIMEOUT: Duration = Duration::from_millis(50);

    fn user(id: i64) -> UserId {
        UserId::new(id).expect("valid user id")
    }

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::new(id).expect("valid connection id")
    }

    fn joined(
        registry: &ConnectionRegistry,
        id: &str,
        room: &RoomKey,
        capacity: usize,
    ) -> mpsc::Receiver<Arc<MessageRecord>> {
        let (tx, rx) = mpsc::channel(capacity);
        registry.connect(conn(id), tx);
        registry.join(&conn(id), room).expect("join");
        rx
    }

    fn record_for(recipient: i64) -> Arc<MessageRecord> {
        Arc::new(MessageRecord::assign(user(1), user(recipient), "hello"))
    }

    #[tokio::test]
    async fn push_reaches_every_member() {
        let registry = Arc::new(ConnectionRegistry::new());
        let room = RoomKey::for_user(user(2));
        let mut rx1 = joined(&registry, "c1", &room, 4);
        let mut rx2 = joined(&registry, "c2", &room, 4);
        let dispatcher = Dispatcher::new(Arc::clone(&registry), TIMEOUT);

        let record = record_for(2);
        let outcome = dispatcher.push(&room, Arc::clone(&record)).await;

        assert_eq!(outcome.attempted, 2);
        assert_eq!(outcome.delivered, 2);
        let got1 = rx1.try_recv().expect("c1 receives");
        let got2 = rx2.try_recv().expect("c2 receives");
        assert!(Arc::ptr_eq(&got1, &record));
        assert!(Arc::ptr_eq(&got2, &record));
    }

    #[tokio::test]
    async fn push_skips_other_rooms() {
        let registry = Arc::new(ConnectionRegistry::new());
        let target = RoomKey::for_user(user(2));
        let other = RoomKey::for_user(user(3));
        let mut rx_target = joined(&registry, "c1", &target, 4);
        let mut rx_other = joined(&registry, "c2", &other, 4);
        let dispatcher = Dispatcher::new(Arc::clone(&registry), TIMEOUT);

        let outcome = dispatcher.push(&target, record_for(2)).await;

        assert_eq!(outcome.delivered, 1);
        assert!(rx_target.try_recv().is_ok());
        assert!(rx_other.try_recv().is_err());
    }

    #[tokio::test]
    async fn push_to_empty_room_is_deferred() {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Dispatcher::new(registry, TIMEOUT);

        let outcome = dispatcher.push(&RoomKey::for_user(user(2)), record_for(2)).await;

        assert!(outcome.is_deferred());
        assert_eq!(outcome.delivered, 0);
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn push_after_leave_does_not_reach_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let room = RoomKey::for_user(user(2));
        let mut rx = joined(&registry, "c1", &room, 4);
        registry.leave(&conn("c1"));
        let dispatcher = Dispatcher::new(Arc::clone(&registry), TIMEOUT);

        let outcome = dispatcher.push(&room, record_for(2)).await;

        assert_eq!(outcome.attempted, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_connection_does_not_block_others() {
        let registry = Arc::new(ConnectionRegistry::new());
        let room = RoomKey::for_user(user(2));
        let closed = joined(&registry, "gone", &room, 4);
        drop(closed);
        let mut rx = joined(&registry, "alive", &room, 4);
        let dispatcher = Dispatcher::new(Arc::clone(&registry), TIMEOUT);

        let outcome = dispatcher.push(&room, record_for(2)).await;

        assert_eq!(outcome.attempted, 2);
        assert_eq!(outcome.delivered, 1);
        assert!(outcome.is_partial());
        assert_eq!(
            outcome.failures,
            vec![DeliveryFailure {
                connection_id: conn("gone"),
                reason: TransmitFailure::Closed,
            }]
        );
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn stalled_connection_is_abandoned_after_timeout() {
        let registry = Arc::new(ConnectionRegistry::new());
        let room = RoomKey::for_user(user(2));
        // Capacity 1 and never drained: the second push stalls.
        let _stalled = joined(&registry, "slow", &room, 1);
        let mut fast = joined(&registry, "fast", &room, 8);
        let dispatcher = Dispatcher::new(Arc::clone(&registry), TIMEOUT);

        let first = dispatcher.push(&room, record_for(2)).await;
        assert_eq!(first.delivered, 2);

        let started = tokio::time::Instant::now();
        let second = dispatcher.push(&room, record_for(2)).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(second.delivered, 1);
        assert_eq!(second.failures[0].reason, TransmitFailure::TimedOut);
        assert_eq!(second.failures[0].connection_id, conn("slow"));
        assert!(fast.try_recv().is_ok());
        assert!(fast.try_recv().is_ok());
    }
}
