//! Real-time messaging core for the alumnet platform.
//!
//! This crate provides:
//!
//! - **Connection Registry**: live connections and their room memberships
//! - **Delivery Dispatcher**: best-effort, time-bounded fan-out to a room
//! - **Message Ingest**: persist-then-push with per-room ordering
//! - **Persistence Gateway**: the `MessageStore` contract and an in-memory store
//!
//! Stored is the source of truth; delivered is a side effect. A message is
//! only ever pushed after it has been persisted, and missing a push never
//! loses a message because history can always be read back.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod message;
pub mod registry;
pub mod room;
pub mod store;

pub use config::MessagingConfig;
pub use dispatch::{DeliveryFailure, DeliveryOutcome, Dispatcher, TransmitFailure};
pub use error::{ErrorKind, IngestError, RegistryError, StoreError};
pub use ingest::{MessageIngest, Submission};
pub use message::MessageRecord;
pub use registry::{ConnectionRegistry, Outbox, Subscriber};
pub use room::{ConnectionId, RoomKey};
pub use store::{InMemoryMessageStore, MessageStore};
