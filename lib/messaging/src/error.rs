//! Error types for the messaging crate.
//!
//! - `RegistryError`: rejected registry input (bad ids, unknown connections)
//! - `StoreError`: persistence gateway failures
//! - `IngestError`: what a caller of `submit` sees
//!
//! Partial delivery is not an error; it is reported through
//! [`DeliveryOutcome`](crate::dispatch::DeliveryOutcome).

use crate::room::ConnectionId;
use serde::Serialize;
use std::fmt;

/// Machine-readable error category surfaced to API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or empty identifiers or body.
    InvalidArgument,
    /// The message store could not complete a read or write.
    PersistenceFailure,
}

impl ErrorKind {
    /// Returns the wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::PersistenceFailure => "persistence_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from connection registry operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Connection id was empty or otherwise malformed.
    InvalidConnectionId { reason: String },
    /// Room key was empty or otherwise malformed.
    InvalidRoomKey { reason: String },
    /// The connection is not registered as live.
    UnknownConnection { connection_id: ConnectionId },
}

impl RegistryError {
    /// Returns the machine-readable category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidArgument
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConnectionId { reason } => write!(f, "invalid connection id: {reason}"),
            Self::InvalidRoomKey { reason } => write!(f, "invalid room key: {reason}"),
            Self::UnknownConnection { connection_id } => {
                write!(f, "connection {connection_id} is not live")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Errors from the persistence gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached.
    Unavailable { reason: String },
    /// A write was rejected or failed midway.
    WriteFailed { reason: String },
    /// A read failed.
    ReadFailed { reason: String },
    /// A stored row could not be decoded into a record.
    CorruptRecord { reason: String },
}

impl StoreError {
    /// Returns the machine-readable category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::PersistenceFailure
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "message store unavailable: {reason}"),
            Self::WriteFailed { reason } => write!(f, "message write failed: {reason}"),
            Self::ReadFailed { reason } => write!(f, "message read failed: {reason}"),
            Self::CorruptRecord { reason } => write!(f, "corrupt message record: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors returned by the message ingest path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// The submission was rejected before touching the store.
    InvalidArgument { reason: String },
    /// The store failed; nothing was dispatched.
    Persistence(StoreError),
}

impl IngestError {
    /// Returns the machine-readable category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::Persistence(_) => ErrorKind::PersistenceFailure,
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument { reason } => write!(f, "invalid message: {reason}"),
            Self::Persistence(e) => write!(f, "message not stored: {e}"),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Persistence(e) => Some(e),
            Self::InvalidArgument { .. } => None,
        }
    }
}

impl From<StoreError> for IngestError {
    fn from(e: StoreError) -> Self {
        Self::Persistence(e)
    }
}

impl From<RegistryError> for IngestError {
    fn from(e: RegistryError) -> Self {
        Self::InvalidArgument {
            reason: e.to_string(),
        }
    }
}
