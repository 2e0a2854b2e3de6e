//! Connection and room identifiers.
//!
//! A room is a per-user delivery channel keyed `user_<id>`. Rooms are never
//! stored; they exist only as grouping keys inside the registry.

use crate::error::RegistryError;
use alumnet_core::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Prefix of every per-user room key.
const USER_ROOM_PREFIX: &str = "user_";

/// Opaque identifier of one live network session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Wraps an externally supplied id, rejecting empty values.
    pub fn new(id: impl Into<String>) -> Result<Self, RegistryError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(RegistryError::InvalidConnectionId {
                reason: "connection id must not be empty".to_string(),
            });
        }
        Ok(Self(id))
    }

    /// Generates a fresh `conn_<ULID>` id for a newly accepted socket.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("conn_{}", Ulid::new()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key of a logical delivery channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomKey(String);

impl RoomKey {
    /// The room a user's incoming messages are pushed to.
    #[must_use]
    pub fn for_user(user_id: UserId) -> Self {
        Self(format!("{USER_ROOM_PREFIX}{user_id}"))
    }

    /// Parses an opaque room key, rejecting empty values.
    pub fn parse(key: impl Into<String>) -> Result<Self, RegistryError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(RegistryError::InvalidRoomKey {
                reason: "room key must not be empty".to_string(),
            });
        }
        Ok(Self(key))
    }

    /// Returns the user this room belongs to, if it is a per-user room.
    #[must_use]
    pub fn user(&self) -> Option<UserId> {
        self.0.strip_prefix(USER_ROOM_PREFIX)?.parse().ok()
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RoomKey {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<RoomKey> for String {
    fn from(key: RoomKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64) -> UserId {
        UserId::new(id).expect("valid user id")
    }

    #[test]
    fn room_for_user_uses_user_prefix() {
        assert_eq!(RoomKey::for_user(user(2)).as_str(), "user_2");
    }

    #[test]
    fn room_user_roundtrip() {
        let room = RoomKey::for_user(user(31));
        assert_eq!(room.user(), Some(user(31)));
    }

    #[test]
    fn opaque_room_has_no_user() {
        let room = RoomKey::parse("lobby").expect("valid");
        assert_eq!(room.user(), None);
        assert_eq!(RoomKey::parse("user_abc").expect("valid").user(), None);
    }

    #[test]
    fn empty_keys_are_rejected() {
        assert!(RoomKey::parse("").is_err());
        assert!(RoomKey::parse("   ").is_err());
        assert!(ConnectionId::new("").is_err());
    }

    #[test]
    fn generated_connection_ids_are_distinct() {
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("conn_"));
    }
}
