//! Database access for the alumnet server.
//!
//! This module provides the PostgreSQL-backed
//! [`MessageStore`](alumnet_messaging::MessageStore).

pub mod messages;

pub use messages::PgMessageStore;
