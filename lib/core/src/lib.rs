//! Core domain types and utilities for the alumnet platform.
//!
//! This crate provides the identifier types and the error-handling
//! foundation shared by the messaging core and the server.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{MessageId, ParseIdError, UserId};
