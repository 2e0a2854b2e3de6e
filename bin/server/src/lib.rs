//! alumnet messaging server.
//!
//! This crate exposes the messaging core over HTTP and WebSocket:
//! message submission and history endpoints, a `/ws` socket for live
//! delivery, and a PostgreSQL-backed message store.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod ws;
