//! Delivery Coordinator: server-side fan-out and stream sessions, plus the
//! client-side sync state machine that falls back to polling.

pub mod connection;
pub mod dispatcher;
pub mod sync;
