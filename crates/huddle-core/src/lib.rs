//! Channel messaging core: access control, channel directory, message store,
//! inline command resolution, and reaction aggregation.
//!
//! Everything here talks to [`huddle_db::Database`] synchronously. Callers on
//! an async runtime run these methods under `spawn_blocking`; the one async
//! entry point, [`store::MessageStore::send`], does that itself because it
//! also waits on external lookups.

pub mod access;
pub mod commands;
pub mod config;
pub mod directory;
pub mod error;
pub mod lookup;
pub mod reactions;
pub mod sanitize;
pub mod store;

#[cfg(test)]
mod testing;

pub use access::{AccessPolicy, ChannelAccess, Evaluator, Principal};
pub use config::ChatConfig;
pub use directory::ChannelDirectory;
pub use error::{ChatError, ChatResult};
pub use reactions::ReactionAggregator;
pub use store::MessageStore;

use huddle_types::events::ChannelEvent;

/// Where committed changes are announced. The gateway dispatcher implements
/// this; publishing must never block the caller.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: ChannelEvent);
}

/// Sink that drops every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: ChannelEvent) {}
}
