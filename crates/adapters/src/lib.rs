//! skyrelay adapters crate
//!
//! This crate contains infrastructure adapters implementing the domain ports:
//! - `bluesky`: public and authenticated author-feed sources
//! - `discord`: channel publisher and channel validator
//! - `outbox`, `console`, `router`: local publishers and visibility routing
//! - `config`: JSON-file configuration store
//! - `cipher`: AES-GCM credential cipher
//! - `state`: SQLite and in-memory poll-state stores
//! - `conversation`: line-based setup conversation

pub mod bluesky;
pub mod cipher;
mod config_store;
pub mod console;
pub mod conversation;
pub mod discord;
pub mod outbox;
pub mod router;
mod state_memory;
mod state_sqlite;

/// Re-exports for configuration stores
pub mod config {
    pub use crate::config_store::{InMemoryConfigStore, JsonFileConfigStore};
}

/// Re-exports for state adapters
pub mod state {
    pub use crate::state_memory::InMemoryStateStore;
    pub use crate::state_sqlite::SqliteStateStore;
}
