//! Alias Inbox: read-only, per-alias views over shared catch-all mailboxes.

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod gate;
pub mod inbox;
pub mod mailbox;
pub mod pipeline;
pub mod store;
