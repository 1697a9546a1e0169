//! Mailbox access: read-only sessions over an upstream mailbox.
//!
//! A session lists every message in the inbox and hands back each message as
//! a raw header block plus a raw body block. Parsing happens elsewhere.

pub mod imap;

use async_trait::async_trait;

use crate::config::MailAccount;
use crate::error::MailboxError;

pub use imap::ImapMailbox;

/// One fetched message, still undecoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Sequence number inside the mailbox.
    pub seq: u32,
    /// Header block, including the terminating blank line when present.
    pub header: String,
    /// Body block (everything after the header).
    pub body: String,
}

/// Opens sessions against configured mail accounts.
#[async_trait]
pub trait MailboxAccess: Send + Sync {
    /// Open a read-only session on the account's inbox.
    async fn open(&self, account: &MailAccount) -> Result<Box<dyn MailboxSession>, MailboxError>;
}

/// An open read-only inbox session. One session serves one retrieval call.
#[async_trait]
pub trait MailboxSession: Send {
    /// Sequence numbers of every message in the inbox.
    async fn list_ids(&mut self) -> Result<Vec<u32>, MailboxError>;

    /// Fetch one message's header and body blocks.
    async fn fetch(&mut self, seq: u32) -> Result<RawMessage, MailboxError>;

    /// End the session. Errors are logged, never returned.
    async fn close(self: Box<Self>);
}
