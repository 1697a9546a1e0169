//! Message retrieval pipeline.
//!
//! Every message in the mailbox flows through:
//! 1. `normalize()`: raw header/body blocks to a parsed message
//! 2. `RecipientMatcher`: is it addressed to the alias?
//! 3. `extract()`: matched message to the displayable result
//!
//! `RetrievalPipeline` drives these stages over one mailbox session.

pub mod extractor;
pub mod matcher;
pub mod normalizer;
pub mod retrieval;
pub mod sanitize;
pub mod types;

pub use matcher::RecipientMatcher;
pub use retrieval::RetrievalPipeline;
pub use types::{MessageSummary, ResultMessage};
