//! Persistence layer: the JSON allowlist document.

pub mod allowlist;

pub use allowlist::{
    AliasMatch, AliasRecord, AllowlistStore, FailedRecord, ImportRecord, ImportReport,
    PrefixProbe,
};
