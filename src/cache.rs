//! Result cache: recent retrieval results per alias.
//!
//! Entries only serve polling calls; an interactive check always re-queries
//! the mailbox and refreshes the entry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::pipeline::ResultMessage;

/// A cached retrieval result.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub alias_email: String,
    pub timestamp: DateTime<Utc>,
    pub messages: Vec<ResultMessage>,
}

#[async_trait]
pub trait ResultCache: Send + Sync {
    /// The entry for `alias`, if present, unexpired and `polling` is set.
    async fn get(&self, alias: &str, polling: bool) -> Option<CacheEntry>;

    /// Store `messages` for `alias`, replacing any previous entry.
    async fn put(&self, alias: &str, messages: Vec<ResultMessage>);
}

/// In-process cache with a fixed time-to-live.
pub struct MemoryCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(entry.timestamp);
        match age.to_std() {
            Ok(age) => age < self.ttl,
            // Timestamp in the future (clock step); treat as fresh.
            Err(_) => true,
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| self.is_fresh(entry, now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "Swept expired cache entries");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn get(&self, alias: &str, polling: bool) -> Option<CacheEntry> {
        if !polling {
            return None;
        }
        let entries = self.entries.read().await;
        let entry = entries.get(&alias.to_lowercase())?;
        self.is_fresh(entry, Utc::now()).then(|| entry.clone())
    }

    async fn put(&self, alias: &str, messages: Vec<ResultMessage>) {
        let key = alias.to_lowercase();
        let entry = CacheEntry {
            alias_email: key.clone(),
            timestamp: Utc::now(),
            messages,
        };
        self.entries.write().await.insert(key, entry);
    }
}

/// Spawn a background task that sweeps expired entries every `period`.
pub fn spawn_sweep_task(cache: Arc<MemoryCache>, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            cache.sweep_expired().await;
        }
    })
}
