//! Inbox service: gate, cache and retrieval behind one call.

use std::sync::Arc;

use tracing::info;

use crate::cache::ResultCache;
use crate::error::CheckError;
use crate::gate::AccessGate;
use crate::pipeline::{ResultMessage, RetrievalPipeline};

/// Messages returned for one check.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub emails: Vec<ResultMessage>,
    /// Served from cache rather than the mailbox.
    pub cached: bool,
}

pub struct InboxService {
    gate: AccessGate,
    pipeline: Arc<RetrievalPipeline>,
    cache: Arc<dyn ResultCache>,
}

impl InboxService {
    pub fn new(
        gate: AccessGate,
        pipeline: Arc<RetrievalPipeline>,
        cache: Arc<dyn ResultCache>,
    ) -> Self {
        Self {
            gate,
            pipeline,
            cache,
        }
    }

    pub async fn check(
        &self,
        email: &str,
        password: &str,
        polling: bool,
    ) -> Result<CheckOutcome, CheckError> {
        let grant = self.gate.authorize(email, password).await?;

        if let Some(entry) = self.cache.get(&grant.alias, polling).await {
            info!(alias = %grant.alias, count = entry.messages.len(), "Serving cached messages");
            return Ok(CheckOutcome {
                emails: entry.messages,
                cached: true,
            });
        }

        let emails = self.pipeline.retrieve(&grant.alias, &grant.account).await?;
        self.cache.put(&grant.alias, emails.clone()).await;

        info!(
            alias = %grant.alias,
            mailbox = %grant.account.id,
            count = emails.len(),
            polling,
            "Returned messages"
        );
        Ok(CheckOutcome {
            emails,
            cached: false,
        })
    }
}
