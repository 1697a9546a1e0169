//! Access gate: decides whether an alias may be queried.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{AppConfig, MailAccount};
use crate::error::{AuthError, CheckError};
use crate::store::AllowlistStore;

/// A request that passed the gate.
#[derive(Debug, Clone)]
pub struct GateGrant {
    /// The requested email, trimmed and lowercased.
    pub alias: String,
    /// Allowlist key that authorized it.
    pub key: String,
    /// Mailbox serving the alias's domain.
    pub account: MailAccount,
}

pub struct AccessGate {
    config: Arc<AppConfig>,
    store: Arc<AllowlistStore>,
}

impl AccessGate {
    pub fn new(config: Arc<AppConfig>, store: Arc<AllowlistStore>) -> Self {
        Self { config, store }
    }

    pub async fn authorize(&self, email: &str, password: &str) -> Result<GateGrant, CheckError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(CheckError::Validation("email address is required".into()));
        }

        let parts: Vec<&str> = email.split('@').collect();
        let &[local, domain] = parts.as_slice() else {
            return Err(CheckError::Validation("invalid email format".into()));
        };

        if !self.config.is_domain_allowed(domain) {
            return Err(CheckError::Validation(format!(
                "email domain must be one of: {}",
                self.config.allowed_domains.join(", ")
            )));
        }

        let account = self
            .config
            .account_for_domain(domain)
            .ok_or_else(|| CheckError::Validation("unsupported email domain".into()))?;

        let Some(entry) = self.store.lookup(email, local).await else {
            debug!(email = %email, "No allowlist entry");
            return Err(AuthError::Unauthorized.into());
        };

        if !entry.record.active {
            warn!(key = %entry.key, "Rejected disabled alias");
            return Err(AuthError::Disabled.into());
        }
        if entry.record.password != password {
            warn!(key = %entry.key, "Rejected wrong access password");
            return Err(AuthError::Forbidden.into());
        }

        Ok(GateGrant {
            alias: email.to_lowercase(),
            key: entry.key,
            account: account.clone(),
        })
    }
}
