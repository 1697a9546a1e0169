//! Allowlist store: the JSON document authorizing aliases.
//!
//! The whole document is read on every call and rewritten on every mutation.
//! Writes are serialized through a process-local mutex.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::StoreError;

fn default_active() -> bool {
    true
}

/// One allowlist entry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasRecord {
    pub password: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl fmt::Debug for AliasRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AliasRecord")
            .field("password", &"[REDACTED]")
            .field("active", &self.active)
            .field("created_at", &self.created_at)
            .field("domain", &self.domain)
            .finish()
    }
}

/// On-disk document shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllowlistDocument {
    #[serde(default)]
    pub prefixes: BTreeMap<String, AliasRecord>,
}

/// Result of a gate lookup.
#[derive(Debug, Clone)]
pub struct AliasMatch {
    /// Key the record is stored under.
    pub key: String,
    pub record: AliasRecord,
}

/// Public availability view of a prefix. Never carries the password.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrefixProbe {
    pub exists: bool,
    pub active: bool,
    pub available: bool,
}

/// One record of a bulk import.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportRecord {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
}

/// A record the import refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRecord {
    pub prefix: String,
    pub reason: String,
}

/// Outcome of a bulk import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub success_count: usize,
    pub failed: Vec<FailedRecord>,
}

/// Storage key for a prefix, qualified by domain when one is given.
pub fn canonical_key(prefix: &str, domain: Option<&str>) -> String {
    match domain {
        Some(domain) => format!("{}@{}", prefix.trim(), domain.trim()).to_lowercase(),
        None => prefix.trim().to_lowercase(),
    }
}

/// JSON-file-backed allowlist.
pub struct AllowlistStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl AllowlistStore {
    /// Open the document at `path`, creating it (and its directory) if missing.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        if !tokio::fs::try_exists(&path).await? {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            write_document(&path, &AllowlistDocument::default()).await?;
            info!(path = %path.display(), "Created empty allowlist");
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document. Unreadable or malformed files load as empty.
    pub async fn load(&self) -> AllowlistDocument {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Failed to read allowlist");
                return AllowlistDocument::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(doc) => doc,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Malformed allowlist, treating as empty");
                AllowlistDocument::default()
            }
        }
    }

    async fn save(&self, doc: &AllowlistDocument) -> Result<(), StoreError> {
        write_document(&self.path, doc).await
    }

    /// Find the entry for an alias: the full email key first, then the bare
    /// local-part key.
    pub async fn lookup(&self, full: &str, local: &str) -> Option<AliasMatch> {
        let doc = self.load().await;
        let full_hit = find_entry(&doc, full);
        let local_hit = find_entry(&doc, local);

        match (full_hit, local_hit) {
            (Some((key, record)), shadowed) => {
                if let Some((bare, _)) = shadowed {
                    warn!(key = %key, shadowed = %bare, "Domain entry shadows bare prefix entry");
                }
                Some(AliasMatch {
                    key: key.clone(),
                    record: record.clone(),
                })
            }
            (None, Some((key, record))) => {
                debug!(key = %key, "Matched legacy bare prefix entry");
                Some(AliasMatch {
                    key: key.clone(),
                    record: record.clone(),
                })
            }
            (None, None) => None,
        }
    }

    /// Add or replace an entry. Returns the key it was stored under.
    pub async fn upsert(
        &self,
        prefix: &str,
        password: &str,
        domain: Option<&str>,
    ) -> Result<String, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load().await;

        let key = canonical_key(prefix, domain);
        doc.prefixes.insert(key.clone(), new_record(password, domain));
        self.save(&doc).await?;

        info!(key = %key, "Allowlist entry saved");
        Ok(key)
    }

    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load().await;

        let stored = resolve_key(&doc, key).ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        doc.prefixes.remove(&stored);
        self.save(&doc).await?;

        info!(key = %stored, "Allowlist entry removed");
        Ok(())
    }

    pub async fn set_active(&self, key: &str, active: bool) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load().await;

        let stored = resolve_key(&doc, key).ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        if let Some(record) = doc.prefixes.get_mut(&stored) {
            record.active = active;
        }
        self.save(&doc).await?;

        info!(key = %stored, active, "Allowlist entry status changed");
        Ok(())
    }

    /// Bulk upsert. Invalid records are reported, the rest saved in one write.
    pub async fn import(
        &self,
        records: &[ImportRecord],
        allowed_domains: &[String],
    ) -> Result<ImportReport, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load().await;
        let mut report = ImportReport::default();

        for record in records {
            let prefix = record.prefix.as_deref().map(str::trim).unwrap_or_default();
            let password = record.password.as_deref().unwrap_or_default();
            let domain = record
                .domain
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty());

            if prefix.is_empty() || password.is_empty() {
                report.failed.push(FailedRecord {
                    prefix: prefix.to_string(),
                    reason: "prefix and password are required".to_string(),
                });
                continue;
            }
            if let Some(domain) = domain {
                if !allowed_domains.iter().any(|d| d.eq_ignore_ascii_case(domain)) {
                    report.failed.push(FailedRecord {
                        prefix: prefix.to_string(),
                        reason: format!("domain {domain} is not in the allowed list"),
                    });
                    continue;
                }
            }

            doc.prefixes
                .insert(canonical_key(prefix, domain), new_record(password, domain));
            report.success_count += 1;
        }

        if report.success_count > 0 {
            self.save(&doc).await?;
        }

        info!(
            imported = report.success_count,
            failed = report.failed.len(),
            "Allowlist import finished"
        );
        Ok(report)
    }

    pub async fn list(&self) -> BTreeMap<String, AliasRecord> {
        self.load().await.prefixes
    }

    /// Whether a prefix is taken, without exposing its record.
    pub async fn probe(&self, prefix: &str) -> PrefixProbe {
        let doc = self.load().await;
        match find_entry(&doc, prefix) {
            Some((_, record)) => PrefixProbe {
                exists: true,
                active: record.active,
                available: false,
            },
            None => PrefixProbe {
                exists: false,
                active: false,
                available: true,
            },
        }
    }
}

fn new_record(password: &str, domain: Option<&str>) -> AliasRecord {
    AliasRecord {
        password: password.to_string(),
        active: true,
        created_at: Utc::now(),
        domain: domain.map(str::to_lowercase),
    }
}

/// Exact key first, then a case-insensitive match for documents written
/// before keys were lowercased.
fn find_entry<'a>(doc: &'a AllowlistDocument, key: &str) -> Option<(&'a String, &'a AliasRecord)> {
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    doc.prefixes
        .get_key_value(&key.to_lowercase())
        .or_else(|| doc.prefixes.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)))
}

fn resolve_key(doc: &AllowlistDocument, key: &str) -> Option<String> {
    if doc.prefixes.contains_key(key) {
        return Some(key.to_string());
    }
    find_entry(doc, key).map(|(k, _)| k.clone())
}

async fn write_document(path: &Path, doc: &AllowlistDocument) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(doc)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}
