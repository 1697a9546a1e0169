//! Admin endpoints. Every call carries the admin key, in the body for
//! mutations and in the query string for reads.

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::AppState;
use crate::config::AppConfig;
use crate::error::AdminError;
use crate::store::ImportRecord;

type AdminResult = Result<Json<Value>, AdminError>;

/// Admin bodies must be JSON; anything else is a 400 in the usual error shape.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AdminError> {
    body.map(|Json(body)| body).map_err(|e| {
        debug!(error = %e, "Rejected admin request body");
        AdminError::Invalid("request body must be JSON".into())
    })
}

fn verify_admin(config: &AppConfig, provided: Option<&str>) -> Result<(), AdminError> {
    match (&config.admin_key, provided) {
        (Some(expected), Some(given)) if expected.expose_secret() == given => Ok(()),
        _ => {
            warn!("Rejected admin request with invalid key");
            Err(AdminError::InvalidKey)
        }
    }
}

fn domain_list(config: &AppConfig) -> String {
    config.allowed_domains.join(", ")
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyQuery {
    #[serde(default)]
    pub admin_key: Option<String>,
    #[serde(default)]
    pub mailbox: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPrefixRequest {
    #[serde(default)]
    pub admin_key: Option<String>,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub domain: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyBody {
    #[serde(default)]
    pub admin_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    #[serde(default)]
    pub admin_key: Option<String>,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    #[serde(default)]
    pub admin_key: Option<String>,
    #[serde(default)]
    pub records: Vec<ImportRecord>,
}

#[derive(Debug, Serialize)]
struct MailboxInfo<'a> {
    id: &'a str,
    user: &'a str,
    domain: &'a str,
    host: &'a str,
}

// ── Allowlist ───────────────────────────────────────────────────────────

pub async fn add_prefix(
    State(state): State<AppState>,
    body: Result<Json<AddPrefixRequest>, JsonRejection>,
) -> AdminResult {
    let body = json_body(body)?;
    verify_admin(&state.config, body.admin_key.as_deref())?;

    if body.prefix.trim().is_empty() || body.password.is_empty() {
        return Err(AdminError::Invalid(
            "prefix and password are required".into(),
        ));
    }

    let domain = body.domain.as_deref().map(str::trim).filter(|d| !d.is_empty());
    if let Some(domain) = domain {
        if !state.config.is_domain_allowed(domain) {
            return Err(AdminError::Invalid(format!(
                "domain must be one of: {}",
                domain_list(&state.config)
            )));
        }
    }

    let key = state.store.upsert(&body.prefix, &body.password, domain).await?;
    let kind = if domain.is_some() { "email" } else { "prefix" };
    Ok(Json(json!({
        "success": true,
        "message": format!("{kind} {key} added"),
    })))
}

pub async fn remove_prefix(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Result<Json<KeyBody>, JsonRejection>,
) -> AdminResult {
    let body = json_body(body)?;
    verify_admin(&state.config, body.admin_key.as_deref())?;

    state.store.remove(&key).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("prefix or email {key} removed"),
    })))
}

pub async fn set_status(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Result<Json<StatusRequest>, JsonRejection>,
) -> AdminResult {
    let body = json_body(body)?;
    verify_admin(&state.config, body.admin_key.as_deref())?;

    state.store.set_active(&key, body.active).await?;
    let verb = if body.active { "enabled" } else { "disabled" };
    Ok(Json(json!({
        "success": true,
        "message": format!("prefix or email {key} {verb}"),
    })))
}

pub async fn list_prefixes(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
) -> AdminResult {
    verify_admin(&state.config, query.admin_key.as_deref())?;

    let prefixes = state.store.list().await;
    Ok(Json(json!({ "prefixes": prefixes })))
}

pub async fn import_prefixes(
    State(state): State<AppState>,
    body: Result<Json<ImportRequest>, JsonRejection>,
) -> AdminResult {
    let body = json_body(body)?;
    verify_admin(&state.config, body.admin_key.as_deref())?;

    if body.records.is_empty() {
        return Err(AdminError::Invalid("no valid records provided".into()));
    }

    let report = state
        .store
        .import(&body.records, &state.config.allowed_domains)
        .await?;

    let mut response = json!({
        "success": true,
        "message": format!(
            "processed {} records, {} failed",
            report.success_count,
            report.failed.len()
        ),
        "successCount": report.success_count,
        "failedCount": report.failed.len(),
    });
    if !report.failed.is_empty() {
        response["failedRecords"] = json!(report.failed);
    }
    Ok(Json(response))
}

// ── Mailbox diagnostics ─────────────────────────────────────────────────

pub async fn list_mailboxes(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
) -> AdminResult {
    verify_admin(&state.config, query.admin_key.as_deref())?;

    let mailboxes: Vec<MailboxInfo<'_>> = state
        .config
        .accounts
        .iter()
        .map(|a| MailboxInfo {
            id: &a.id,
            user: &a.user,
            domain: &a.domain,
            host: &a.host,
        })
        .collect();
    Ok(Json(json!({ "mailboxes": mailboxes })))
}

pub async fn all_emails(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
) -> AdminResult {
    verify_admin(&state.config, query.admin_key.as_deref())?;

    let id = query.mailbox.as_deref().unwrap_or("primary");
    let account = state
        .config
        .account_by_id(id)
        .ok_or_else(|| AdminError::Invalid("no mailbox is configured".into()))?;

    let emails = state.pipeline.list_all(account).await?;
    info!(mailbox = %account.id, total = emails.len(), "Listed all messages");

    Ok(Json(json!({
        "emails": emails,
        "total": emails.len(),
        "mailboxInfo": {
            "id": account.id,
            "domain": account.domain,
            "user": account.user,
        },
    })))
}
