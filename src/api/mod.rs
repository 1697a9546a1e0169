//! HTTP surface: the public check endpoint plus the admin routes.

pub mod admin;
pub mod check;

use std::sync::Arc;

use axum::{
    Json, Router,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;

use crate::config::AppConfig;
use crate::inbox::InboxService;
use crate::pipeline::RetrievalPipeline;
use crate::store::AllowlistStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<AllowlistStore>,
    pub inbox: Arc<InboxService>,
    /// Used directly by the mailbox diagnostics endpoint.
    pub pipeline: Arc<RetrievalPipeline>,
}

/// Build the Axum router with every public and admin route.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/check-emails", post(check::check_emails))
        .route("/api/prefixes/{prefix}/check", get(check::probe_prefix))
        .route(
            "/api/admin/prefixes",
            get(admin::list_prefixes).post(admin::add_prefix),
        )
        .route("/api/admin/prefixes/{key}", delete(admin::remove_prefix))
        .route("/api/admin/prefixes/{key}/status", put(admin::set_status))
        .route("/api/admin/batch-prefixes", post(admin::import_prefixes))
        .route("/api/mailboxes", get(admin::list_mailboxes))
        .route("/api/test-all-emails", get(admin::all_emails))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "alias-inbox"
    }))
}
