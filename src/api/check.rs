//! Public endpoints: message check and prefix availability.

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::AppState;
use crate::error::CheckError;
use crate::pipeline::ResultMessage;

#[derive(Debug, Default, Deserialize)]
pub struct CheckRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckQuery {
    #[serde(default)]
    pub polling: Option<String>,
}

impl CheckQuery {
    fn is_polling(&self) -> bool {
        self.polling.as_deref() == Some("true")
    }
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub emails: Vec<ResultMessage>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cached: bool,
}

pub async fn check_emails(
    State(state): State<AppState>,
    Query(query): Query<CheckQuery>,
    body: Result<Json<CheckRequest>, JsonRejection>,
) -> Result<Json<CheckResponse>, CheckError> {
    // An unreadable body is treated as an empty one so the gate answers it.
    let body = match body {
        Ok(Json(body)) => body,
        Err(e) => {
            debug!(error = %e, "Unreadable check request body");
            CheckRequest::default()
        }
    };

    let outcome = state
        .inbox
        .check(&body.email, &body.password, query.is_polling())
        .await?;

    Ok(Json(CheckResponse {
        emails: outcome.emails,
        cached: outcome.cached,
    }))
}

pub async fn probe_prefix(
    State(state): State<AppState>,
    Path(prefix): Path<String>,
) -> impl IntoResponse {
    Json(state.store.probe(&prefix).await)
}
