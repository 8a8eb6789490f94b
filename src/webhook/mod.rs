//! HTTP receiver for payment processor callbacks.
//!
//! The body is authenticated on its raw bytes before it is parsed, then
//! translated into a [`WebhookUpdate`] for the lifecycle controller.
//! Repeated deliveries are answered with `200 OK`; the controller decides
//! whether anything changes.

mod auth;
mod error;

pub use auth::{SIGNATURE_HEADER, sign, verify};
pub use error::WebhookError;

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::lifecycle::{Controller, WebhookOutcome, WebhookUpdate};
use crate::processor::{decimal_from_json, id_from_json};

/// Shared state of the webhook router.
#[derive(Clone)]
pub struct WebhookState {
    controller: Arc<Controller>,
    secret: Arc<Vec<u8>>,
}

impl WebhookState {
    /// An empty secret disables signature checks.
    pub fn new(controller: Arc<Controller>, secret: &str) -> Self {
        if secret.is_empty() {
            warn!("Webhook secret is empty, signatures are not verified");
        }
        Self {
            controller,
            secret: Arc::new(secret.as_bytes().to_vec()),
        }
    }
}

/// Builds the router: callbacks on `path`, liveness on `/health`.
pub fn router(state: WebhookState, path: &str) -> Router {
    Router::new()
        .route(path, post(receive))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn receive(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, WebhookError> {
    if !state.secret.is_empty() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(WebhookError::Unauthorized)?;

        if !verify(&state.secret, &body, signature) {
            warn!("Webhook signature mismatch");
            return Err(WebhookError::Unauthorized);
        }
    }

    let update = parse_update(&body)?;

    match state.controller.webhook_update(&update).await {
        Ok(WebhookOutcome::Applied(status)) => {
            info!(personal_id = %update.personal_id, status = %status, "Webhook applied");
            Ok("OK")
        }
        Ok(WebhookOutcome::Ignored(status)) => {
            info!(personal_id = %update.personal_id, status = %status, "Webhook ignored");
            Ok("OK")
        }
        Err(e) => {
            let err = WebhookError::from(e);
            match err {
                WebhookError::Internal(ref message) => {
                    error!(personal_id = %update.personal_id, error = %message, "Webhook failed")
                }
                ref other => {
                    warn!(personal_id = %update.personal_id, error = %other, "Webhook rejected")
                }
            }
            Err(err)
        }
    }
}

/// Reads `{personal_id, id, status, received_amount | received_sum}`.
fn parse_update(body: &[u8]) -> Result<WebhookUpdate, WebhookError> {
    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| WebhookError::BadRequest(format!("invalid JSON: {}", e)))?;

    if !payload.is_object() {
        return Err(WebhookError::BadRequest("body must be an object".to_string()));
    }

    let personal_id = id_from_json(&payload["personal_id"])
        .ok_or_else(|| WebhookError::BadRequest("personal_id is required".to_string()))?;

    let status = payload["status"]
        .as_str()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| WebhookError::BadRequest("status is required".to_string()))?;

    let received_amount = decimal_from_json(&payload["received_amount"])
        .or_else(|| decimal_from_json(&payload["received_sum"]));

    Ok(WebhookUpdate {
        personal_id,
        processor_id: id_from_json(&payload["id"]),
        status,
        received_amount,
    })
}
