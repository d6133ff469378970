use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use serde_json::json;
use tracing::warn;

use replies_core::types::Channel;

use crate::app::AppState;

const SIGNATURE_HEADER: &str = "x-provider-signature";

/// `POST /{channel}` — the only inbound entry point for every provider.
///
/// Always acknowledges with an empty `200 OK`, whatever `IngestCoordinator`
/// made of the request; providers retry on anything else, and retries of an
/// already-staged fragment just re-stage it (staging is an upsert).
pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
    headers: HeaderMap,
    uri: Uri,
    body: String,
) -> StatusCode {
    let Some(channel) = Channel::from_path_segment(&channel) else {
        warn!(%channel, "webhook posted to unknown channel path");
        return StatusCode::OK;
    };

    let url = request_url(&headers, &uri);
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    if let Err(e) = state.ingest.ingest(channel, &url, &body, signature) {
        warn!(%channel, error = %e, code = e.code(), "webhook ingest failed");
    }

    StatusCode::OK
}

/// Reconstruct the URL the provider signed over from the `Host` header and
/// request path, since Axum only hands handlers the path.
fn request_url(headers: &HeaderMap, uri: &Uri) -> String {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("ingest.invalid");
    format!("https://{host}{uri}")
}

/// `GET /healthz` — store and queue connectivity, not liveness alone.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> axum::Json<serde_json::Value> {
    let queue_names = [
        state.config.queues.whatsapp_queue.as_str(),
        state.config.queues.sms_queue.as_str(),
        state.config.queues.email_queue.as_str(),
    ];
    let dead_letters: u64 = queue_names
        .iter()
        .map(|q| state.queue.dead_letter_count(q).unwrap_or(0))
        .sum();

    let stage_ok = state.stage.query("__healthz__").is_ok();

    let status = if stage_ok { "ok" } else { "degraded" };

    axum::Json(json!({
        "status": status,
        "dead_letters": dead_letters,
    }))
}
