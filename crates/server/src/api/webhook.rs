use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;

use msgbridge_core::MediaAttachment;
use msgbridge_gateway::{GatewayError, IngressOutcome, InboundWebhookForm};

use crate::error::ApiError;
use crate::state::AppState;

/// `POST /webhook` -- accept an inbound message from the messaging
/// transport, verifying its signature, deduplicating, and enqueueing it.
pub async fn webhook(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers
        .get("x-transport-signature")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_default();

    let mut fields: Vec<(String, String)> =
        serde_urlencoded::from_bytes(&body).map_err(|e| ApiError::new("webhook", GatewayError::InvalidData(e.to_string())))?;
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    let raw_form: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

    let get = |name: &str| fields.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone()).unwrap_or_default();

    let num_media: usize = get("NumMedia").parse().unwrap_or(0);
    let media = (0..num_media)
        .filter_map(|i| {
            let url = get(&format!("MediaUrl{i}"));
            if url.is_empty() {
                return None;
            }
            let content_type = get(&format!("MediaContentType{i}"));
            Some(MediaAttachment { content_type, url })
        })
        .collect();

    let form = InboundWebhookForm { body: get("Body"), from: get("From"), to: get("To"), message_sid: get("MessageSid"), media };

    let scheme = headers.get("x-forwarded-proto").and_then(|v| v.to_str().ok()).unwrap_or("https");
    let host = headers.get("host").and_then(|v| v.to_str().ok()).unwrap_or("localhost");
    let url = format!("{scheme}://{host}/webhook");
    let client_ip = addr.ip().to_string();

    let outcome =
        state.webhook.handle(&url, &raw_form, &signature, &client_ip, form).await.map_err(|e| ApiError::new("webhook", e))?;

    let body = match outcome {
        IngressOutcome::Accepted { task_id } => serde_json::json!({ "status": "accepted", "task_id": task_id }),
        IngressOutcome::Duplicate => serde_json::json!({ "status": "success", "detail": "Duplicate message" }),
    };

    Ok((StatusCode::OK, Json(body)))
}
