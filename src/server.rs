//! HTTP surface (spec §6.1): `/v1/messages`, `/v1/messages/count_tokens`,
//! `/v1/debug/echo`, `/health`.
//!
//! Grounded on the teacher's `api/client.rs` for the thin-handler style
//! (translate HTTP concerns, delegate everything else) and `router.rs` for
//! the overall router-assembly shape; `api/health.rs` for the liveness
//! probe.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::error::ProxyError;
use crate::models::AnthropicRequest;
use crate::state::AppState;
use crate::{stream, translate};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/messages", post(messages))
        .route("/v1/messages/count_tokens", post(count_tokens))
        .route("/v1/debug/echo", post(debug_echo))
        .route("/health", get(health))
        .fallback(not_found)
        .with_state(state)
}

/// `POST /v1/messages` (spec §6.1/§4).
async fn messages(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Response, ProxyError> {
    let _seq = state.next_request_seq();
    let req: AnthropicRequest =
        serde_json::from_value(body.clone()).map_err(|e| ProxyError::translation(e.to_string()))?;

    if state.config.api_key.is_empty() {
        return Err(ProxyError::config(format!(
            "No API key found for provider {}",
            state.config.provider_label
        )));
    }

    if req.messages.is_empty() {
        return Err(ProxyError::translation("`messages` must not be empty"));
    }

    if state.config.endpoint_kind == crate::config::EndpointKind::Anthropic {
        return dispatch_anthropic_native(&state, &req, body).await;
    }

    let translated = translate::request::to_openai(&req, &state.config)?;
    let model = translated["model"].as_str().unwrap_or_default().to_string();

    if req.is_streaming() {
        let upstream_bytes = state.upstream.send_stream(&translated).await?;
        let tools_present = req.tools.as_ref().is_some_and(|t| !t.is_empty());
        let sse = stream::coordinate_openai(upstream_bytes, model, tools_present);
        Ok(sse_response(sse))
    } else {
        let upstream_body = state.upstream.send(&translated).await?;
        let anthropic_message = translate::response::to_anthropic_message(&upstream_body)?;
        Ok((StatusCode::OK, Json(anthropic_message)).into_response())
    }
}

/// Anthropic-native upstreams are forwarded with only auth headers rewritten
/// (spec §4.1/§4.3 "identity pass", §4.4 "passthrough"). `body` is the raw
/// inbound JSON — forwarded as-is (not re-serialized from the typed
/// [`AnthropicRequest`]) so fields the typed model doesn't know about still
/// cross byte-equivalent, per spec §8's round-trip law.
async fn dispatch_anthropic_native(
    state: &AppState,
    req: &AnthropicRequest,
    body: Value,
) -> Result<Response, ProxyError> {
    if req.is_streaming() {
        let upstream_bytes = state.upstream.send_stream(&body).await?;
        let sse = stream::passthrough_anthropic(upstream_bytes);
        Ok(sse_response(sse))
    } else {
        let upstream_body = state.upstream.send(&body).await?;
        Ok((StatusCode::OK, Json(upstream_body)).into_response())
    }
}

fn sse_response(sse: stream::SseByteStream) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(sse))
        .expect("static SSE response headers are always valid")
}

/// `POST /v1/messages/count_tokens` (spec §4.5).
async fn count_tokens(Json(body): Json<Value>) -> Result<Json<Value>, ProxyError> {
    let req: AnthropicRequest =
        serde_json::from_value(body).map_err(|e| ProxyError::translation(e.to_string()))?;
    let input_tokens = translate::tokens::count_input_tokens(&req);
    Ok(Json(json!({ "input_tokens": input_tokens })))
}

/// `POST /v1/debug/echo` (spec §4.7). Never contacts an upstream.
async fn debug_echo(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ProxyError> {
    let req: AnthropicRequest =
        serde_json::from_value(body).map_err(|e| ProxyError::translation(e.to_string()))?;

    let translated_payload = if state.config.endpoint_kind == crate::config::EndpointKind::Anthropic {
        serde_json::to_value(&req).map_err(|e| ProxyError::translation(e.to_string()))?
    } else {
        translate::request::to_openai(&req, &state.config)?
    };

    Ok(Json(json!({
        "provider": state.config.provider_label,
        "baseURL": state.config.base_url,
        "endpointKind": state.config.endpoint_kind.as_str(),
        "authHeaderName": state.config.endpoint_kind.auth_header_name(),
        "modelChosen": translated_payload.get("model").cloned().unwrap_or(Value::Null),
        "hasKey": !state.config.api_key.is_empty(),
        "translatedPayload": translated_payload,
    })))
}

/// `GET /health` (spec §6.1).
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "provider": state.config.provider_label,
        "endpointKind": state.config.endpoint_kind.as_str(),
    }))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })))
}
