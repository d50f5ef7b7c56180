//! Unified error type for the proxy.
//!
//! Unlike a bare `anyhow::Error` wrapper, [`ProxyError`] carries a stable,
//! machine-readable `kind` per variant (§3/§7 of the design notes) so callers
//! — both the JSON error body and the SSE `error` event — can report a
//! consistent discriminant regardless of where in the pipeline the failure
//! happened.
//!
//! # Example
//!
//! ```rust,ignore
//! async fn handler(...) -> Result<Json<Value>, ProxyError> {
//!     let cfg = state.config.as_ref();
//!     if cfg.api_key.is_empty() {
//!         return Err(ProxyError::config(format!(
//!             "No API key found for provider {}",
//!             cfg.provider_label
//!         )));
//!     }
//!     ...
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Taxonomy of failures the proxy can surface (spec §3 `Error` variants).
///
/// Each variant has a fixed `kind()` string and a default HTTP status used
/// when the failure is detected before any response bytes are written.
/// Once SSE streaming has begun, the status is irrelevant — every variant
/// can also be rendered as an `error` SSE event via [`ProxyError::to_sse_event`].
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// No API key resolved for the configured provider, or other startup/
    /// request-time configuration defect. Never reaches an upstream call.
    #[error("{0}")]
    Config(String),

    /// The upstream provider responded with a non-2xx status.
    #[error("upstream `{provider}` returned HTTP {status}: {excerpt}")]
    UpstreamHttp {
        status: StatusCode,
        excerpt: String,
        provider: String,
    },

    /// The upstream provider's response body was not valid/expected JSON.
    #[error("failed to parse upstream response: {0}")]
    UpstreamParse(String),

    /// The inbound request could not be translated to the upstream dialect.
    #[error("translation failed: {0}")]
    Translation(String),

    /// A network-level failure talking to the upstream provider.
    #[error("transport error: {0}")]
    Transport(String),

    /// The client disconnected (or the task was otherwise canceled) before
    /// completion. Not surfaced to any client — used internally to short
    /// circuit the streaming loop.
    #[error("request canceled")]
    Canceled,
}

impl ProxyError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn translation(message: impl Into<String>) -> Self {
        Self::Translation(message.into())
    }

    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn upstream_parse(err: impl std::fmt::Display) -> Self {
        Self::UpstreamParse(err.to_string())
    }

    /// Stable machine-readable discriminant (spec §3: "a stable machine-readable kind").
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::UpstreamHttp { .. } => "upstream_http",
            Self::UpstreamParse(_) => "upstream_parse",
            Self::Translation(_) => "translation",
            Self::Transport(_) => "transport",
            Self::Canceled => "canceled",
        }
    }

    /// HTTP status to use when this error is detected before `message_start`
    /// has been written (spec §7 propagation policy).
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Config(_) => StatusCode::BAD_REQUEST,
            Self::Translation(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamHttp { status, .. } => *status,
            Self::UpstreamParse(_) => StatusCode::BAD_GATEWAY,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
            Self::Canceled => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// User-facing message — never includes a raw API key (spec §7/§8:
    /// "No log line contains any configured API key").
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Render this error as a single Anthropic SSE `error` event, to be
    /// followed by a `message_stop` event by the caller. Used once
    /// `headersSent` is true (spec §4.4 header-commit discipline).
    pub fn to_sse_event(&self) -> String {
        let payload = json!({
            "type": "error",
            "error": {
                "type": self.kind(),
                "message": self.message(),
            }
        });
        format!("event: error\ndata: {payload}\n\n")
    }

    /// Render this error as the `{error:{kind, message}}` JSON body (spec §7/§8).
    pub fn to_json_body(&self) -> serde_json::Value {
        json!({
            "error": {
                "kind": self.kind(),
                "message": self.message(),
            }
        })
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        tracing::warn!(kind = self.kind(), error = %self, "request failed");
        (self.status(), Json(self.to_json_body())).into_response()
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        ProxyError::Transport(err.to_string())
    }
}
