//! Upstream HTTP client and header composer (spec §4.2).
//!
//! Grounded on the teacher's `backends/openai.rs`: a dual-client split
//! (buffered vs. streaming) so the buffered path can carry a request timeout
//! while the streaming path never times out a still-arriving body (spec §5:
//! "default is 'no timeout' for reasoning models"). Unlike the teacher, there
//! is only ever one upstream per process — `ProviderConfig` is resolved once
//! at startup — so there is no backend-enum dispatch here.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt as _};
use reqwest::{header, Client};
use serde_json::Value;

use crate::config::{EndpointKind, ProviderConfig};
use crate::error::ProxyError;

/// A `Send`-able, heap-allocated byte stream of raw upstream SSE bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ProxyError>> + Send>>;

/// Request timeout for non-streaming calls. Streaming calls carry none.
const BUFFERED_TIMEOUT: Duration = Duration::from_secs(120);

/// Upstream client bound to a single resolved [`ProviderConfig`].
pub struct UpstreamClient {
    client: Client,
    stream_client: Client,
    url: String,
    provider_label: String,
}

impl UpstreamClient {
    /// Build a client from the process-wide configuration. Headers are fixed
    /// at construction time (spec §4.2: `Content-Type`, exactly one auth
    /// header, plus `extraHeaders` verbatim); any `Authorization` header the
    /// inbound client sent is never consulted.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProxyError> {
        let headers = build_headers(config)?;

        let client = Client::builder()
            .default_headers(headers.clone())
            .timeout(BUFFERED_TIMEOUT)
            .build()
            .map_err(ProxyError::transport)?;

        let stream_client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(ProxyError::transport)?;

        Ok(Self {
            client,
            stream_client,
            url: config.upstream_url(),
            provider_label: config.provider_label.clone(),
        })
    }

    /// Issue a non-streaming call and return the parsed JSON body.
    pub async fn send(&self, body: &Value) -> Result<Value, ProxyError> {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(ProxyError::transport)?;

        let status = response.status();
        let text = response.text().await.map_err(ProxyError::transport)?;

        if !status.is_success() {
            return Err(ProxyError::UpstreamHttp {
                status,
                excerpt: excerpt(&text),
                provider: self.provider_label.clone(),
            });
        }

        serde_json::from_str(&text).map_err(ProxyError::upstream_parse)
    }

    /// Issue a streaming call and return the raw upstream byte stream. Does
    /// not buffer the body (spec §4.2: "must not buffer the full response
    /// body in streaming mode"); the streaming coordinator consumes it.
    pub async fn send_stream(&self, body: &Value) -> Result<ByteStream, ProxyError> {
        let response = self
            .stream_client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(ProxyError::transport)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProxyError::UpstreamHttp {
                status,
                excerpt: excerpt(&text),
                provider: self.provider_label.clone(),
            });
        }

        let stream = response.bytes_stream().map(|r| r.map_err(ProxyError::transport));
        Ok(Box::pin(stream))
    }
}

/// Truncate a raw upstream error body to a reasonable excerpt length so logs
/// and error responses stay bounded (spec §3: "body excerpt").
fn excerpt(text: &str) -> String {
    const MAX: usize = 500;
    if text.len() > MAX {
        let mut end = MAX;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &text[..end])
    } else {
        text.to_string()
    }
}

fn build_headers(config: &ProviderConfig) -> Result<header::HeaderMap, ProxyError> {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));

    match config.endpoint_kind {
        EndpointKind::OpenAi => {
            let value = format!("Bearer {}", config.api_key);
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&value)
                    .map_err(|e| ProxyError::config(format!("invalid API key header: {e}")))?,
            );
        }
        EndpointKind::Anthropic => {
            headers.insert(
                "x-api-key",
                header::HeaderValue::from_str(&config.api_key)
                    .map_err(|e| ProxyError::config(format!("invalid API key header: {e}")))?,
            );
        }
    }

    for (name, value) in &config.extra_headers {
        let header_name = header::HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ProxyError::config(format!("invalid extra header name `{name}`: {e}")))?;
        let header_value = header::HeaderValue::from_str(value)
            .map_err(|e| ProxyError::config(format!("invalid extra header value for `{name}`: {e}")))?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wiremock::matchers::{header as wm_header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer, endpoint_kind: EndpointKind) -> ProviderConfig {
        ProviderConfig {
            base_url: server.uri(),
            endpoint_kind,
            provider_label: "test".into(),
            api_key: "sk-test".into(),
            extra_headers: HashMap::new(),
            reasoning_model: "r".into(),
            completion_model: "c".into(),
            value_model: "v".into(),
            debug: false,
            anthropic_version: "2023-06-01".into(),
            anthropic_beta: None,
            force_xml_tools: false,
            port: 3000,
        }
    }

    #[tokio::test]
    async fn openai_dialect_sends_bearer_token_to_chat_completions_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(wm_header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(&config_for(&server, EndpointKind::OpenAi)).unwrap();
        let result = client.send(&serde_json::json!({"model": "m"})).await.unwrap();
        assert_eq!(result["ok"], true);
    }

    #[tokio::test]
    async fn anthropic_dialect_sends_x_api_key_to_messages_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(wm_header("x-api-key", "sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(&config_for(&server, EndpointKind::Anthropic)).unwrap();
        let result = client.send(&serde_json::json!({"model": "m"})).await.unwrap();
        assert_eq!(result["ok"], true);
    }

    #[tokio::test]
    async fn non_2xx_status_becomes_upstream_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(&config_for(&server, EndpointKind::OpenAi)).unwrap();
        let err = client.send(&serde_json::json!({"model": "m"})).await.unwrap_err();
        assert_eq!(err.kind(), "upstream_http");
        assert_eq!(err.status(), reqwest::StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn invalid_json_body_becomes_upstream_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json {{{"))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(&config_for(&server, EndpointKind::OpenAi)).unwrap();
        let err = client.send(&serde_json::json!({"model": "m"})).await.unwrap_err();
        assert_eq!(err.kind(), "upstream_parse");
    }

    #[tokio::test]
    async fn streaming_call_returns_raw_byte_stream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("data: {\"ok\":true}\n\n", "text/event-stream"),
            )
            .mount(&server)
            .await;

        let client = UpstreamClient::new(&config_for(&server, EndpointKind::OpenAi)).unwrap();
        let mut stream = client.send_stream(&serde_json::json!({"model": "m"})).await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert!(String::from_utf8_lossy(&collected).contains("\"ok\":true"));
    }

    #[test]
    fn extra_headers_are_attached_verbatim() {
        let mut cfg = ProviderConfig {
            base_url: "https://example.com".into(),
            endpoint_kind: EndpointKind::OpenAi,
            provider_label: "test".into(),
            api_key: "sk-test".into(),
            extra_headers: HashMap::new(),
            reasoning_model: "r".into(),
            completion_model: "c".into(),
            value_model: "v".into(),
            debug: false,
            anthropic_version: "2023-06-01".into(),
            anthropic_beta: None,
            force_xml_tools: false,
            port: 3000,
        };
        cfg.extra_headers.insert("X-Title".into(), "My App".into());
        let headers = build_headers(&cfg).unwrap();
        assert_eq!(headers.get("X-Title").unwrap(), "My App");
    }
}
