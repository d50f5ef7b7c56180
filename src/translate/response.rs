//! OpenAI → Anthropic response translation, non-streaming half (spec §4.3).
//!
//! Grounded on the teacher's `backends/anthropic.rs::from_anthropic`, mirrored
//! in the opposite direction. Anthropic-native providers skip this entirely
//! and the upstream body is re-emitted verbatim (see `upstream::send`).

use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ProxyError;

/// Translate a complete (non-streaming) OpenAI chat-completion body into an
/// Anthropic `message` object.
pub fn to_anthropic_message(body: &Value) -> Result<Value, ProxyError> {
    let choice = body
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| ProxyError::upstream_parse("response has no `choices[0]`"))?;
    let message = choice
        .get("message")
        .ok_or_else(|| ProxyError::upstream_parse("choice has no `message`"))?;

    let id = body
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("msg_{}", Uuid::new_v4().simple()));
    let model = body
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut content = Vec::new();
    if let Some(text) = message.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            content.push(json!({ "type": "text", "text": text }));
        }
    }
    if let Some(tool_calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in tool_calls {
            content.push(tool_use_block(call));
        }
    }

    let finish_reason = choice.get("finish_reason").and_then(Value::as_str);
    let stop_reason = map_stop_reason(finish_reason);

    let usage = body.get("usage");
    let input_tokens = usage
        .and_then(|u| u.get("prompt_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let output_tokens = usage
        .and_then(|u| u.get("completion_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0);

    Ok(json!({
        "id": id,
        "type": "message",
        "role": "assistant",
        "model": model,
        "content": content,
        "stop_reason": stop_reason,
        "stop_sequence": Value::Null,
        "usage": {
            "input_tokens": input_tokens,
            "output_tokens": output_tokens,
        }
    }))
}

/// Build a `tool_use` content block from one OpenAI `tool_calls[i]` entry.
/// A malformed `arguments` string degrades to an empty object plus a
/// `translation` warning — the response is never failed over this (spec
/// §4.3: "on parse failure, emit an empty object ... never fail the response").
fn tool_use_block(call: &Value) -> Value {
    let id = call.get("id").and_then(Value::as_str).unwrap_or_default();
    let function = call.get("function");
    let name = function
        .and_then(|f| f.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let raw_args = function
        .and_then(|f| f.get("arguments"))
        .and_then(Value::as_str)
        .unwrap_or("{}");
    let input = serde_json::from_str::<Value>(raw_args).unwrap_or_else(|err| {
        tracing::warn!(tool_call_id = id, error = %err, "failed to parse tool_calls arguments");
        json!({})
    });
    json!({ "type": "tool_use", "id": id, "name": name, "input": input })
}

/// `finish_reason` → Anthropic `stop_reason` (spec §4.3).
pub fn map_stop_reason(finish_reason: Option<&str>) -> &'static str {
    match finish_reason {
        Some("length") => "max_tokens",
        Some("tool_calls") => "tool_use",
        Some("content_filter") => "stop_sequence",
        _ => "end_turn",
    }
}
