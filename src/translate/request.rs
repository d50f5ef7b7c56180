//! Anthropic → OpenAI request translation (spec §4.1).
//!
//! Pure function, no I/O — grounded on the teacher's
//! `backends/anthropic.rs::to_anthropic`, generalized from "OpenAI body →
//! Anthropic body" to "Anthropic body → OpenAI body" and extended with tool
//! calls, which the teacher's adapter explicitly deferred ("non-text blocks;
//! ignored until streaming/tool-call support is added").

use std::collections::HashSet;

use serde_json::{json, Value};

use crate::capability;
use crate::config::{ModelRole, ProviderConfig};
use crate::error::ProxyError;
use crate::models::{
    AnthropicMessage, AnthropicRequest, ContentBlock, MessageContent, Role, SystemBlock,
    SystemPrompt, ToolChoice,
};

/// Translate an [`AnthropicRequest`] into an OpenAI chat-completions request
/// body. Returns a [`ProxyError::Translation`] without making any upstream
/// call when the input cannot be represented (spec §4.1 "Failure conditions").
pub fn to_openai(req: &AnthropicRequest, config: &ProviderConfig) -> Result<Value, ProxyError> {
    if req.messages.is_empty() {
        return Err(ProxyError::translation("`messages` must not be empty"));
    }

    let model = select_model(req, config);

    let mut messages = Vec::new();
    if let Some(system_msg) = translate_system(req.system.as_ref()) {
        messages.push(system_msg);
    }

    let mut seen_tool_use_ids: HashSet<String> = HashSet::new();
    for msg in &req.messages {
        translate_message(msg, &mut messages, &mut seen_tool_use_ids)?;
    }

    let mut body = json!({
        "model": model,
        "messages": messages,
        "stream": req.is_streaming(),
    });

    if let Some(tools) = &req.tools {
        body["tools"] = translate_tools(tools)?;
    }
    if let Some(choice) = &req.tool_choice {
        body["tool_choice"] = translate_tool_choice(choice);
    }

    if let Some(max_tokens) = req.max_tokens {
        let key = if capability::uses_max_completion_tokens(&model) {
            "max_completion_tokens"
        } else {
            "max_tokens"
        };
        body[key] = json!(max_tokens);
    }
    if let Some(temperature) = req.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(top_p) = req.top_p {
        body["top_p"] = json!(top_p);
    }
    if let Some(stop) = &req.stop_sequences {
        body["stop"] = json!(stop);
    }

    Ok(body)
}

/// Model selection (spec §4.1): an explicit, recognized client alias wins;
/// otherwise fall back to the `thinking`-driven role. The client's raw
/// Anthropic model name is never forwarded to an OpenAI-dialect provider.
fn select_model(req: &AnthropicRequest, config: &ProviderConfig) -> String {
    if let Some(client_model) = &req.model {
        if let Some(role) = ProviderConfig::role_for_alias(client_model) {
            return config.model_for_role(role).to_string();
        }
    }
    let role = if req.is_reasoning() {
        ModelRole::Reasoning
    } else {
        ModelRole::Completion
    };
    config.model_for_role(role).to_string()
}

/// Flatten `system` into a single leading `{role:"system", content}` message,
/// or `None` if `system` is absent or entirely non-text (spec §4.1).
fn translate_system(system: Option<&SystemPrompt>) -> Option<Value> {
    let text = match system? {
        SystemPrompt::Text(s) => s.clone(),
        SystemPrompt::Blocks(blocks) => {
            let parts: Vec<&str> = blocks
                .iter()
                .filter_map(|b: &SystemBlock| {
                    if b.kind == "text" {
                        b.text.as_deref()
                    } else {
                        tracing::debug!(kind = %b.kind, "dropping non-text system block");
                        None
                    }
                })
                .collect();
            if parts.is_empty() {
                return None;
            }
            parts.join("\n")
        }
    };
    if text.is_empty() {
        return None;
    }
    Some(json!({ "role": "system", "content": text }))
}

fn translate_message(
    msg: &AnthropicMessage,
    out: &mut Vec<Value>,
    seen_tool_use_ids: &mut HashSet<String>,
) -> Result<(), ProxyError> {
    match (&msg.role, &msg.content) {
        (Role::User, MessageContent::Text(text)) => {
            out.push(json!({ "role": "user", "content": text }));
        }
        (Role::User, MessageContent::Blocks(blocks)) => {
            translate_user_blocks(blocks, out, seen_tool_use_ids)?;
        }
        (Role::Assistant, MessageContent::Text(text)) => {
            out.push(json!({ "role": "assistant", "content": text }));
        }
        (Role::Assistant, MessageContent::Blocks(blocks)) => {
            translate_assistant_blocks(blocks, out, seen_tool_use_ids)?;
        }
    }
    Ok(())
}

/// A user turn: any `tool_result` blocks become standalone `{role:"tool"}`
/// messages; all remaining `text`/`image` blocks collect into one
/// `{role:"user", content:[...]}` message that precedes them (spec §4.1).
fn translate_user_blocks(
    blocks: &[ContentBlock],
    out: &mut Vec<Value>,
    seen_tool_use_ids: &HashSet<String>,
) -> Result<(), ProxyError> {
    let mut leading_blocks: Vec<Value> = Vec::new();
    let mut tool_messages: Vec<Value> = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text } => {
                leading_blocks.push(json!({ "type": "text", "text": text }));
            }
            ContentBlock::Image { source } => {
                leading_blocks.push(json!({ "type": "image_url", "image_url": translate_image_source(source) }));
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                if !seen_tool_use_ids.contains(tool_use_id) {
                    return Err(ProxyError::translation(format!(
                        "tool_result references unknown tool_use_id `{tool_use_id}`"
                    )));
                }
                let stringified = content.as_ref().map(|c| c.stringify()).unwrap_or_default();
                let mut tool_msg = json!({
                    "role": "tool",
                    "tool_call_id": tool_use_id,
                    "content": stringified,
                });
                if is_error.unwrap_or(false) {
                    tool_msg["content"] = json!(format!("Error: {stringified}"));
                }
                tool_messages.push(tool_msg);
            }
            ContentBlock::ToolUse { .. } | ContentBlock::Thinking { .. } => {
                return Err(ProxyError::translation(
                    "tool_use/thinking blocks are not valid in a user message",
                ));
            }
        }
    }

    if !leading_blocks.is_empty() {
        out.push(json!({ "role": "user", "content": leading_blocks }));
    }
    out.extend(tool_messages);
    Ok(())
}

/// An assistant turn: text blocks join into `content`; each `tool_use`
/// becomes one entry in `tool_calls`. `thinking` blocks are dropped — not
/// representable in the OpenAI schema (spec §4.1).
fn translate_assistant_blocks(
    blocks: &[ContentBlock],
    out: &mut Vec<Value>,
    seen_tool_use_ids: &mut HashSet<String>,
) -> Result<(), ProxyError> {
    let mut text_parts: Vec<&str> = Vec::new();
    let mut tool_calls: Vec<Value> = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text } => text_parts.push(text),
            ContentBlock::Thinking { .. } => {
                tracing::debug!("dropping thinking block for OpenAI-dialect provider");
            }
            ContentBlock::ToolUse { id, name, input } => {
                if id.is_empty() {
                    return Err(ProxyError::translation(
                        "assistant tool_use block is missing an id",
                    ));
                }
                seen_tool_use_ids.insert(id.clone());
                tool_calls.push(json!({
                    "id": id,
                    "type": "function",
                    "function": {
                        "name": name,
                        "arguments": serde_json::to_string(input)
                            .map_err(|e| ProxyError::translation(e.to_string()))?,
                    }
                }));
            }
            ContentBlock::ToolResult { .. } | ContentBlock::Image { .. } => {
                return Err(ProxyError::translation(
                    "tool_result/image blocks are not valid in an assistant message",
                ));
            }
        }
    }

    let mut message = json!({
        "role": "assistant",
        "content": text_parts.join(""),
    });
    if !tool_calls.is_empty() {
        message["tool_calls"] = json!(tool_calls);
    }
    out.push(message);
    Ok(())
}

/// Convert an Anthropic `image` block's `source` into OpenAI's
/// `image_url: {"url": ...}` shape (spec §4.1/§3 `image` block, forwarded to
/// OpenAI-dialect providers only). Anthropic sources are either
/// `{type:"base64", media_type, data}`, which becomes a `data:` URI, or
/// `{type:"url", url}`, forwarded as-is; anything else passes its `url`/`data`
/// through best-effort rather than dropping the image outright.
fn translate_image_source(source: &Value) -> Value {
    let kind = source.get("type").and_then(Value::as_str).unwrap_or_default();
    let url = match kind {
        "base64" => {
            let media_type = source.get("media_type").and_then(Value::as_str).unwrap_or("image/png");
            let data = source.get("data").and_then(Value::as_str).unwrap_or_default();
            format!("data:{media_type};base64,{data}")
        }
        "url" => source.get("url").and_then(Value::as_str).unwrap_or_default().to_string(),
        _ => source.get("url").and_then(Value::as_str).unwrap_or_default().to_string(),
    };
    json!({ "url": url })
}

fn translate_tools(tools: &[crate::models::AnthropicTool]) -> Result<Value, ProxyError> {
    let mut out = Vec::with_capacity(tools.len());
    for tool in tools {
        if !tool.input_schema.is_object() {
            return Err(ProxyError::translation(format!(
                "tool `{}` input_schema must be a JSON object",
                tool.name
            )));
        }
        out.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }
    Ok(json!(out))
}

fn translate_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::Any => json!("required"),
        ToolChoice::None => json!("none"),
        ToolChoice::Tool { name } => json!({ "type": "function", "function": { "name": name } }),
    }
}
