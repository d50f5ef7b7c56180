//! Streaming coordinator (spec §4.4): converts an OpenAI SSE token stream
//! into the ordered Anthropic SSE event sequence, with packet-split JSON
//! buffering and a non-reshaping passthrough for Anthropic-native upstreams.
//!
//! No direct teacher equivalent exists — the teacher's `backends/openai.rs`
//! streams raw bytes straight through without reshaping (its router only
//! proxies between two OpenAI-dialect endpoints). This module reuses that
//! file's dual-client/byte-stream shape but adds the event-reshaping state
//! machine the teacher never needed, since it never bridges two schemas.
//!
//! Header-commit discipline (spec §4.4) falls out of the architecture rather
//! than an explicit flag: by the time a caller is polling the stream this
//! module returns, the HTTP response (and its headers) has already been
//! handed to the client by `axum` — there is no further HTTP-status code
//! path available. Every failure from here on is rendered as an SSE `error`
//! event followed by `message_stop`, via [`ProxyError::to_sse_event`].

use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;

use bytes::Bytes;
use futures_util::{stream, Stream, StreamExt as _};
use serde_json::Value;
use uuid::Uuid;

use crate::capability;
use crate::error::ProxyError;
use crate::translate::response::map_stop_reason;
use crate::upstream::ByteStream;

/// A `Send`-able stream of pre-rendered SSE bytes. `Infallible` because every
/// failure is folded into an SSE `error` event rather than a stream error —
/// axum would otherwise abort the connection instead of flushing it cleanly.
pub type SseByteStream = std::pin::Pin<Box<dyn Stream<Item = Result<Bytes, Infallible>> + Send>>;

/// Which content block is currently open, if any. Anthropic content blocks
/// are strictly sequential — opening a new kind always closes the previous
/// one first (spec §4.4 state machine).
#[derive(Debug, Clone, PartialEq)]
enum OpenBlock {
    None,
    Text(usize),
    Thinking(usize),
    /// `(anthropic_index, openai_tool_call_index)`.
    ToolUse(usize, u64),
}

struct CoordinatorState {
    upstream: ByteStream,
    /// Leftover bytes from a line split across two upstream reads.
    raw_buffer: Vec<u8>,
    /// Leftover `data:` payload from a JSON value split across two lines
    /// (spec §4.4 "packet-split JSON buffering").
    json_carry: String,
    /// Rendered events ready to hand to the caller, oldest first.
    output: VecDeque<String>,
    block: OpenBlock,
    next_index: usize,
    /// Accumulators for in-progress tool calls, keyed by the OpenAI
    /// `tool_calls[i].index` so fragments reassemble onto the right block.
    tool_calls: HashMap<u64, ToolCallAcc>,
    output_chars: usize,
    done: bool,
}

struct ToolCallAcc {
    anthropic_index: usize,
}

/// Reshape an OpenAI-dialect SSE byte stream into Anthropic SSE events.
///
/// `tools_present` and `model` drive the tool-concurrency diagnostic (spec
/// §4.4 "Tool concurrency diagnostic") logged once at stream start.
pub fn coordinate_openai(upstream: ByteStream, model: String, tools_present: bool) -> SseByteStream {
    if tools_present && capability::has_tool_concurrency_quirk(&model) {
        tracing::warn!(
            model = %model,
            "model has known tool-concurrency quirks; streamed tool_calls may interleave unexpectedly"
        );
    }

    let message_id = format!("msg_{}", Uuid::new_v4().simple());
    let mut initial = VecDeque::new();
    initial.push_back(message_start_event(&message_id, &model));
    initial.push_back("event: ping\ndata: {\"type\": \"ping\"}\n\n".to_string());

    let state = CoordinatorState {
        upstream,
        raw_buffer: Vec::new(),
        json_carry: String::new(),
        output: initial,
        block: OpenBlock::None,
        next_index: 0,
        tool_calls: HashMap::new(),
        output_chars: 0,
        done: false,
    };

    Box::pin(stream::unfold(state, step))
}

/// Forward an Anthropic-native upstream's SSE bytes untouched (spec §4.4:
/// "a line-oriented passthrough ... without reshaping events"). No JSON
/// parsing is needed here — there is no schema to bridge, so there is
/// nothing packet-split buffering could protect against. An upstream error
/// still has to end the Anthropic event sequence properly: it is rendered as
/// an `error` event followed by `message_stop` (spec §4.4/§8), not just the
/// bare error event, and no further bytes are forwarded afterward.
pub fn passthrough_anthropic(upstream: ByteStream) -> SseByteStream {
    struct PassthroughState {
        upstream: ByteStream,
        pending: VecDeque<Bytes>,
        done: bool,
    }

    let state = PassthroughState {
        upstream,
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(bytes) = state.pending.pop_front() {
                return Some((Ok(bytes), state));
            }
            if state.done {
                return None;
            }
            match state.upstream.next().await {
                None => {
                    state.done = true;
                }
                Some(Ok(bytes)) => return Some((Ok(bytes), state)),
                Some(Err(err)) => {
                    state.pending.push_back(Bytes::from(err.to_sse_event()));
                    state.pending.push_back(Bytes::from(message_stop_event()));
                    state.done = true;
                }
            }
        }
    }))
}

async fn step(mut state: CoordinatorState) -> Option<(Result<Bytes, Infallible>, CoordinatorState)> {
    loop {
        if let Some(event) = state.output.pop_front() {
            return Some((Ok(Bytes::from(event)), state));
        }
        if state.done {
            return None;
        }

        match state.upstream.next().await {
            None => {
                finalize(&mut state, None);
                state.done = true;
            }
            Some(Err(err)) => {
                state.output.push_back(err.to_sse_event());
                state.output.push_back(message_stop_event());
                state.done = true;
            }
            Some(Ok(bytes)) => ingest(&mut state, &bytes),
        }
    }
}

/// Split newly-arrived bytes into complete lines, carrying any trailing
/// partial line into `raw_buffer` for the next read.
fn ingest(state: &mut CoordinatorState, bytes: &[u8]) {
    state.raw_buffer.extend_from_slice(bytes);

    let mut start = 0;
    while let Some(rel_newline) = state.raw_buffer[start..].iter().position(|&b| b == b'\n') {
        let end = start + rel_newline;
        let line = String::from_utf8_lossy(&state.raw_buffer[start..end]).into_owned();
        start = end + 1;
        process_line(state, &line);
        if state.done {
            break;
        }
    }
    state.raw_buffer.drain(0..start);
}

fn process_line(state: &mut CoordinatorState, line: &str) {
    let line = line.trim_end_matches('\r');
    let Some(data) = line.strip_prefix("data:") else {
        return;
    };
    let data = data.trim_start();

    if data == "[DONE]" {
        // Best-effort flush of whatever was buffered; discard on failure
        // (spec §4.4: "flush buffer (best-effort parse, discard on failure)").
        if !state.json_carry.is_empty() {
            if let Ok(value) = serde_json::from_str::<Value>(&state.json_carry) {
                apply_chunk(state, &value);
            }
            state.json_carry.clear();
        }
        finalize(state, None);
        state.done = true;
        return;
    }

    let candidate = if state.json_carry.is_empty() {
        data.to_string()
    } else {
        let mut combined = std::mem::take(&mut state.json_carry);
        combined.push_str(data);
        combined
    };

    match serde_json::from_str::<Value>(&candidate) {
        Ok(value) => apply_chunk(state, &value),
        Err(_) => state.json_carry = candidate,
    }
}

/// Apply one parsed OpenAI `chat.completion.chunk` object, appending any
/// rendered Anthropic SSE events to `state.output` (spec §4.4 transitions).
fn apply_chunk(state: &mut CoordinatorState, value: &Value) {
    let Some(choice) = value.get("choices").and_then(|c| c.get(0)) else {
        return;
    };
    let delta = choice.get("delta");

    if let Some(text) = delta.and_then(|d| d.get("content")).and_then(Value::as_str) {
        if !text.is_empty() {
            ensure_block(state, TargetBlock::Text);
            if let OpenBlock::Text(index) = state.block {
                state.output_chars += text.len();
                state.output.push_back(content_block_delta_text(index, text));
            }
        }
    }

    if let Some(thinking) = delta.and_then(|d| d.get("reasoning")).and_then(Value::as_str) {
        if !thinking.is_empty() {
            ensure_block(state, TargetBlock::Thinking);
            if let OpenBlock::Thinking(index) = state.block {
                state.output_chars += thinking.len();
                state.output.push_back(content_block_delta_thinking(index, thinking));
            }
        }
    }

    if let Some(tool_calls) = delta.and_then(|d| d.get("tool_calls")).and_then(Value::as_array) {
        for (position, call) in tool_calls.iter().enumerate() {
            apply_tool_call_fragment(state, call, position as u64);
        }
    }

    if let Some(finish_reason) = choice.get("finish_reason").and_then(Value::as_str) {
        finalize(state, Some(finish_reason.to_string()));
        state.done = true;
    }
}

enum TargetBlock {
    Text,
    Thinking,
}

/// Close the currently open block (if any, and if it differs) and open the
/// requested kind, emitting `content_block_stop`/`content_block_start` as
/// needed (spec §4.4).
fn ensure_block(state: &mut CoordinatorState, target: TargetBlock) {
    let matches = matches!(
        (&state.block, &target),
        (OpenBlock::Text(_), TargetBlock::Text) | (OpenBlock::Thinking(_), TargetBlock::Thinking)
    );
    if matches {
        return;
    }
    close_open_block(state);

    let index = state.next_index;
    state.next_index += 1;
    match target {
        TargetBlock::Text => {
            state.block = OpenBlock::Text(index);
            state.output.push_back(content_block_start_text(index));
        }
        TargetBlock::Thinking => {
            state.block = OpenBlock::Thinking(index);
            state.output.push_back(content_block_start_thinking(index));
        }
    }
}

fn apply_tool_call_fragment(state: &mut CoordinatorState, call: &Value, position: u64) {
    let openai_index = call.get("index").and_then(Value::as_u64).unwrap_or(position);

    let acc_index = if let Some(acc) = state.tool_calls.get(&openai_index) {
        acc.anthropic_index
    } else {
        let id = call.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
        let name = call
            .get("function")
            .and_then(|f| f.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if !matches!(state.block, OpenBlock::ToolUse(_, idx) if idx == openai_index) {
            close_open_block(state);
        }
        let anthropic_index = state.next_index;
        state.next_index += 1;
        state.block = OpenBlock::ToolUse(anthropic_index, openai_index);
        state.tool_calls.insert(openai_index, ToolCallAcc { anthropic_index });
        state.output.push_back(content_block_start_tool_use(anthropic_index, &id, &name));
        anthropic_index
    };

    if let Some(args) = call
        .get("function")
        .and_then(|f| f.get("arguments"))
        .and_then(Value::as_str)
    {
        if !args.is_empty() {
            state.output_chars += args.len();
            state.output.push_back(content_block_delta_input_json(acc_index, args));
        }
    }
}

fn close_open_block(state: &mut CoordinatorState) {
    match state.block {
        OpenBlock::None => {}
        OpenBlock::Text(index) | OpenBlock::Thinking(index) | OpenBlock::ToolUse(index, _) => {
            state.output.push_back(content_block_stop_event(index));
        }
    }
    state.block = OpenBlock::None;
}

/// Emit the closing `message_delta`/`message_stop` pair and mark the stream
/// finished. `finish_reason` is `None` when the upstream closed without a
/// `finish_reason` chunk (treated as a clean `end_turn`).
fn finalize(state: &mut CoordinatorState, finish_reason: Option<String>) {
    close_open_block(state);
    let stop_reason = map_stop_reason(finish_reason.as_deref());
    let output_tokens = ((state.output_chars as u64) + 3) / 4;
    state.output.push_back(message_delta_event(stop_reason, output_tokens));
    state.output.push_back(message_stop_event());
}

fn message_start_event(message_id: &str, model: &str) -> String {
    let payload = serde_json::json!({
        "type": "message_start",
        "message": {
            "id": message_id,
            "type": "message",
            "role": "assistant",
            "model": model,
            "content": [],
            "stop_reason": Value::Null,
            "stop_sequence": Value::Null,
            "usage": {"input_tokens": 0, "output_tokens": 0},
        }
    });
    format!("event: message_start\ndata: {payload}\n\n")
}

fn content_block_start_text(index: usize) -> String {
    let payload = serde_json::json!({
        "type": "content_block_start",
        "index": index,
        "content_block": {"type": "text", "text": ""}
    });
    format!("event: content_block_start\ndata: {payload}\n\n")
}

fn content_block_start_thinking(index: usize) -> String {
    let payload = serde_json::json!({
        "type": "content_block_start",
        "index": index,
        "content_block": {"type": "thinking", "thinking": ""}
    });
    format!("event: content_block_start\ndata: {payload}\n\n")
}

fn content_block_start_tool_use(index: usize, id: &str, name: &str) -> String {
    let payload = serde_json::json!({
        "type": "content_block_start",
        "index": index,
        "content_block": {"type": "tool_use", "id": id, "name": name, "input": {}}
    });
    format!("event: content_block_start\ndata: {payload}\n\n")
}

fn content_block_delta_text(index: usize, text: &str) -> String {
    let payload = serde_json::json!({
        "type": "content_block_delta",
        "index": index,
        "delta": {"type": "text_delta", "text": text}
    });
    format!("event: content_block_delta\ndata: {payload}\n\n")
}

fn content_block_delta_thinking(index: usize, thinking: &str) -> String {
    let payload = serde_json::json!({
        "type": "content_block_delta",
        "index": index,
        "delta": {"type": "thinking_delta", "thinking": thinking}
    });
    format!("event: content_block_delta\ndata: {payload}\n\n")
}

fn content_block_delta_input_json(index: usize, partial_json: &str) -> String {
    let payload = serde_json::json!({
        "type": "content_block_delta",
        "index": index,
        "delta": {"type": "input_json_delta", "partial_json": partial_json}
    });
    format!("event: content_block_delta\ndata: {payload}\n\n")
}

fn content_block_stop_event(index: usize) -> String {
    let payload = serde_json::json!({"type": "content_block_stop", "index": index});
    format!("event: content_block_stop\ndata: {payload}\n\n")
}

fn message_delta_event(stop_reason: &str, output_tokens: u64) -> String {
    let payload = serde_json::json!({
        "type": "message_delta",
        "delta": {"stop_reason": stop_reason, "stop_sequence": Value::Null},
        "usage": {"output_tokens": output_tokens}
    });
    format!("event: message_delta\ndata: {payload}\n\n")
}

fn message_stop_event() -> String {
    let payload = serde_json::json!({"type": "message_stop"});
    format!("event: message_stop\ndata: {payload}\n\n")
}
