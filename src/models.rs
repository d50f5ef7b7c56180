//! Anthropic Messages API data model (spec §3).
//!
//! Modeled as a sum type per spec §9 design notes ("Inbound content blocks
//! are a tagged union ... Model as a sum type; translation over it is a
//! match."). The OpenAI side of the wire is deliberately *not* given the same
//! typed treatment — it is assembled with `serde_json::json!` in
//! `translate::request` the way the teacher's `backends/anthropic.rs`
//! assembles its translated bodies, since that shape is the foreign,
//! frequently-varying one and the Anthropic shape is the one this crate owns.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// `system` may be a plain string or an array of text blocks (spec §3/§4.1).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Text(String),
    Blocks(Vec<SystemBlock>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SystemBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// A message's `content` is either a bare string or an ordered list of
/// typed content blocks (spec §3: "content that is either a string or an
/// ordered list of content blocks").
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnthropicMessage {
    pub role: Role,
    pub content: MessageContent,
}

/// `tool_result.content` may be a bare string or a list of blocks (spec §3).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl ToolResultContent {
    /// Stringify for forwarding as an OpenAI `tool` message's `content`
    /// field (spec §4.1: "`{role:"tool", tool_call_id, content:<stringified result>}`").
    pub fn stringify(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Blocks(blocks) => {
                let parts: Vec<String> = blocks
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::Text { text } => Some(text.clone()),
                        _ => None,
                    })
                    .collect();
                parts.join("\n")
            }
        }
    }
}

/// Content block tagged union (spec §3 `ContentBlock` variants).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Option<ToolResultContent>,
        #[serde(default)]
        is_error: Option<bool>,
    },
    Thinking {
        thinking: String,
    },
    Image {
        source: Value,
    },
}

/// Inbound `/v1/messages` (and `/v1/messages/count_tokens`) request body
/// (spec §3 `AnthropicRequest`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnthropicRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system: Option<SystemPrompt>,
    pub messages: Vec<AnthropicMessage>,
    #[serde(default)]
    pub tools: Option<Vec<AnthropicTool>>,
    #[serde(default)]
    pub tool_choice: Option<ToolChoice>,
    /// Presence (regardless of contents) means "reasoning mode" (spec §3/§4.1).
    #[serde(default)]
    pub thinking: Option<Value>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
}

impl AnthropicRequest {
    pub fn is_streaming(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    pub fn is_reasoning(&self) -> bool {
        self.thinking.is_some()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnthropicTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    Any,
    None,
    Tool { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_string_content_message() {
        let json = r#"{"role":"user","content":"Hi"}"#;
        let msg: AnthropicMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg.role, Role::User));
        assert!(matches!(msg.content, MessageContent::Text(ref s) if s == "Hi"));
    }

    #[test]
    fn deserializes_block_content_message_with_tool_use() {
        let json = r#"{
            "role": "assistant",
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "t1", "name": "get_weather", "input": {"location": "Paris"}}
            ]
        }"#;
        let msg: AnthropicMessage = serde_json::from_str(json).unwrap();
        match msg.content {
            MessageContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 2);
                assert!(matches!(blocks[0], ContentBlock::Text { .. }));
                match &blocks[1] {
                    ContentBlock::ToolUse { id, name, .. } => {
                        assert_eq!(id, "t1");
                        assert_eq!(name, "get_weather");
                    }
                    _ => panic!("expected tool_use"),
                }
            }
            _ => panic!("expected block content"),
        }
    }

    #[test]
    fn deserializes_tool_result_with_string_content() {
        let json = r#"{"type":"tool_result","tool_use_id":"t1","content":"72F and sunny"}"#;
        let block: ContentBlock = serde_json::from_str(json).unwrap();
        match block {
            ContentBlock::ToolResult { tool_use_id, content, is_error } => {
                assert_eq!(tool_use_id, "t1");
                assert_eq!(content.unwrap().stringify(), "72F and sunny");
                assert_eq!(is_error, None);
            }
            _ => panic!("expected tool_result"),
        }
    }

    #[test]
    fn system_prompt_accepts_string_or_blocks() {
        let string_form: SystemPrompt = serde_json::from_str(r#""Be helpful""#).unwrap();
        assert!(matches!(string_form, SystemPrompt::Text(ref s) if s == "Be helpful"));

        let blocks_form: SystemPrompt =
            serde_json::from_str(r#"[{"type":"text","text":"Be helpful"}]"#).unwrap();
        assert!(matches!(blocks_form, SystemPrompt::Blocks(ref b) if b.len() == 1));
    }

    #[test]
    fn tool_choice_variants_round_trip() {
        let auto: ToolChoice = serde_json::from_str(r#"{"type":"auto"}"#).unwrap();
        assert!(matches!(auto, ToolChoice::Auto));
        let tool: ToolChoice = serde_json::from_str(r#"{"type":"tool","name":"get_weather"}"#).unwrap();
        assert!(matches!(tool, ToolChoice::Tool { ref name } if name == "get_weather"));
    }

    #[test]
    fn thinking_presence_marks_reasoning_mode() {
        let json = r#"{"messages":[{"role":"user","content":"hi"}],"thinking":{"type":"enabled"}}"#;
        let req: AnthropicRequest = serde_json::from_str(json).unwrap();
        assert!(req.is_reasoning());
    }
}
