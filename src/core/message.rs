//! Conversation message model as delivered by the remote graph API.
//!
//! Messages are owned by the remote thread state. The client only reads
//! them, except for human messages it creates before submitting a run.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Message discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Written by the user.
    Human,
    /// Produced by the model.
    #[serde(alias = "AIMessageChunk")]
    Ai,
    /// Result of a tool invocation.
    Tool,
    /// System prompt.
    System,
    /// Deletion marker emitted by some graphs.
    Remove,
    /// Anything this client does not know about.
    #[serde(other)]
    Other,
}

impl MessageKind {
    /// Get a string representation of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Ai => "ai",
            Self::Tool => "tool",
            Self::System => "system",
            Self::Remove => "remove",
            Self::Other => "other",
        }
    }
}

/// Message content: either a plain string or a list of content blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text.
    Text(String),
    /// Provider content blocks (`text`, `tool_use`, `image_url`, ...).
    Blocks(Vec<Value>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// `OpenAI`-style function payload inside `additional_kwargs.tool_calls`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Arguments, usually a JSON-encoded string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Loose tool-call descriptor.
///
/// Covers the three shapes a tool call can arrive in: LangChain
/// `tool_calls` entries (`name`/`args`), `OpenAI` `additional_kwargs`
/// entries (`function.name`/`function.arguments`) and Anthropic `tool_use`
/// content blocks (`name`/`input`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionCall>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ToolCallDescriptor {
    /// Resolved tool name, falling back to the block type and then `"unknown"`.
    #[must_use]
    pub fn resolved_name(&self) -> String {
        [
            self.function.as_ref().and_then(|f| f.name.as_deref()),
            self.name.as_deref(),
            self.kind.as_deref(),
        ]
        .into_iter()
        .flatten()
        .find(|name| !name.is_empty())
        .unwrap_or("unknown")
        .to_string()
    }

    /// Resolved arguments as a JSON value.
    ///
    /// `OpenAI` arguments arrive as an encoded string and are decoded when
    /// possible. Missing arguments become an empty object.
    #[must_use]
    pub fn resolved_args(&self) -> Value {
        let raw = self
            .function
            .as_ref()
            .and_then(|f| f.arguments.clone())
            .filter(|v| !is_empty_value(v))
            .or_else(|| self.args.clone().filter(|v| !is_empty_value(v)))
            .or_else(|| self.input.clone().filter(|v| !is_empty_value(v)));

        match raw {
            Some(Value::String(encoded)) => serde_json::from_str(&encoded)
                .unwrap_or(Value::String(encoded)),
            Some(value) => value,
            None => Value::Object(Map::new()),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Message in a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message type.
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Message identifier. Remote messages nearly always carry one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Content.
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: MessageContent,

    /// LangChain tool calls (AI messages only).
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tool_calls: Vec<ToolCallDescriptor>,

    /// Provider-specific extras; may hold `OpenAI` style `tool_calls`.
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Map::is_empty"
    )]
    pub additional_kwargs: Map<String, Value>,

    /// Tool call this message answers (tool messages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Tool name (tool messages) or author name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Tool execution status (`success` or `error`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Fields this client does not interpret, kept for lossless round trips.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    fn with_kind(kind: MessageKind, content: impl Into<MessageContent>) -> Self {
        Self {
            kind,
            id: None,
            content: content.into(),
            tool_calls: Vec::new(),
            additional_kwargs: Map::new(),
            tool_call_id: None,
            name: None,
            status: None,
            extra: Map::new(),
        }
    }

    /// Create a new human message with a fresh id.
    #[must_use]
    pub fn human(content: impl Into<MessageContent>) -> Self {
        let mut message = Self::with_kind(MessageKind::Human, content);
        message.id = Some(uuid::Uuid::new_v4().to_string());
        message
    }

    /// Create an AI message.
    #[must_use]
    pub fn ai(id: impl Into<String>, content: impl Into<MessageContent>) -> Self {
        let mut message = Self::with_kind(MessageKind::Ai, content);
        message.id = Some(id.into());
        message
    }

    /// Create a tool result message.
    #[must_use]
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<MessageContent>) -> Self {
        let mut message = Self::with_kind(MessageKind::Tool, content);
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    /// Attach LangChain tool calls.
    #[must_use]
    pub fn with_tool_calls(mut self, calls: Vec<ToolCallDescriptor>) -> Self {
        self.tool_calls = calls;
        self
    }

    /// Set the message id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the name field.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Check if this is a human message.
    #[must_use]
    pub fn is_human(&self) -> bool {
        self.kind == MessageKind::Human
    }

    /// Check if this is an AI message.
    #[must_use]
    pub fn is_ai(&self) -> bool {
        self.kind == MessageKind::Ai
    }

    /// Check if this is a tool message.
    #[must_use]
    pub fn is_tool(&self) -> bool {
        self.kind == MessageKind::Tool
    }

    /// Whether the tool reported a failure.
    #[must_use]
    pub fn is_tool_error(&self) -> bool {
        self.is_tool() && self.status.as_deref() == Some("error")
    }

    /// Plain text of the message.
    #[must_use]
    pub fn text(&self) -> String {
        extract_string_from_message_content(&self.content)
    }

    /// `OpenAI` style tool calls from `additional_kwargs`, if present and well formed.
    #[must_use]
    pub fn additional_tool_calls(&self) -> Option<Vec<ToolCallDescriptor>> {
        let raw = self.additional_kwargs.get("tool_calls")?;
        match serde_json::from_value::<Vec<ToolCallDescriptor>>(raw.clone()) {
            Ok(calls) => Some(calls),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed additional_kwargs.tool_calls");
                None
            }
        }
    }

    /// Content blocks of type `tool_use`.
    #[must_use]
    pub fn tool_use_blocks(&self) -> Vec<ToolCallDescriptor> {
        let MessageContent::Blocks(blocks) = &self.content else {
            return Vec::new();
        };

        blocks
            .iter()
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("tool_use"))
            .filter_map(|block| serde_json::from_value(block.clone()).ok())
            .collect()
    }
}

/// Extract the displayable text of message content.
///
/// String content is returned as-is. For block content, string blocks and
/// `text` blocks are concatenated; every other block is skipped.
#[must_use]
pub fn extract_string_from_message_content(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Blocks(blocks) => blocks
            .iter()
            .filter_map(|block| match block {
                Value::String(s) => Some(s.as_str()),
                Value::Object(obj) if obj.get("type").and_then(Value::as_str) == Some("text") => {
                    Some(obj.get("text").and_then(Value::as_str).unwrap_or(""))
                }
                _ => None,
            })
            .collect(),
    }
}

static CITATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\(([^)]*)\)").unwrap_or_else(|_| unreachable!()));

/// Collect the targets of markdown links in `text`, in order of appearance.
#[must_use]
pub fn extract_citation_urls(text: &str) -> Vec<String> {
    CITATION_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(2).map(|m| m.as_str().to_string()))
        .collect()
}
