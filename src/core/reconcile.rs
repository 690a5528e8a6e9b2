//! Message reconciliation.
//!
//! Folds the flat, ordered message list of a thread into display entries:
//! every AI message carries the tool calls it issued, and tool result
//! messages are matched back onto those calls by `tool_call_id`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::{Message, MessageKind, ToolCallDescriptor};

/// Name of the tool deep agents use to delegate work to a sub-agent.
pub const TASK_TOOL_NAME: &str = "task";

/// Display status of a tool call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    /// Issued, no result yet.
    #[default]
    Pending,
    /// A matching tool message arrived.
    Completed,
    /// The run is paused on an interrupt while this call waits.
    Interrupted,
    /// The tool reported a failure.
    Error,
}

impl ToolCallStatus {
    /// Get a string representation of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Error => "error",
        }
    }
}

/// A tool call derived from an AI message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call id. Random when the upstream call had none.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Tool arguments.
    pub args: Value,
    /// Display status.
    pub status: ToolCallStatus,
    /// Extracted text of the matching tool message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl ToolCall {
    fn from_descriptor(descriptor: &ToolCallDescriptor, interrupt_active: bool) -> Self {
        let id = descriptor
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("tool-{}", uuid::Uuid::new_v4()));

        Self {
            id,
            name: descriptor.resolved_name(),
            args: descriptor.resolved_args(),
            status: if interrupt_active {
                ToolCallStatus::Interrupted
            } else {
                ToolCallStatus::Pending
            },
            result: None,
        }
    }

    /// Whether this call delegates to a sub-agent.
    #[must_use]
    pub fn is_task(&self) -> bool {
        self.name == TASK_TOOL_NAME
    }

    /// Sub-agent type requested by a `task` call, if any.
    #[must_use]
    pub fn subagent_type(&self) -> Option<&str> {
        if !self.is_task() {
            return None;
        }
        self.args
            .get("subagent_type")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// A message ready for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedMessage {
    /// The original message.
    pub message: Message,
    /// Tool calls issued by this message (AI messages only).
    pub tool_calls: Vec<ToolCall>,
    /// Whether the avatar should be shown (message type changed).
    pub show_avatar: bool,
}

impl ProcessedMessage {
    /// Sub-agents spawned by this message.
    #[must_use]
    pub fn sub_agents(&self) -> Vec<SubAgent> {
        extract_sub_agents(&self.tool_calls)
    }
}

/// Which of the three tool call shapes a message used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallSource {
    /// `additional_kwargs.tool_calls` (`OpenAI` format).
    AdditionalKwargs,
    /// LangChain `tool_calls`.
    ToolCalls,
    /// `tool_use` content blocks (Anthropic format).
    ContentBlocks,
}

/// Pick the tool call descriptors of an AI message.
///
/// The first non-empty source wins, in the order `additional_kwargs.tool_calls`,
/// `tool_calls`, `tool_use` content blocks. LangChain entries with an empty
/// name are placeholders emitted while streaming and are dropped.
#[must_use]
pub fn extract_tool_call_descriptors(
    message: &Message,
) -> Option<(ToolCallSource, Vec<ToolCallDescriptor>)> {
    if let Some(calls) = message.additional_tool_calls().filter(|c| !c.is_empty()) {
        return Some((ToolCallSource::AdditionalKwargs, calls));
    }

    if !message.tool_calls.is_empty() {
        let calls = message
            .tool_calls
            .iter()
            .filter(|call| call.name.as_deref() != Some(""))
            .cloned()
            .collect();
        return Some((ToolCallSource::ToolCalls, calls));
    }

    let blocks = message.tool_use_blocks();
    if blocks.is_empty() {
        None
    } else {
        Some((ToolCallSource::ContentBlocks, blocks))
    }
}

/// Insertion-ordered map from message key to display entry.
#[derive(Default)]
struct MessageMap {
    entries: Vec<(MessageKind, Message, Vec<ToolCall>)>,
    index: HashMap<String, usize>,
}

impl MessageMap {
    /// Insert or replace, keeping the original position on replacement.
    fn set(&mut self, key: String, message: Message, tool_calls: Vec<ToolCall>) {
        let kind = message.kind;
        if let Some(&idx) = self.index.get(&key) {
            self.entries[idx] = (kind, message, tool_calls);
        } else {
            self.index.insert(key, self.entries.len());
            self.entries.push((kind, message, tool_calls));
        }
    }

    /// Patch the first tool call with `tool_call_id`, searching in insertion order.
    fn complete_tool_call(&mut self, tool_call_id: &str, result: String, failed: bool) -> bool {
        for (_, _, calls) in &mut self.entries {
            if let Some(call) = calls.iter_mut().find(|c| c.id == tool_call_id) {
                call.status = if failed {
                    ToolCallStatus::Error
                } else {
                    ToolCallStatus::Completed
                };
                call.result = Some(result);
                return true;
            }
        }
        false
    }
}

/// Reconcile a message list into display entries.
///
/// `interrupt_active` marks freshly derived tool calls as interrupted
/// instead of pending. Tool messages whose `tool_call_id` matches nothing
/// are dropped.
#[must_use]
pub fn process_messages(messages: &[Message], interrupt_active: bool) -> Vec<ProcessedMessage> {
    let mut map = MessageMap::default();

    for (position, message) in messages.iter().enumerate() {
        let key = || {
            message
                .id
                .clone()
                .unwrap_or_else(|| format!("message-{position}"))
        };

        match message.kind {
            MessageKind::Ai => {
                let tool_calls = extract_tool_call_descriptors(message)
                    .map(|(_, descriptors)| {
                        descriptors
                            .iter()
                            .map(|d| ToolCall::from_descriptor(d, interrupt_active))
                            .collect()
                    })
                    .unwrap_or_default();
                map.set(key(), message.clone(), tool_calls);
            }
            MessageKind::Tool => {
                let Some(tool_call_id) = message.tool_call_id.as_deref() else {
                    continue;
                };
                if !map.complete_tool_call(tool_call_id, message.text(), message.is_tool_error()) {
                    tracing::debug!(tool_call_id, "tool message has no matching tool call");
                }
            }
            MessageKind::Human => {
                map.set(key(), message.clone(), Vec::new());
            }
            MessageKind::System | MessageKind::Remove | MessageKind::Other => {}
        }
    }

    let mut previous: Option<MessageKind> = None;
    map.entries
        .into_iter()
        .map(|(kind, message, tool_calls)| {
            let show_avatar = previous != Some(kind);
            previous = Some(kind);
            ProcessedMessage {
                message,
                tool_calls,
                show_avatar,
            }
        })
        .collect()
}

/// A sub-agent invocation derived from a `task` tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAgent {
    /// Tool call id.
    pub id: String,
    /// Tool name (always `task`).
    pub name: String,
    /// Requested sub-agent type.
    pub sub_agent_name: String,
    /// Full task input.
    pub input: Value,
    /// Task output, once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Status of the underlying tool call.
    pub status: ToolCallStatus,
}

/// Sub-agents spawned by a set of tool calls.
#[must_use]
pub fn extract_sub_agents(tool_calls: &[ToolCall]) -> Vec<SubAgent> {
    tool_calls
        .iter()
        .filter_map(|call| {
            let sub_agent_name = call.subagent_type()?;
            Some(SubAgent {
                id: call.id.clone(),
                name: call.name.clone(),
                sub_agent_name: sub_agent_name.to_string(),
                input: call.args.clone(),
                output: call
                    .result
                    .as_ref()
                    .map(|result| serde_json::json!({ "result": result })),
                status: call.status,
            })
        })
        .collect()
}

/// Whether the last message is an AI message about to call the `task` tool.
///
/// Debug-mode continuation pauses after tools instead of before them in
/// that case, so the sub-agent gets to run.
#[must_use]
pub fn is_preparing_to_call_task_tool(messages: &[Message]) -> bool {
    messages.last().is_some_and(|last| {
        last.is_ai()
            && last
                .tool_calls
                .iter()
                .any(|call| call.name.as_deref() == Some(TASK_TOOL_NAME))
    })
}

/// Whether the last AI message called `task` and a `task` result followed.
#[must_use]
pub fn just_called_task_tool(messages: &[Message]) -> bool {
    let Some(position) = messages.iter().rposition(Message::is_ai) else {
        return false;
    };

    let called_task = messages[position]
        .tool_calls
        .iter()
        .any(|call| call.name.as_deref() == Some(TASK_TOOL_NAME));

    called_task
        && messages[position + 1..]
            .iter()
            .any(|m| m.is_tool() && m.name.as_deref() == Some(TASK_TOOL_NAME))
}
