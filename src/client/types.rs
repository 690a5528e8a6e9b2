//! Wire types of the graph API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::interrupt::Interrupt;
use crate::core::state::ThreadValues;

/// Execution status of a thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    #[default]
    Idle,
    Busy,
    Interrupted,
    Error,
    #[serde(other)]
    Unknown,
}

impl ThreadStatus {
    /// Get a string representation of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Interrupted => "interrupted",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the thread is waiting on a human.
    #[must_use]
    pub const fn needs_attention(self) -> bool {
        matches!(self, Self::Interrupted | Self::Error)
    }
}

/// A conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: ThreadStatus,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub values: Value,
}

impl Thread {
    /// Last update time, falling back to creation time.
    #[must_use]
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.updated_at.or(self.created_at)
    }

    /// Decoded values.
    #[must_use]
    pub fn thread_values(&self) -> ThreadValues {
        ThreadValues::from_value(&self.values)
    }
}

/// Pointer to a saved graph checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub checkpoint_ns: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,
}

/// A pending task in a thread state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadTask {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub interrupts: Vec<Interrupt>,
}

/// Snapshot of a thread at one checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadState {
    #[serde(default)]
    pub values: Value,
    #[serde(default)]
    pub next: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Checkpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_checkpoint: Option<Checkpoint>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub tasks: Vec<ThreadTask>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl ThreadState {
    /// Decoded values.
    #[must_use]
    pub fn thread_values(&self) -> ThreadValues {
        ThreadValues::from_value(&self.values)
    }

    /// The first interrupt raised by any pending task.
    #[must_use]
    pub fn interrupt(&self) -> Option<&Interrupt> {
        self.tasks.iter().flat_map(|task| &task.interrupts).next()
    }
}

/// A deployed assistant (graph plus configuration).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assistant {
    pub assistant_id: String,
    #[serde(default)]
    pub graph_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Assistant {
    /// The `config.configurable` object, or an empty object.
    #[must_use]
    pub fn configurable(&self) -> Value {
        self.config
            .get("configurable")
            .filter(|v| v.is_object())
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    /// Description from metadata, if set.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.metadata.get("description").and_then(Value::as_str)
    }
}

/// Body of `PATCH /assistants/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssistantUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Sort order for searches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Body of `POST /threads/search`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadSearch {
    pub limit: u32,
    pub offset: u32,
    pub sort_by: String,
    pub sort_order: SortOrder,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ThreadStatus>,
}

impl Default for ThreadSearch {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
            sort_by: "created_at".to_string(),
            sort_order: SortOrder::Desc,
            metadata: None,
            status: None,
        }
    }
}

/// Body of `POST /assistants/search`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantSearch {
    pub limit: u32,
    pub offset: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Default for AssistantSearch {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
            graph_id: None,
            metadata: None,
        }
    }
}

/// Graph command used to resume or redirect an interrupted run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Command {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goto: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<Value>,
}

impl Command {
    /// Resume the run with a value.
    #[must_use]
    pub fn resume(value: Value) -> Self {
        Self {
            resume: Some(value),
            ..Self::default()
        }
    }

    /// Jump to a node.
    #[must_use]
    pub fn goto(node: impl Into<String>) -> Self {
        Self {
            goto: Some(node.into()),
            ..Self::default()
        }
    }
}

/// Body of `POST /threads/{id}/runs/stream`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRequest {
    pub assistant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Command>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    pub stream_mode: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupt_before: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupt_after: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Checkpoint>,
}

impl RunRequest {
    /// A request streaming values, updates and message chunks.
    #[must_use]
    pub fn new(assistant_id: impl Into<String>) -> Self {
        Self {
            assistant_id: assistant_id.into(),
            input: None,
            command: None,
            config: None,
            stream_mode: vec![
                "values".to_string(),
                "updates".to_string(),
                "messages-tuple".to_string(),
            ],
            interrupt_before: None,
            interrupt_after: None,
            checkpoint: None,
        }
    }
}

/// One event of a run stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Run metadata; carries the run id.
    Metadata { run_id: String },
    /// Full state values after a step.
    Values(Value),
    /// Per-node partial state.
    Updates(Value),
    /// Message chunks (`messages`, `messages/partial`, ...).
    Messages { event: String, data: Value },
    /// The server reported an error.
    Error { error: String, message: String },
    /// Stream finished.
    End,
    /// Anything else.
    Other { event: String, data: Value },
}

impl StreamEvent {
    /// Build an event from its SSE name and decoded data.
    #[must_use]
    pub fn from_parts(event: &str, data: Value) -> Self {
        match event {
            "metadata" => Self::Metadata {
                run_id: data
                    .get("run_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            "values" => Self::Values(data),
            "updates" => Self::Updates(data),
            "error" => Self::Error {
                error: data
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("Error")
                    .to_string(),
                message: data
                    .get("message")
                    .and_then(Value::as_str)
                    .map_or_else(|| data.to_string(), ToString::to_string),
            },
            "end" => Self::End,
            name if name.starts_with("messages") => Self::Messages {
                event: name.to_string(),
                data,
            },
            name => Self::Other {
                event: name.to_string(),
                data,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn thread_decodes_with_dates() {
        let thread: Thread = serde_json::from_value(json!({
            "thread_id": "t1",
            "created_at": "2025-03-01T10:00:00+00:00",
            "status": "interrupted",
            "values": {"messages": []}
        }))
        .unwrap();
        assert_eq!(thread.status, ThreadStatus::Interrupted);
        assert!(thread.status.needs_attention());
        assert_eq!(thread.last_activity(), thread.created_at);
    }

    #[test]
    fn unknown_thread_status() {
        let thread: Thread =
            serde_json::from_value(json!({"thread_id": "t", "status": "paused"})).unwrap();
        assert_eq!(thread.status, ThreadStatus::Unknown);
    }

    #[test]
    fn state_exposes_first_interrupt() {
        let state: ThreadState = serde_json::from_value(json!({
            "values": {},
            "next": ["tools"],
            "tasks": [
                {"id": "a", "name": "agent", "interrupts": []},
                {"id": "b", "name": "tools", "interrupts": [{"value": [], "id": "i1"}]}
            ]
        }))
        .unwrap();
        assert_eq!(state.interrupt().and_then(|i| i.id.as_deref()), Some("i1"));
    }

    #[test]
    fn assistant_configurable_defaults_to_empty() {
        let assistant = Assistant {
            assistant_id: "a".to_string(),
            ..Default::default()
        };
        assert_eq!(assistant.configurable(), json!({}));
    }

    #[test]
    fn run_request_omits_unset_fields() {
        let mut request = RunRequest::new("agent");
        request.command = Some(Command::goto("__end__"));
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["command"], json!({"goto": "__end__"}));
        assert!(body.get("input").is_none());
        assert!(body.get("interrupt_before").is_none());
    }

    #[test]
    fn stream_event_names() {
        assert_eq!(
            StreamEvent::from_parts("metadata", json!({"run_id": "r1"})),
            StreamEvent::Metadata {
                run_id: "r1".to_string()
            }
        );
        assert!(matches!(
            StreamEvent::from_parts("messages/partial", json!([])),
            StreamEvent::Messages { .. }
        ));
        assert!(matches!(
            StreamEvent::from_parts("error", json!({"error": "ValueError", "message": "bad"})),
            StreamEvent::Error { ref message, .. } if message == "bad"
        ));
    }
}
