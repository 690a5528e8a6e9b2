//! Agent thread state: todos and the virtual file system.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::message::Message;

/// Virtual files keyed by path.
pub type Files = BTreeMap<String, String>;

/// Progress of a todo item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TodoStatus {
    /// Get a string representation of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

/// An entry of the agent's todo list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub status: TodoStatus,
}

/// Todos split by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupedTodos {
    pub in_progress: Vec<TodoItem>,
    pub pending: Vec<TodoItem>,
    pub completed: Vec<TodoItem>,
}

impl GroupedTodos {
    /// The task currently being worked on.
    #[must_use]
    pub fn active(&self) -> Option<&TodoItem> {
        self.in_progress.first()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.in_progress.len() + self.pending.len() + self.completed.len()
    }
}

/// Group todos by status, keeping their relative order.
#[must_use]
pub fn group_todos(todos: &[TodoItem]) -> GroupedTodos {
    let mut grouped = GroupedTodos::default();
    for todo in todos {
        let bucket = match todo.status {
            TodoStatus::InProgress => &mut grouped.in_progress,
            TodoStatus::Pending => &mut grouped.pending,
            TodoStatus::Completed => &mut grouped.completed,
        };
        bucket.push(todo.clone());
    }
    grouped
}

/// Decode a field, falling back to its default on malformed input.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + DeserializeOwned,
{
    let raw = Value::deserialize(deserializer)?;
    if raw.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "ignoring malformed thread state field");
        T::default()
    }))
}

fn lenient_files<'de, D>(deserializer: D) -> Result<Files, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(decode_files(&raw))
}

/// Decode a files map.
///
/// Values are either plain strings or `{ "content": [lines...] }` records;
/// the latter are joined with newlines. Other values are skipped.
#[must_use]
pub fn decode_files(raw: &Value) -> Files {
    let Value::Object(map) = raw else {
        return Files::new();
    };

    map.iter()
        .filter_map(|(path, value)| {
            let contents = match value {
                Value::String(s) => s.clone(),
                Value::Object(record) => match record.get("content") {
                    Some(Value::Array(lines)) => lines
                        .iter()
                        .map(|line| line.as_str().unwrap_or_default())
                        .collect::<Vec<_>>()
                        .join("\n"),
                    Some(Value::String(s)) => s.clone(),
                    _ => return None,
                },
                _ => {
                    tracing::debug!(path, "skipping file with unsupported contents");
                    return None;
                }
            };
            Some((path.clone(), contents))
        })
        .collect()
}

/// Values of a deep agent thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadValues {
    #[serde(default, deserialize_with = "lenient")]
    pub messages: Vec<Message>,
    #[serde(default, deserialize_with = "lenient")]
    pub todos: Vec<TodoItem>,
    #[serde(default, deserialize_with = "lenient_files")]
    pub files: Files,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ThreadValues {
    /// Decode thread values, degrading to empty state on failure.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        if value.is_null() {
            return Self::default();
        }
        serde_json::from_value(value.clone()).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "thread values could not be decoded");
            Self::default()
        })
    }
}

/// State written by one graph node, as carried by an `updates` stream event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeUpdate {
    pub node: String,
    pub todos: Option<Vec<TodoItem>>,
    pub files: Option<Files>,
}

/// Extract todo/file updates from an `updates` event payload (`{node: partial_state}`).
#[must_use]
pub fn node_updates(data: &Value) -> Vec<NodeUpdate> {
    let Value::Object(nodes) = data else {
        return Vec::new();
    };

    nodes
        .iter()
        .filter_map(|(node, state)| {
            let state = state.as_object()?;
            let todos = state.get("todos").and_then(|raw| {
                serde_json::from_value(raw.clone())
                    .map_err(|e| tracing::debug!(node, error = %e, "bad todos in update"))
                    .ok()
            });
            let files = state.get("files").map(decode_files);
            Some(NodeUpdate {
                node: node.clone(),
                todos,
                files,
            })
        })
        .collect()
}
