//! Thread history summaries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::message::{extract_string_from_message_content, Message};
use crate::client::{Thread, ThreadSearch, ThreadStatus};

/// Maximum characters shown for titles and snippets.
pub const SUMMARY_MAX_CHARS: usize = 80;

/// Graph id used to find deep agent threads when no assistant is selected.
pub const DEEP_AGENT_GRAPH_ID: &str = "deep_agent";

/// Truncate to `max_chars` characters, appending `...` when anything was cut.
#[must_use]
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// One line of the thread history list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadSummary {
    pub id: String,
    pub title: String,
    pub snippet: String,
    pub status: ThreadStatus,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Age bucket used to group the history list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadAge {
    Today,
    Yesterday,
    Week,
    Older,
}

impl ThreadAge {
    /// Bucket for an update time relative to `now`.
    #[must_use]
    pub fn of(updated_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let Some(updated_at) = updated_at else {
            return Self::Older;
        };
        match (now - updated_at).num_days() {
            i64::MIN..=0 => Self::Today,
            1 => Self::Yesterday,
            2..=6 => Self::Week,
            _ => Self::Older,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Today => "Today",
            Self::Yesterday => "Yesterday",
            Self::Week => "This week",
            Self::Older => "Older",
        }
    }
}

/// Search parameters for a thread history listing.
///
/// Threads of a specific assistant are matched by `assistant_id` metadata,
/// otherwise every deep agent thread is listed.
#[must_use]
pub fn history_query(assistant_id: Option<&str>) -> ThreadSearch {
    let mut metadata = Map::new();
    match assistant_id {
        Some(id) => metadata.insert("assistant_id".to_string(), Value::String(id.to_string())),
        None => metadata.insert(
            "graph_id".to_string(),
            Value::String(DEEP_AGENT_GRAPH_ID.to_string()),
        ),
    };
    ThreadSearch {
        metadata: Some(metadata),
        ..ThreadSearch::default()
    }
}

/// Summarize a thread for the history list.
///
/// The title comes from the last human message and the snippet from the
/// last message of any kind; `default_title` / `default_snippet` fill in
/// when a thread has no such messages.
#[must_use]
pub fn summarize_thread(thread: &Thread, default_title: &str, default_snippet: &str) -> ThreadSummary {
    let messages = thread.thread_values().messages;

    let text_of = |message: &Message| {
        truncate_text(
            &extract_string_from_message_content(&message.content),
            SUMMARY_MAX_CHARS,
        )
    };

    let title = messages
        .iter()
        .rev()
        .find(|m| m.is_human())
        .map(text_of)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| default_title.to_string());

    let snippet = messages
        .last()
        .map(text_of)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default_snippet.to_string());

    ThreadSummary {
        id: thread.thread_id.clone(),
        title,
        snippet,
        status: thread.status,
        updated_at: thread.last_activity(),
    }
}

/// Summarize threads, most recently updated first.
#[must_use]
pub fn summarize_threads(threads: &[Thread], default_title: &str) -> Vec<ThreadSummary> {
    let mut summaries: Vec<_> = threads
        .iter()
        .map(|t| summarize_thread(t, default_title, "No description"))
        .collect();
    summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    summaries
}
