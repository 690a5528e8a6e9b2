//! Folding run stream events into the chat view state.

use serde::Serialize;
use serde_json::Value;

use crate::client::StreamEvent;
use crate::core::interrupt::Interrupt;
use crate::core::message::{Message, MessageContent};
use crate::core::reconcile::{process_messages, ProcessedMessage};
use crate::core::state::{node_updates, Files, ThreadValues, TodoItem};

/// Key LangGraph uses for pending interrupts in values and updates.
const INTERRUPT_KEY: &str = "__interrupt__";

/// Everything the chat panels render.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatView {
    /// Last confirmed thread values.
    pub values: ThreadValues,
    /// Messages shown until the next confirmed values arrive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimistic: Option<Vec<Message>>,
    /// Messages still being streamed token by token.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub streaming: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<Interrupt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub is_loading: bool,
}

impl ChatView {
    /// Messages to display: the optimistic overlay (or confirmed messages)
    /// followed by any messages still streaming.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        let mut messages = self
            .optimistic
            .clone()
            .unwrap_or_else(|| self.values.messages.clone());

        for message in &self.streaming {
            let known = message.id.is_some()
                && messages.iter().any(|m| m.id == message.id);
            if !known {
                messages.push(message.clone());
            }
        }
        messages
    }

    /// Reconciled messages with tool calls attached.
    #[must_use]
    pub fn processed_messages(&self) -> Vec<ProcessedMessage> {
        process_messages(&self.messages(), self.interrupt.is_some())
    }

    #[must_use]
    pub fn todos(&self) -> &[TodoItem] {
        &self.values.todos
    }

    #[must_use]
    pub const fn files(&self) -> &Files {
        &self.values.files
    }

    /// Reset to a freshly loaded thread state.
    pub fn load(&mut self, values: ThreadValues, interrupt: Option<Interrupt>) {
        *self = Self {
            values,
            interrupt,
            ..Self::default()
        };
    }

    /// Prepare for a new run.
    pub fn begin_run(&mut self, optimistic: Option<Vec<Message>>) {
        self.optimistic = optimistic;
        self.streaming.clear();
        self.interrupt = None;
        self.error = None;
        self.run_id = None;
        self.is_loading = true;
    }

    /// Mark the run finished.
    pub fn end_run(&mut self) {
        self.is_loading = false;
        self.streaming.clear();
    }

    /// Apply one stream event.
    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Metadata { run_id } => {
                if !run_id.is_empty() {
                    self.run_id = Some(run_id);
                }
            }
            StreamEvent::Values(data) => self.apply_values(&data),
            StreamEvent::Updates(data) => self.apply_updates(&data),
            StreamEvent::Messages { event, data } => self.apply_messages(&event, data),
            StreamEvent::Error { error, message } => {
                tracing::warn!(error = %error, message = %message, "run reported an error");
                self.error = Some(format!("{error}: {message}"));
            }
            StreamEvent::End => self.end_run(),
            StreamEvent::Other { event, .. } => {
                tracing::trace!(event = %event, "ignoring stream event");
            }
        }
    }

    fn take_interrupt(&mut self, raw: &Value) {
        let first = match raw {
            Value::Array(items) => items.first().cloned(),
            Value::Object(_) => Some(raw.clone()),
            _ => None,
        };
        if let Some(first) = first {
            match serde_json::from_value::<Interrupt>(first) {
                Ok(interrupt) => self.interrupt = Some(interrupt),
                Err(e) => tracing::warn!(error = %e, "malformed interrupt"),
            }
        }
    }

    fn apply_values(&mut self, data: &Value) {
        let Value::Object(map) = data else {
            return;
        };

        if let Some(raw) = map.get(INTERRUPT_KEY) {
            self.take_interrupt(raw);
        }

        // An interrupt-only chunk must not wipe the confirmed state.
        if map.keys().all(|k| k == INTERRUPT_KEY) {
            return;
        }

        self.values = ThreadValues::from_value(data);
        self.optimistic = None;
        self.streaming.clear();
    }

    fn apply_updates(&mut self, data: &Value) {
        if let Some(raw) = data.get(INTERRUPT_KEY) {
            self.take_interrupt(raw);
        }

        for update in node_updates(data) {
            if let Some(todos) = update.todos {
                tracing::debug!(node = %update.node, count = todos.len(), "todos updated");
                self.values.todos = todos;
            }
            if let Some(files) = update.files {
                tracing::debug!(node = %update.node, count = files.len(), "files updated");
                self.values.files = files;
            }
        }
    }

    fn apply_messages(&mut self, event: &str, data: Value) {
        match event {
            // `[chunk, metadata]` pairs
            "messages" => {
                let chunk = match data {
                    Value::Array(mut pair) if !pair.is_empty() => pair.swap_remove(0),
                    other => other,
                };
                match serde_json::from_value::<Message>(chunk) {
                    Ok(chunk) => self.merge_chunk(chunk),
                    Err(e) => tracing::debug!(error = %e, "unreadable message chunk"),
                }
            }
            // Whole messages so far
            "messages/partial" | "messages/complete" => {
                let Ok(messages) = serde_json::from_value::<Vec<Message>>(data) else {
                    return;
                };
                for message in messages {
                    self.upsert_streaming(message);
                }
            }
            _ => {}
        }
    }

    fn upsert_streaming(&mut self, message: Message) {
        match self
            .streaming
            .iter_mut()
            .find(|m| m.id.is_some() && m.id == message.id)
        {
            Some(existing) => *existing = message,
            None => self.streaming.push(message),
        }
    }

    fn merge_chunk(&mut self, chunk: Message) {
        if !chunk.is_ai() {
            self.upsert_streaming(chunk);
            return;
        }

        let Some(existing) = self
            .streaming
            .iter_mut()
            .find(|m| m.id.is_some() && m.id == chunk.id)
        else {
            self.streaming.push(chunk);
            return;
        };

        match (&mut existing.content, chunk.content) {
            (MessageContent::Text(text), MessageContent::Text(delta)) => text.push_str(&delta),
            (MessageContent::Blocks(blocks), MessageContent::Blocks(more)) => blocks.extend(more),
            (content, MessageContent::Text(delta)) if !delta.is_empty() => {
                let mut text = crate::core::message::extract_string_from_message_content(content);
                text.push_str(&delta);
                *content = MessageContent::Text(text);
            }
            _ => {}
        }

        for call in chunk.tool_calls {
            let named = call.name.as_deref().is_some_and(|n| !n.is_empty());
            let seen = call.id.is_some() && existing.tool_calls.iter().any(|c| c.id == call.id);
            if named && !seen {
                existing.tool_calls.push(call);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(messages: Value) -> StreamEvent {
        StreamEvent::Values(json!({ "messages": messages }))
    }

    #[test]
    fn optimistic_overlay_until_values_arrive() {
        let mut view = ChatView::default();
        let human = Message::human("hello").with_id("h1");
        view.begin_run(Some(vec![human]));
        assert_eq!(view.messages().len(), 1);
        assert!(view.is_loading);

        view.apply(values(json!([
            {"type": "human", "id": "h1", "content": "hello"},
            {"type": "ai", "id": "a1", "content": "hi there"}
        ])));
        assert!(view.optimistic.is_none());
        assert_eq!(view.messages().len(), 2);
    }

    #[test]
    fn interrupt_only_values_keep_messages() {
        let mut view = ChatView::default();
        view.apply(values(json!([{"type": "human", "id": "h1", "content": "go"}])));
        view.apply(StreamEvent::Values(json!({
            "__interrupt__": [{"value": [{"action_request": {"action": "write_file", "args": {}}}]}]
        })));
        assert_eq!(view.messages().len(), 1);
        assert!(view.interrupt.is_some());
    }

    #[test]
    fn begin_run_clears_interrupt() {
        let mut view = ChatView::default();
        view.apply(StreamEvent::Updates(json!({"__interrupt__": [{"value": []}]})));
        assert!(view.interrupt.is_some());
        view.begin_run(None);
        assert!(view.interrupt.is_none());
    }

    #[test]
    fn updates_replace_todos_and_files() {
        let mut view = ChatView::default();
        view.apply(StreamEvent::Updates(json!({
            "agent": {"todos": [{"content": "plan", "status": "pending"}]},
            "tools": {"files": {"/a": "x"}}
        })));
        assert_eq!(view.todos().len(), 1);
        assert_eq!(view.files()["/a"], "x");
    }

    #[test]
    fn message_chunks_accumulate() {
        let mut view = ChatView::default();
        for delta in ["Hel", "lo"] {
            view.apply(StreamEvent::Messages {
                event: "messages".to_string(),
                data: json!([{"type": "AIMessageChunk", "id": "a1", "content": delta}, {}]),
            });
        }
        let messages = view.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text(), "Hello");

        view.apply(values(json!([{"type": "ai", "id": "a1", "content": "Hello!"}])));
        assert!(view.streaming.is_empty());
        assert_eq!(view.messages()[0].text(), "Hello!");
    }

    #[test]
    fn streaming_message_already_confirmed_is_not_duplicated() {
        let mut view = ChatView::default();
        view.apply(values(json!([{"type": "ai", "id": "a1", "content": "done"}])));
        view.apply(StreamEvent::Messages {
            event: "messages/partial".to_string(),
            data: json!([{"type": "ai", "id": "a1", "content": "do"}]),
        });
        assert_eq!(view.messages().len(), 1);
    }

    #[test]
    fn metadata_and_errors() {
        let mut view = ChatView::default();
        view.begin_run(None);
        view.apply(StreamEvent::Metadata {
            run_id: "r1".to_string(),
        });
        assert_eq!(view.run_id.as_deref(), Some("r1"));
        view.apply(StreamEvent::Error {
            error: "GraphRecursionError".to_string(),
            message: "limit".to_string(),
        });
        assert_eq!(view.error.as_deref(), Some("GraphRecursionError: limit"));
        view.apply(StreamEvent::End);
        assert!(!view.is_loading);
    }

    #[test]
    fn processed_messages_mark_interrupted_calls() {
        let mut view = ChatView::default();
        view.apply(values(json!([{
            "type": "ai", "id": "a1", "content": "",
            "tool_calls": [{"id": "t1", "name": "write_file", "args": {}}]
        }])));
        view.apply(StreamEvent::Values(json!({"__interrupt__": [{"value": []}]})));
        let processed = view.processed_messages();
        assert_eq!(
            processed[0].tool_calls[0].status,
            crate::core::reconcile::ToolCallStatus::Interrupted
        );
    }
}
