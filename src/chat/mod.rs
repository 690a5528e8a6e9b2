//! Chat session: runs against a thread and the view state they produce.
//!
//! A [`ChatSession`] owns one thread at a time. Runs are streamed by a
//! background task that folds events into a shared [`ChatView`] and
//! notifies the UI over an unbounded channel.

mod view;

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use view::ChatView;

use crate::client::{Assistant, Checkpoint, Command, GraphApi, RunRequest, StreamEvent};
use crate::core::interrupt::HumanResponse;
use crate::core::message::Message;
use crate::core::reconcile::is_preparing_to_call_task_tool;
use crate::core::state::Files;
use crate::core::{Error, Result};

/// Recursion limit sent with user-initiated runs.
pub const RECURSION_LIMIT: u64 = 100;
/// Node debug-mode runs pause around.
const TOOLS_NODE: &str = "tools";
/// Node that ends the graph.
const END_NODE: &str = "__end__";
/// States fetched when looking for a restart checkpoint.
const HISTORY_LIMIT: u32 = 100;

/// Notification sent to the UI loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A thread was created for the first run.
    ThreadCreated(String),
    /// The view changed.
    Updated,
    /// The run finished (normally, by interrupt, or stopped).
    Finished,
    /// A run or request failed.
    Error(String),
}

/// Where a run pauses in debug mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pause {
    None,
    BeforeTools,
    AfterTools,
}

#[derive(Default)]
struct Shared {
    thread_id: Option<String>,
    view: ChatView,
    task: Option<JoinHandle<()>>,
    /// Bumped whenever a run starts or is superseded. A stream task only
    /// writes to the view while its generation is current.
    generation: u64,
}

impl Shared {
    /// Detach the current run from the view and return its id, if known.
    ///
    /// A task whose run id has not arrived yet keeps reading so it can
    /// cancel the run once the id shows up.
    fn supersede(&mut self) -> Option<String> {
        self.generation += 1;
        let run_id = self.view.run_id.take();
        if let (Some(task), Some(_)) = (self.task.take(), &run_id) {
            task.abort();
        }
        run_id
    }

    fn reset(&mut self, thread_id: Option<String>) {
        self.supersede();
        *self = Self {
            thread_id,
            generation: self.generation,
            ..Self::default()
        };
    }
}

/// A chat against one assistant.
pub struct ChatSession {
    client: Arc<dyn GraphApi>,
    assistant_id: String,
    assistant: Mutex<Option<Assistant>>,
    assistant_error: Mutex<Option<String>>,
    shared: Arc<Mutex<Shared>>,
    events: mpsc::UnboundedSender<ChatEvent>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("assistant_id", &self.assistant_id)
            .field("thread_id", &self.thread_id())
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    /// Create a session and the receiver for its notifications.
    #[must_use]
    pub fn new(
        client: Arc<dyn GraphApi>,
        assistant_id: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let session = Self {
            client,
            assistant_id: assistant_id.into(),
            assistant: Mutex::new(None),
            assistant_error: Mutex::new(None),
            shared: Arc::new(Mutex::new(Shared::default())),
            events,
        };
        (session, rx)
    }

    #[must_use]
    pub fn client(&self) -> Arc<dyn GraphApi> {
        Arc::clone(&self.client)
    }

    #[must_use]
    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    /// The loaded assistant, if any.
    #[must_use]
    pub fn assistant(&self) -> Option<Assistant> {
        self.assistant.lock().clone()
    }

    /// Why the assistant could not be loaded.
    #[must_use]
    pub fn assistant_error(&self) -> Option<String> {
        self.assistant_error.lock().clone()
    }

    /// Replace the assistant (e.g. after an optimizer update).
    pub fn set_assistant(&self, assistant: Assistant) {
        *self.assistant_error.lock() = None;
        *self.assistant.lock() = Some(assistant);
    }

    /// Fetch the assistant from the server.
    pub async fn refresh_assistant(&self) -> Result<Assistant> {
        match self.client.get_assistant(&self.assistant_id).await {
            Ok(assistant) => {
                self.set_assistant(assistant.clone());
                Ok(assistant)
            }
            Err(e) => {
                tracing::warn!(assistant_id = %self.assistant_id, error = %e, "failed to load assistant");
                *self.assistant.lock() = None;
                *self.assistant_error.lock() = Some(e.to_string());
                Err(e)
            }
        }
    }

    #[must_use]
    pub fn thread_id(&self) -> Option<String> {
        self.shared.lock().thread_id.clone()
    }

    /// A copy of the current view.
    #[must_use]
    pub fn view(&self) -> ChatView {
        self.shared.lock().view.clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.shared.lock().view.is_loading
    }

    /// Start a new conversation. Any running stream is dropped.
    pub fn new_thread(&self) {
        self.shared.lock().reset(None);
        self.notify(ChatEvent::Updated);
    }

    /// Switch to an existing thread and load its state.
    ///
    /// On failure the view is left empty (no todos or files) and the error
    /// is returned.
    pub async fn load_thread(&self, thread_id: &str) -> Result<()> {
        let generation = {
            let mut shared = self.shared.lock();
            shared.reset(Some(thread_id.to_string()));
            shared.generation
        };

        let result = self.client.get_thread_state(thread_id).await;
        let mut shared = self.shared.lock();
        if shared.generation != generation {
            tracing::debug!(thread_id, "thread switched while loading");
            return Ok(());
        }
        match result {
            Ok(state) => {
                shared
                    .view
                    .load(state.thread_values(), state.interrupt().cloned());
                drop(shared);
                self.notify(ChatEvent::Updated);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(thread_id, error = %e, "failed to load thread state");
                shared.view.error = Some(e.to_string());
                drop(shared);
                self.notify(ChatEvent::Error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Send a user message.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::validation("message is empty"));
        }

        let human = Message::human(text);
        let (mut optimistic, files) = {
            let shared = self.shared.lock();
            (shared.view.messages(), shared.view.values.files.clone())
        };
        optimistic.push(human.clone());

        let mut request = self.request(true, Pause::None);
        request.input = Some(json!({ "messages": [human], "files": files }));
        self.start_run(request, Some(optimistic)).await
    }

    /// Run a single step in debug mode.
    ///
    /// Without a checkpoint, `messages` are submitted and the run pauses
    /// before tools. With a checkpoint, the run restarts from it; a
    /// sub-agent rerun pauses after tools instead.
    pub async fn run_single_step(
        &self,
        messages: Vec<Message>,
        checkpoint: Option<Checkpoint>,
        is_rerunning_subagent: bool,
        optimistic: Option<Vec<Message>>,
    ) -> Result<()> {
        if let Some(checkpoint) = checkpoint {
            let pause = if is_rerunning_subagent {
                Pause::AfterTools
            } else {
                Pause::BeforeTools
            };
            let mut request = self.request(false, pause);
            request.checkpoint = Some(checkpoint);
            return self.start_run(request, optimistic).await;
        }

        let files = self.shared.lock().view.values.files.clone();
        let mut request = self.request(false, Pause::BeforeTools);
        request.input = Some(json!({ "messages": messages, "files": files }));
        self.start_run(request, optimistic).await
    }

    /// Continue a paused debug run.
    ///
    /// When the model is about to call the `task` tool the run pauses after
    /// tools so the sub-agent's work is visible.
    pub async fn continue_stream(&self, has_task_tool_call: bool) -> Result<()> {
        let pause = if has_task_tool_call {
            Pause::AfterTools
        } else {
            Pause::BeforeTools
        };
        self.start_run(self.request(true, pause), None).await
    }

    /// Continue, deciding the pause point from the current messages.
    pub async fn continue_debug(&self) -> Result<()> {
        let preparing = is_preparing_to_call_task_tool(&self.view().messages());
        self.continue_stream(preparing).await
    }

    /// Restart the run from just before `message_id` was produced.
    pub async fn restart_from_message(&self, message_id: &str, is_subagent: bool) -> Result<()> {
        let thread_id = self
            .thread_id()
            .ok_or_else(|| Error::validation("no thread to restart"))?;
        let history = self
            .client
            .get_thread_history(&thread_id, HISTORY_LIMIT)
            .await?;

        // History is newest first; the first state to contain the message
        // is the oldest one that does.
        let first_seen = history.iter().rev().find(|state| {
            state
                .thread_values()
                .messages
                .iter()
                .any(|m| m.id.as_deref() == Some(message_id))
        });
        let checkpoint = first_seen
            .and_then(|state| state.parent_checkpoint.clone())
            .ok_or_else(|| Error::validation("no checkpoint found for that message"))?;

        let optimistic: Vec<Message> = self
            .view()
            .messages()
            .into_iter()
            .take_while(|m| m.id.as_deref() != Some(message_id))
            .collect();

        self.run_single_step(Vec::new(), Some(checkpoint), is_subagent, Some(optimistic))
            .await
    }

    /// Resume an interrupted run with the user's responses.
    pub async fn send_human_response(&self, responses: Vec<HumanResponse>) -> Result<()> {
        let mut request = RunRequest::new(&self.assistant_id);
        request.command = Some(Command::resume(serde_json::to_value(responses)?));
        self.start_run(request, None).await
    }

    /// End the thread without answering the interrupt.
    pub async fn mark_resolved(&self) -> Result<()> {
        let mut request = RunRequest::new(&self.assistant_id);
        request.command = Some(Command::goto(END_NODE));
        self.start_run(request, None).await
    }

    /// Stop the current run and ask the server to cancel it.
    pub async fn stop(&self) -> Result<()> {
        let (thread_id, run_id) = {
            let mut shared = self.shared.lock();
            let run_id = shared.supersede();
            shared.view.end_run();
            (shared.thread_id.clone(), run_id)
        };
        self.notify(ChatEvent::Finished);

        if let (Some(thread_id), Some(run_id)) = (thread_id, run_id) {
            tracing::info!(thread_id = %thread_id, run_id = %run_id, "cancelling run");
            self.client.cancel_run(&thread_id, &run_id).await?;
        }
        Ok(())
    }

    /// Replace the thread's files.
    pub async fn update_files(&self, files: Files) -> Result<()> {
        let thread_id = self
            .thread_id()
            .ok_or_else(|| Error::validation("no thread to update"))?;
        self.client
            .update_thread_state(&thread_id, json!({ "files": files }), None)
            .await?;
        self.shared.lock().view.values.files = files;
        self.notify(ChatEvent::Updated);
        Ok(())
    }

    fn notify(&self, event: ChatEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("chat event receiver dropped");
        }
    }

    /// Assistant config for a run, optionally with the recursion limit.
    fn run_config(&self, with_recursion_limit: bool) -> Value {
        let mut config = self
            .assistant
            .lock()
            .as_ref()
            .and_then(|a| a.config.as_object().cloned())
            .unwrap_or_else(Map::new);
        if with_recursion_limit {
            config.insert("recursion_limit".to_string(), json!(RECURSION_LIMIT));
        }
        Value::Object(config)
    }

    fn request(&self, with_recursion_limit: bool, pause: Pause) -> RunRequest {
        let mut request = RunRequest::new(&self.assistant_id);
        request.config = Some(self.run_config(with_recursion_limit));
        match pause {
            Pause::None => {}
            Pause::BeforeTools => request.interrupt_before = Some(vec![TOOLS_NODE.to_string()]),
            Pause::AfterTools => request.interrupt_after = Some(vec![TOOLS_NODE.to_string()]),
        }
        request
    }

    async fn ensure_thread(&self, generation: u64) -> Result<String> {
        if let Some(id) = self.thread_id() {
            return Ok(id);
        }
        let thread = self.client.create_thread(None).await?;
        {
            let mut shared = self.shared.lock();
            if shared.generation != generation {
                return Err(Error::validation("run was superseded"));
            }
            shared.thread_id = Some(thread.thread_id.clone());
        }
        tracing::info!(thread_id = %thread.thread_id, "created thread");
        self.notify(ChatEvent::ThreadCreated(thread.thread_id.clone()));
        Ok(thread.thread_id)
    }

    async fn start_run(&self, request: RunRequest, optimistic: Option<Vec<Message>>) -> Result<()> {
        let generation = {
            let mut shared = self.shared.lock();
            if shared.view.is_loading {
                return Err(Error::validation("a run is already in progress"));
            }
            shared.generation += 1;
            shared.view.begin_run(optimistic);
            shared.generation
        };
        self.notify(ChatEvent::Updated);

        let connected = match self.ensure_thread(generation).await {
            Ok(thread_id) => self
                .client
                .stream_run(&thread_id, &request)
                .await
                .map(|stream| (thread_id, stream)),
            Err(e) => Err(e),
        };
        let (thread_id, stream) = match connected {
            Ok(connected) => connected,
            Err(e) => {
                let current = {
                    let mut shared = self.shared.lock();
                    let current = shared.generation == generation;
                    if current {
                        shared.view.optimistic = None;
                        shared.view.end_run();
                        shared.view.error = Some(e.to_string());
                    }
                    current
                };
                if current {
                    self.notify(ChatEvent::Error(e.to_string()));
                }
                return Err(e);
            }
        };

        let task = tokio::spawn(follow_run(
            Arc::clone(&self.shared),
            Arc::clone(&self.client),
            self.events.clone(),
            thread_id,
            stream,
            generation,
        ));

        let mut shared = self.shared.lock();
        if shared.generation == generation {
            shared.task = Some(task);
        }
        Ok(())
    }
}

/// Fold a run stream into the view until it ends or is superseded.
async fn follow_run(
    shared: Arc<Mutex<Shared>>,
    client: Arc<dyn GraphApi>,
    events: mpsc::UnboundedSender<ChatEvent>,
    thread_id: String,
    mut stream: crate::client::RunStream,
    generation: u64,
) {
    let mut run_id: Option<String> = None;
    let mut superseded = false;

    while let Some(event) = stream.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "run stream failed");
                let mut guard = shared.lock();
                if guard.generation == generation {
                    guard.view.error = Some(e.to_string());
                    drop(guard);
                    let _ = events.send(ChatEvent::Error(e.to_string()));
                }
                break;
            }
        };

        match &event {
            StreamEvent::Metadata { run_id: id } if !id.is_empty() => run_id = Some(id.clone()),
            _ => {}
        }

        {
            let mut guard = shared.lock();
            if guard.generation == generation {
                guard.view.apply(event);
            } else {
                superseded = true;
            }
        }

        if superseded {
            if let Some(run_id) = &run_id {
                tracing::info!(thread_id = %thread_id, run_id = %run_id, "cancelling superseded run");
                if let Err(e) = client.cancel_run(&thread_id, run_id).await {
                    tracing::warn!(run_id = %run_id, error = %e, "failed to cancel superseded run");
                }
                return;
            }
            continue;
        }
        let _ = events.send(ChatEvent::Updated);
    }

    let is_current = |shared: &Mutex<Shared>| shared.lock().generation == generation;
    if superseded || !is_current(&shared) {
        return;
    }

    // Interrupts are not always part of the streamed values.
    let needs_state = shared.lock().view.interrupt.is_none();
    if needs_state {
        match client.get_thread_state(&thread_id).await {
            Ok(state) => {
                if let Some(interrupt) = state.interrupt() {
                    let mut guard = shared.lock();
                    if guard.generation == generation {
                        guard.view.interrupt = Some(interrupt.clone());
                    }
                }
            }
            Err(e) => tracing::debug!(error = %e, "could not refresh thread state"),
        }
    }

    {
        let mut guard = shared.lock();
        if guard.generation != generation {
            return;
        }
        guard.view.end_run();
        guard.task = None;
    }
    let _ = events.send(ChatEvent::Finished);
}
