//! In-memory graph deployment shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::{Notify, mpsc};
use tokio::time::timeout;

use deep_agent_chat::chat::ChatEvent;
use deep_agent_chat::client::{
    Assistant, AssistantSearch, AssistantUpdate, GraphApi, RunRequest, RunStream, StreamEvent,
    Thread, ThreadSearch, ThreadState,
};
use deep_agent_chat::core::{Error, Result};

/// Script for one streamed run.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRun {
    pub events: Vec<StreamEvent>,
    /// Keep the stream open after the events, like a long-running graph.
    pub hang: bool,
}

impl ScriptedRun {
    pub fn finishing(events: Vec<StreamEvent>) -> Self {
        Self {
            events,
            hang: false,
        }
    }

    pub fn hanging(events: Vec<StreamEvent>) -> Self {
        Self { events, hang: true }
    }
}

/// Records every request and answers from canned data.
#[derive(Default)]
pub struct MockGraph {
    pub state: Mutex<ThreadState>,
    pub history: Mutex<Vec<ThreadState>>,
    pub assistant: Mutex<Assistant>,
    pub threads: Mutex<Vec<Thread>>,
    pub scripts: Mutex<VecDeque<ScriptedRun>>,
    pub fail_stream: Mutex<Option<Error>>,
    pub fail_update: Mutex<Option<Error>>,
    /// When set, `stream_run` waits for a permit before connecting.
    pub gate: Mutex<Option<Arc<Notify>>>,

    pub created: Mutex<Vec<String>>,
    pub runs: Mutex<Vec<(String, RunRequest)>>,
    pub cancelled: Mutex<Vec<(String, String)>>,
    pub state_updates: Mutex<Vec<(String, Value)>>,
    pub assistant_updates: Mutex<Vec<(String, AssistantUpdate)>>,
    pub searches: Mutex<Vec<ThreadSearch>>,
}

impl MockGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(self, state: Value) -> Self {
        *self.state.lock() = serde_json::from_value(state).expect("valid thread state");
        self
    }

    pub fn with_history(self, history: Value) -> Self {
        *self.history.lock() = serde_json::from_value(history).expect("valid history");
        self
    }

    pub fn with_assistant(self, assistant: Value) -> Self {
        *self.assistant.lock() = serde_json::from_value(assistant).expect("valid assistant");
        self
    }

    pub fn with_threads(self, threads: Value) -> Self {
        *self.threads.lock() = serde_json::from_value(threads).expect("valid threads");
        self
    }

    pub fn push_run(&self, run: ScriptedRun) {
        self.scripts.lock().push_back(run);
    }

    /// The most recent run request.
    pub fn last_run(&self) -> RunRequest {
        self.runs.lock().last().expect("a run was started").1.clone()
    }
}

#[async_trait]
impl GraphApi for MockGraph {
    async fn create_thread(&self, metadata: Option<Map<String, Value>>) -> Result<Thread> {
        let mut created = self.created.lock();
        let thread_id = format!("thread-{}", created.len() + 1);
        created.push(thread_id.clone());
        Ok(Thread {
            thread_id,
            created_at: None,
            updated_at: None,
            status: Default::default(),
            metadata: metadata.unwrap_or_default(),
            values: Value::Null,
        })
    }

    async fn search_threads(&self, query: &ThreadSearch) -> Result<Vec<Thread>> {
        self.searches.lock().push(query.clone());
        let threads = self.threads.lock();
        Ok(threads
            .iter()
            .take(query.limit as usize)
            .cloned()
            .collect())
    }

    async fn get_thread_state(&self, thread_id: &str) -> Result<ThreadState> {
        if thread_id == "missing" {
            return Err(Error::Api {
                status: 404,
                message: "thread not found".to_string(),
            });
        }
        Ok(self.state.lock().clone())
    }

    async fn get_thread_history(&self, _thread_id: &str, limit: u32) -> Result<Vec<ThreadState>> {
        Ok(self
            .history
            .lock()
            .iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn update_thread_state(
        &self,
        thread_id: &str,
        values: Value,
        _as_node: Option<&str>,
    ) -> Result<()> {
        self.state_updates
            .lock()
            .push((thread_id.to_string(), values));
        Ok(())
    }

    async fn get_assistant(&self, assistant_id: &str) -> Result<Assistant> {
        let assistant = self.assistant.lock().clone();
        if assistant.assistant_id == assistant_id {
            Ok(assistant)
        } else {
            Err(Error::Api {
                status: 404,
                message: format!("assistant {assistant_id} not found"),
            })
        }
    }

    async fn update_assistant(
        &self,
        assistant_id: &str,
        update: &AssistantUpdate,
    ) -> Result<Assistant> {
        self.assistant_updates
            .lock()
            .push((assistant_id.to_string(), update.clone()));
        if let Some(err) = self.fail_update.lock().take() {
            return Err(err);
        }

        let mut assistant = self.assistant.lock();
        if let Some(config) = &update.config {
            assistant.config = config.clone();
        }
        if let Some(metadata) = &update.metadata {
            assistant.metadata = metadata.clone();
        }
        assistant.version = Some(assistant.version.unwrap_or(1) + 1);
        Ok(assistant.clone())
    }

    async fn search_assistants(&self, _query: &AssistantSearch) -> Result<Vec<Assistant>> {
        Ok(vec![self.assistant.lock().clone()])
    }

    async fn stream_run(&self, thread_id: &str, request: &RunRequest) -> Result<RunStream> {
        if let Some(err) = self.fail_stream.lock().take() {
            return Err(err);
        }
        self.runs
            .lock()
            .push((thread_id.to_string(), request.clone()));

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let run = self.scripts.lock().pop_front().unwrap_or_default();
        let events = futures::stream::iter(run.events.into_iter().map(Ok));
        let stream: RunStream = if run.hang {
            Box::pin(events.chain(futures::stream::pending()))
        } else {
            Box::pin(events)
        };
        Ok(stream)
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()> {
        self.cancelled
            .lock()
            .push((thread_id.to_string(), run_id.to_string()));
        Ok(())
    }
}

/// Wait for the next event matching `pred`, failing after two seconds.
pub async fn wait_for(
    events: &mut mpsc::UnboundedReceiver<ChatEvent>,
    pred: impl Fn(&ChatEvent) -> bool,
) -> ChatEvent {
    timeout(Duration::from_secs(2), async {
        loop {
            let event = events.recv().await.expect("session dropped");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for chat event")
}

pub async fn wait_finished(events: &mut mpsc::UnboundedReceiver<ChatEvent>) {
    wait_for(events, |e| *e == ChatEvent::Finished).await;
}
