//! Configuration optimizer.
//!
//! Feedback about a conversation is sent to a separate optimizer graph
//! together with the assistant's current configuration. The optimizer
//! writes back a revised `config.yaml`, which becomes a proposal the user
//! can approve (updating the assistant) or reject.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::diff::{ConfigDiff, DiffFormat};
use super::error::{Error, Result};
use super::message::Message;
use super::state::ThreadValues;
use crate::client::{Assistant, AssistantUpdate, GraphApi, RunRequest, StreamEvent};

/// Assistant id of the optimizer graph.
pub const OPTIMIZER_ASSISTANT_ID: &str = "optimizer";
/// File carrying the configuration in both directions.
pub const CONFIG_FILE: &str = "config.yaml";
/// File carrying the conversation transcript.
pub const CONVERSATION_FILE: &str = "conversation.txt";

/// Wrap user feedback into the optimizer prompt.
#[must_use]
pub fn prepare_optimizer_message(feedback: &str) -> String {
    format!(
        "<feedback>\n{feedback}\n</feedback>\n\nUse the above feedback to update the config.json file.\n"
    )
}

/// Render a conversation as plain text for the optimizer.
#[must_use]
pub fn format_conversation_for_llm(messages: &[Message]) -> String {
    let mut blocks = Vec::new();

    for message in messages {
        let text = message.text();
        if message.is_human() {
            blocks.push(format!("Human: {text}"));
        } else if message.is_ai() {
            let mut block = format!("AI: {text}");
            for call in &message.tool_calls {
                let args = call.resolved_args();
                block.push_str(&format!("\nTool Call: {}({args})", call.resolved_name()));
            }
            blocks.push(block);
        } else if message.is_tool() {
            let name = message.name.as_deref().unwrap_or("tool");
            blocks.push(format!("Tool Result ({name}): {text}"));
        }
    }

    blocks.join("\n\n")
}

/// Review state of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
}

/// A configuration change suggested by the optimizer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigProposal {
    pub id: String,
    pub status: ProposalStatus,
    pub old_config: Value,
    pub new_config: Value,
}

impl ConfigProposal {
    /// Diff between the old and new configuration.
    pub fn diff(&self, format: DiffFormat) -> Result<ConfigDiff> {
        ConfigDiff::new(&self.old_config, &self.new_config, format)
    }
}

/// An entry of the optimizer panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OptimizerEntry {
    /// Feedback the user typed.
    User { content: String },
    /// A proposal produced by the optimizer.
    Optimizer(ConfigProposal),
}

/// Drives the optimizer graph and tracks proposals.
pub struct Optimizer {
    client: Arc<dyn GraphApi>,
    thread_id: Option<String>,
    entries: Vec<OptimizerEntry>,
    loading: bool,
}

impl std::fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Optimizer")
            .field("thread_id", &self.thread_id)
            .field("entries", &self.entries.len())
            .field("loading", &self.loading)
            .finish_non_exhaustive()
    }
}

impl Optimizer {
    /// Create an optimizer talking to the optimizer deployment.
    #[must_use]
    pub fn new(client: Arc<dyn GraphApi>) -> Self {
        Self {
            client,
            thread_id: None,
            entries: Vec::new(),
            loading: false,
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[OptimizerEntry] {
        &self.entries
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    /// Look up a proposal by id.
    #[must_use]
    pub fn proposal(&self, id: &str) -> Option<&ConfigProposal> {
        self.entries.iter().find_map(|entry| match entry {
            OptimizerEntry::Optimizer(p) if p.id == id => Some(p),
            _ => None,
        })
    }

    /// Proposals still awaiting review.
    pub fn pending_proposals(&self) -> impl Iterator<Item = &ConfigProposal> {
        self.entries.iter().filter_map(|entry| match entry {
            OptimizerEntry::Optimizer(p) if p.status == ProposalStatus::Pending => Some(p),
            _ => None,
        })
    }

    /// Forget the optimizer thread and every entry.
    pub fn clear(&mut self) {
        self.thread_id = None;
        self.entries.clear();
        self.loading = false;
    }

    /// Send feedback and wait for the optimizer's proposal.
    ///
    /// Blank feedback is ignored and yields `None`.
    pub async fn submit_feedback(
        &mut self,
        feedback: &str,
        assistant: &Assistant,
        conversation: &[Message],
    ) -> Result<Option<ConfigProposal>> {
        if feedback.trim().is_empty() || self.loading {
            return Ok(None);
        }

        self.entries.push(OptimizerEntry::User {
            content: feedback.to_string(),
        });
        self.loading = true;
        let result = self.run_optimizer(feedback, assistant, conversation).await;
        self.loading = false;

        let proposal = result?;
        self.entries
            .push(OptimizerEntry::Optimizer(proposal.clone()));
        Ok(Some(proposal))
    }

    async fn run_optimizer(
        &mut self,
        feedback: &str,
        assistant: &Assistant,
        conversation: &[Message],
    ) -> Result<ConfigProposal> {
        let old_config = assistant.configurable();
        let thread_id = match &self.thread_id {
            Some(id) => id.clone(),
            None => {
                let thread = self.client.create_thread(None).await?;
                self.thread_id = Some(thread.thread_id.clone());
                thread.thread_id
            }
        };

        let mut files = Map::new();
        files.insert(
            CONFIG_FILE.to_string(),
            Value::String(serde_yaml::to_string(&old_config)?),
        );
        files.insert(
            CONVERSATION_FILE.to_string(),
            Value::String(format_conversation_for_llm(conversation)),
        );

        let mut request = RunRequest::new(OPTIMIZER_ASSISTANT_ID);
        request.input = Some(json!({
            "messages": [Message::human(prepare_optimizer_message(feedback))],
            "files": files,
        }));

        tracing::info!(thread_id = %thread_id, "running optimizer");
        let mut stream = self.client.stream_run(&thread_id, &request).await?;
        while let Some(event) = stream.next().await {
            if let StreamEvent::Error { error, message } = event? {
                return Err(Error::Stream(format!("{error}: {message}")));
            }
        }

        let state = self.client.get_thread_state(&thread_id).await?;
        let values = ThreadValues::from_value(&state.values);
        let raw = values
            .files
            .get(CONFIG_FILE)
            .ok_or_else(|| Error::Parse(format!("optimizer did not return {CONFIG_FILE}")))?;
        let new_config: Value = serde_yaml::from_str(raw)?;

        Ok(ConfigProposal {
            id: uuid::Uuid::new_v4().to_string(),
            status: ProposalStatus::Pending,
            old_config,
            new_config,
        })
    }

    /// A proposal that has not been reviewed yet.
    fn pending(&self, id: &str) -> Result<&ConfigProposal> {
        let proposal = self
            .proposal(id)
            .ok_or_else(|| Error::validation(format!("no proposal with id {id}")))?;
        if proposal.status != ProposalStatus::Pending {
            return Err(Error::validation("proposal was already reviewed"));
        }
        Ok(proposal)
    }

    fn set_status(&mut self, id: &str, status: ProposalStatus) -> Result<()> {
        self.pending(id)?;
        for entry in &mut self.entries {
            match entry {
                OptimizerEntry::Optimizer(p) if p.id == id => p.status = status,
                _ => {}
            }
        }
        Ok(())
    }

    /// Apply a proposal to the assistant and return the refreshed assistant.
    ///
    /// `client` is the main deployment's client; the optimizer thread is
    /// reset so the next feedback starts fresh.
    pub async fn approve(
        &mut self,
        id: &str,
        client: &dyn GraphApi,
        assistant: &Assistant,
    ) -> Result<Assistant> {
        let new_config = self.pending(id)?.new_config.clone();
        let update = AssistantUpdate {
            metadata: Some(assistant.metadata.clone()),
            config: Some(json!({ "configurable": new_config })),
            ..AssistantUpdate::default()
        };
        client
            .update_assistant(&assistant.assistant_id, &update)
            .await?;

        self.set_status(id, ProposalStatus::Approved)?;
        self.thread_id = None;
        tracing::info!(assistant_id = %assistant.assistant_id, "applied optimizer proposal");

        client.get_assistant(&assistant.assistant_id).await
    }

    /// Reject a proposal. Nothing is sent.
    pub fn reject(&mut self, id: &str) -> Result<()> {
        self.set_status(id, ProposalStatus::Rejected)
    }
}
