//! Optimizer proposals against an in-memory deployment.

mod common;

use std::sync::Arc;

use serde_json::json;

use common::MockGraph;
use deep_agent_chat::client::Assistant;
use deep_agent_chat::core::Error;
use deep_agent_chat::core::message::Message;
use deep_agent_chat::core::optimizer::{
    CONFIG_FILE, CONVERSATION_FILE, OPTIMIZER_ASSISTANT_ID, Optimizer, OptimizerEntry,
    ProposalStatus,
};

fn assistant() -> Assistant {
    serde_json::from_value(json!({
        "assistant_id": "deep-agent",
        "graph_id": "research",
        "name": "Research",
        "config": {"configurable": {"model": "small", "max_steps": 5}},
        "metadata": {"description": "Finds sources"}
    }))
    .unwrap()
}

/// Optimizer deployment whose graph rewrites the config file.
fn optimizer_graph() -> Arc<MockGraph> {
    Arc::new(MockGraph::new().with_state(json!({
        "values": {"files": {
            "config.yaml": "model: large\nmax_steps: 5\n"
        }}
    })))
}

#[tokio::test]
async fn feedback_produces_a_pending_proposal() {
    let graph = optimizer_graph();
    let mut optimizer = Optimizer::new(graph.clone());
    let conversation = [Message::human("summarize this paper")];

    let proposal = optimizer
        .submit_feedback("use a bigger model", &assistant(), &conversation)
        .await
        .unwrap()
        .expect("a proposal");

    assert_eq!(proposal.status, ProposalStatus::Pending);
    assert_eq!(proposal.old_config, json!({"model": "small", "max_steps": 5}));
    assert_eq!(proposal.new_config, json!({"model": "large", "max_steps": 5}));
    assert_eq!(optimizer.thread_id(), Some("thread-1"));
    assert_eq!(optimizer.entries().len(), 2);
    assert!(matches!(optimizer.entries()[0], OptimizerEntry::User { .. }));

    let (thread_id, request) = graph.runs.lock()[0].clone();
    assert_eq!(thread_id, "thread-1");
    assert_eq!(request.assistant_id, OPTIMIZER_ASSISTANT_ID);
    let input = request.input.unwrap();
    assert!(
        input["messages"][0]["content"]
            .as_str()
            .unwrap()
            .contains("use a bigger model")
    );
    let sent_config: serde_json::Value =
        serde_yaml::from_str(input["files"][CONFIG_FILE].as_str().unwrap()).unwrap();
    assert_eq!(sent_config, proposal.old_config);
    assert_eq!(
        input["files"][CONVERSATION_FILE],
        "Human: summarize this paper"
    );
}

#[tokio::test]
async fn follow_up_feedback_reuses_the_optimizer_thread() {
    let graph = optimizer_graph();
    let mut optimizer = Optimizer::new(graph.clone());

    optimizer
        .submit_feedback("first", &assistant(), &[])
        .await
        .unwrap();
    optimizer
        .submit_feedback("second", &assistant(), &[])
        .await
        .unwrap();

    assert_eq!(graph.created.lock().len(), 1);
    assert_eq!(graph.runs.lock().len(), 2);
    assert_eq!(optimizer.pending_proposals().count(), 2);
}

#[tokio::test]
async fn blank_feedback_is_ignored() {
    let graph = optimizer_graph();
    let mut optimizer = Optimizer::new(graph.clone());

    let proposal = optimizer
        .submit_feedback("  ", &assistant(), &[])
        .await
        .unwrap();

    assert!(proposal.is_none());
    assert!(optimizer.entries().is_empty());
    assert!(graph.runs.lock().is_empty());
}

#[tokio::test]
async fn missing_config_file_is_an_error() {
    let graph = Arc::new(MockGraph::new());
    let mut optimizer = Optimizer::new(graph);

    let result = optimizer
        .submit_feedback("be terse", &assistant(), &[])
        .await;

    assert!(result.is_err());
    assert!(!optimizer.is_loading());
    assert_eq!(optimizer.entries().len(), 1);
}

#[tokio::test]
async fn approving_updates_the_assistant_and_resets_the_thread() {
    let graph = optimizer_graph();
    let main = MockGraph::new();
    *main.assistant.lock() = assistant();
    let mut optimizer = Optimizer::new(graph);

    let proposal = optimizer
        .submit_feedback("use a bigger model", &assistant(), &[])
        .await
        .unwrap()
        .unwrap();
    let updated = optimizer
        .approve(&proposal.id, &main, &assistant())
        .await
        .unwrap();

    assert_eq!(
        updated.config,
        json!({"configurable": {"model": "large", "max_steps": 5}})
    );
    assert!(optimizer.thread_id().is_none());
    assert_eq!(
        optimizer.proposal(&proposal.id).unwrap().status,
        ProposalStatus::Approved
    );

    let updates = main.assistant_updates.lock();
    let (assistant_id, update) = &updates[0];
    assert_eq!(assistant_id, "deep-agent");
    assert_eq!(
        update.metadata.as_ref().unwrap()["description"],
        "Finds sources"
    );
    drop(updates);

    assert!(
        optimizer
            .approve(&proposal.id, &main, &assistant())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn failed_update_leaves_the_proposal_pending() {
    let graph = optimizer_graph();
    let main = MockGraph::new();
    *main.assistant.lock() = assistant();
    *main.fail_update.lock() = Some(Error::Api {
        status: 500,
        message: "assistant store unavailable".to_string(),
    });
    let mut optimizer = Optimizer::new(graph);

    let proposal = optimizer
        .submit_feedback("use a bigger model", &assistant(), &[])
        .await
        .unwrap()
        .unwrap();
    let result = optimizer.approve(&proposal.id, &main, &assistant()).await;

    assert!(result.is_err());
    assert_eq!(
        optimizer.proposal(&proposal.id).unwrap().status,
        ProposalStatus::Pending
    );
    assert_eq!(optimizer.thread_id(), Some("thread-1"));
    assert_eq!(main.assistant.lock().config, assistant().config);

    let updated = optimizer
        .approve(&proposal.id, &main, &assistant())
        .await
        .unwrap();
    assert_eq!(
        updated.config,
        json!({"configurable": {"model": "large", "max_steps": 5}})
    );
    assert_eq!(
        optimizer.proposal(&proposal.id).unwrap().status,
        ProposalStatus::Approved
    );
    assert!(optimizer.thread_id().is_none());
}

#[tokio::test]
async fn rejecting_sends_nothing() {
    let graph = optimizer_graph();
    let mut optimizer = Optimizer::new(graph.clone());

    let proposal = optimizer
        .submit_feedback("use a bigger model", &assistant(), &[])
        .await
        .unwrap()
        .unwrap();
    optimizer.reject(&proposal.id).unwrap();

    assert_eq!(
        optimizer.proposal(&proposal.id).unwrap().status,
        ProposalStatus::Rejected
    );
    assert_eq!(optimizer.pending_proposals().count(), 0);
    assert!(graph.assistant_updates.lock().is_empty());
    assert!(optimizer.reject("unknown").is_err());
}
