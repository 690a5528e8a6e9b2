//! Chat session runs against an in-memory deployment.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Notify;
use tokio::time::timeout;

use common::{MockGraph, ScriptedRun, wait_finished};
use deep_agent_chat::chat::{ChatEvent, ChatSession, RECURSION_LIMIT};
use deep_agent_chat::client::StreamEvent;
use deep_agent_chat::core::Error;
use deep_agent_chat::core::interrupt::{ActionRequest, HumanResponse};

fn session(mock: &Arc<MockGraph>) -> (ChatSession, tokio::sync::mpsc::UnboundedReceiver<ChatEvent>) {
    ChatSession::new(mock.clone(), "deep-agent")
}

fn pending_write_state() -> serde_json::Value {
    json!({
        "values": {
            "messages": [
                {"type": "human", "id": "h1", "content": "save the notes"},
                {"type": "ai", "id": "a1", "content": "", "tool_calls": [
                    {"id": "call-1", "name": "write_file", "args": {"path": "notes.md"}}
                ]}
            ]
        },
        "next": ["tools"],
        "tasks": [{
            "id": "task-1",
            "name": "agent",
            "interrupts": [{
                "value": [{
                    "action_request": {"action": "write_file", "args": {"path": "notes.md"}},
                    "config": {"allow_accept": true, "allow_edit": true, "allow_respond": true, "allow_ignore": true},
                    "description": "Write notes.md"
                }],
                "when": "during"
            }]
        }]
    })
}

#[tokio::test]
async fn send_message_shows_the_message_before_the_server_confirms_it() {
    let mock = Arc::new(MockGraph::new());
    mock.push_run(ScriptedRun::hanging(vec![]));
    let (session, mut events) = session(&mock);

    session.send_message("  hello agent  ").await.unwrap();

    let created = common::wait_for(&mut events, |e| matches!(e, ChatEvent::ThreadCreated(_))).await;
    assert_eq!(created, ChatEvent::ThreadCreated("thread-1".to_string()));
    assert_eq!(session.thread_id().as_deref(), Some("thread-1"));

    let view = session.view();
    assert!(view.is_loading);
    let messages = view.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].is_human());
    assert_eq!(messages[0].text(), "hello agent");

    let request = mock.last_run();
    assert_eq!(request.assistant_id, "deep-agent");
    assert_eq!(request.input.as_ref().unwrap()["messages"][0]["content"], "hello agent");
    assert_eq!(
        request.config.as_ref().unwrap()["recursion_limit"],
        json!(RECURSION_LIMIT)
    );
    assert!(request.interrupt_before.is_none());
}

#[tokio::test]
async fn confirmed_values_replace_the_optimistic_messages() {
    let mock = Arc::new(MockGraph::new());
    mock.push_run(ScriptedRun::finishing(vec![
        StreamEvent::Metadata {
            run_id: "run-1".to_string(),
        },
        StreamEvent::Values(json!({
            "messages": [
                {"type": "human", "id": "h1", "content": "hi"},
                {"type": "ai", "id": "a1", "content": "hello there"}
            ],
            "todos": [{"content": "greet", "status": "completed"}]
        })),
        StreamEvent::End,
    ]));
    let (session, mut events) = session(&mock);

    session.send_message("hi").await.unwrap();
    wait_finished(&mut events).await;

    let view = session.view();
    assert!(!view.is_loading);
    assert!(view.optimistic.is_none());
    let ids: Vec<_> = view.messages().into_iter().filter_map(|m| m.id).collect();
    assert_eq!(ids, ["h1", "a1"]);
    assert_eq!(view.todos().len(), 1);
    assert_eq!(view.run_id.as_deref(), Some("run-1"));
}

#[tokio::test]
async fn second_run_is_rejected_while_one_is_loading() {
    let mock = Arc::new(MockGraph::new());
    mock.push_run(ScriptedRun::hanging(vec![]));
    let (session, _events) = session(&mock);

    session.send_message("first").await.unwrap();
    let err = session.send_message("second").await.unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(mock.runs.lock().len(), 1);
}

#[tokio::test]
async fn blank_message_is_not_sent() {
    let mock = Arc::new(MockGraph::new());
    let (session, _events) = session(&mock);

    assert!(session.send_message("   ").await.is_err());
    assert!(mock.created.lock().is_empty());
    assert!(mock.runs.lock().is_empty());
}

#[tokio::test]
async fn failed_stream_drops_the_optimistic_messages() {
    let mock = Arc::new(MockGraph::new());
    *mock.fail_stream.lock() = Some(Error::Api {
        status: 503,
        message: "unavailable".to_string(),
    });
    let (session, _events) = session(&mock);

    assert!(session.send_message("hi").await.is_err());

    let view = session.view();
    assert!(!view.is_loading);
    assert!(view.optimistic.is_none());
    assert!(view.error.unwrap().contains("unavailable"));
}

#[tokio::test]
async fn stop_cancels_the_run_on_the_server() {
    let mock = Arc::new(MockGraph::new());
    mock.push_run(ScriptedRun::hanging(vec![StreamEvent::Metadata {
        run_id: "run-7".to_string(),
    }]));
    let (session, mut events) = session(&mock);

    session.send_message("long task").await.unwrap();
    timeout(Duration::from_secs(2), async {
        while session.view().run_id.is_none() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("run id never arrived");

    session.stop().await.unwrap();
    wait_finished(&mut events).await;

    assert!(!session.is_loading());
    assert_eq!(
        *mock.cancelled.lock(),
        [("thread-1".to_string(), "run-7".to_string())]
    );
}

/// Wait until the mock has been asked to stream `count` runs.
async fn wait_for_runs(mock: &MockGraph, count: usize) {
    timeout(Duration::from_secs(2), async {
        while mock.runs.lock().len() < count {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("run never started");
}

fn late_run(run_id: &str, reply: &str) -> ScriptedRun {
    ScriptedRun::finishing(vec![
        StreamEvent::Metadata {
            run_id: run_id.to_string(),
        },
        StreamEvent::Values(json!({
            "messages": [
                {"type": "human", "id": "h1", "content": "long task"},
                {"type": "ai", "id": "a1", "content": reply}
            ]
        })),
    ])
}

#[tokio::test]
async fn stop_while_connecting_cancels_the_late_run() {
    let mock = Arc::new(MockGraph::new());
    let gate = Arc::new(Notify::new());
    *mock.gate.lock() = Some(gate.clone());
    mock.push_run(late_run("run-3", "after stop"));
    let (session, _events) = session(&mock);
    let session = Arc::new(session);

    let sending = tokio::spawn({
        let session = session.clone();
        async move { session.send_message("long task").await }
    });
    wait_for_runs(&mock, 1).await;

    session.stop().await.unwrap();
    assert!(mock.cancelled.lock().is_empty());
    gate.notify_one();
    sending.await.unwrap().unwrap();

    timeout(Duration::from_secs(2), async {
        while mock.cancelled.lock().is_empty() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("late run was never cancelled");

    assert_eq!(
        *mock.cancelled.lock(),
        [("thread-1".to_string(), "run-3".to_string())]
    );
    let view = session.view();
    assert!(!view.is_loading);
    assert!(view.run_id.is_none());
    assert!(
        view.messages()
            .iter()
            .all(|m| m.text() != "after stop")
    );
}

#[tokio::test]
async fn new_thread_while_connecting_keeps_the_late_run_out_of_view() {
    let mock = Arc::new(MockGraph::new());
    let gate = Arc::new(Notify::new());
    *mock.gate.lock() = Some(gate.clone());
    mock.push_run(late_run("run-4", "old thread reply"));
    let (session, _events) = session(&mock);
    let session = Arc::new(session);

    let sending = tokio::spawn({
        let session = session.clone();
        async move { session.send_message("long task").await }
    });
    wait_for_runs(&mock, 1).await;

    session.new_thread();
    gate.notify_one();
    sending.await.unwrap().unwrap();

    timeout(Duration::from_secs(2), async {
        while mock.cancelled.lock().is_empty() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("late run was never cancelled");

    assert_eq!(
        *mock.cancelled.lock(),
        [("thread-1".to_string(), "run-4".to_string())]
    );
    assert!(session.thread_id().is_none());
    assert!(session.view().messages().is_empty());
    assert!(!session.is_loading());
}

#[tokio::test]
async fn loading_a_thread_picks_up_its_interrupt() {
    let mock = Arc::new(MockGraph::new().with_state(pending_write_state()));
    let (session, _events) = session(&mock);

    session.load_thread("thread-9").await.unwrap();

    let view = session.view();
    let interrupt = view.interrupt.as_ref().expect("interrupt loaded");
    assert_eq!(interrupt.title(), "Write File");
    assert_eq!(view.messages().len(), 2);
}

#[tokio::test]
async fn loading_a_missing_thread_leaves_an_empty_view() {
    let mock = Arc::new(MockGraph::new());
    let (session, _events) = session(&mock);

    assert!(session.load_thread("missing").await.is_err());

    let view = session.view();
    assert!(view.messages().is_empty());
    assert!(view.todos().is_empty());
    assert!(view.files().is_empty());
    assert!(view.error.is_some());
}

#[tokio::test]
async fn human_response_resumes_the_run() {
    let mock = Arc::new(MockGraph::new().with_state(pending_write_state()));
    let (session, mut events) = session(&mock);
    session.load_thread("thread-9").await.unwrap();

    session
        .send_human_response(vec![HumanResponse::Edit(ActionRequest {
            action: "write_file".to_string(),
            args: json!({"path": "todo.md"}).as_object().unwrap().clone(),
        })])
        .await
        .unwrap();
    wait_finished(&mut events).await;

    let (thread_id, request) = mock.runs.lock()[0].clone();
    assert_eq!(thread_id, "thread-9");
    assert!(request.input.is_none());
    assert_eq!(
        serde_json::to_value(request.command.unwrap()).unwrap(),
        json!({"resume": [{
            "type": "edit",
            "args": {"action": "write_file", "args": {"path": "todo.md"}}
        }]})
    );
}

#[tokio::test]
async fn mark_resolved_jumps_to_the_end() {
    let mock = Arc::new(MockGraph::new().with_state(pending_write_state()));
    let (session, mut events) = session(&mock);
    session.load_thread("thread-9").await.unwrap();

    session.mark_resolved().await.unwrap();
    wait_finished(&mut events).await;

    let command = mock.last_run().command.unwrap();
    assert_eq!(command.goto.as_deref(), Some("__end__"));
    assert!(command.resume.is_none());
}

#[tokio::test]
async fn debug_step_pauses_before_tools() {
    let mock = Arc::new(MockGraph::new());
    let (session, mut events) = session(&mock);

    let message = deep_agent_chat::core::message::Message::human("plan a trip");
    session
        .run_single_step(vec![message.clone()], None, false, Some(vec![message]))
        .await
        .unwrap();
    wait_finished(&mut events).await;

    let request = mock.last_run();
    assert_eq!(request.interrupt_before, Some(vec!["tools".to_string()]));
    assert!(request.interrupt_after.is_none());
    assert!(request.config.unwrap().get("recursion_limit").is_none());
    assert_eq!(request.input.unwrap()["messages"][0]["content"], "plan a trip");
}

#[tokio::test]
async fn continuing_into_a_task_call_pauses_after_tools() {
    let mock = Arc::new(MockGraph::new());
    let (session, mut events) = session(&mock);
    session.load_thread("thread-2").await.unwrap();

    session.continue_stream(true).await.unwrap();
    wait_finished(&mut events).await;
    let request = mock.last_run();
    assert_eq!(request.interrupt_after, Some(vec!["tools".to_string()]));
    assert!(request.input.is_none());
    assert_eq!(
        request.config.unwrap()["recursion_limit"],
        json!(RECURSION_LIMIT)
    );

    session.continue_stream(false).await.unwrap();
    wait_finished(&mut events).await;
    assert_eq!(
        mock.last_run().interrupt_before,
        Some(vec!["tools".to_string()])
    );
}

#[tokio::test]
async fn restart_uses_the_checkpoint_before_the_message_appeared() {
    let history = json!([
        {
            "values": {"messages": [
                {"type": "human", "id": "h1", "content": "hi"},
                {"type": "ai", "id": "a1", "content": "hello"},
                {"type": "human", "id": "h2", "content": "more"}
            ]},
            "parent_checkpoint": {"checkpoint_ns": "", "checkpoint_id": "cp-2"}
        },
        {
            "values": {"messages": [
                {"type": "human", "id": "h1", "content": "hi"},
                {"type": "ai", "id": "a1", "content": "hello"}
            ]},
            "parent_checkpoint": {"checkpoint_ns": "", "checkpoint_id": "cp-1"}
        },
        {
            "values": {"messages": [{"type": "human", "id": "h1", "content": "hi"}]},
            "parent_checkpoint": {"checkpoint_ns": "", "checkpoint_id": "cp-0"}
        }
    ]);
    let state = json!({"values": history[0]["values"].clone()});
    let mock = Arc::new(MockGraph::new().with_state(state).with_history(history));
    let (session, mut events) = session(&mock);
    session.load_thread("thread-3").await.unwrap();

    session.restart_from_message("a1", false).await.unwrap();
    wait_finished(&mut events).await;

    let request = mock.last_run();
    let checkpoint = request.checkpoint.unwrap();
    assert_eq!(checkpoint.checkpoint_id.as_deref(), Some("cp-1"));
    assert_eq!(request.interrupt_before, Some(vec!["tools".to_string()]));
    assert!(request.input.is_none());

    session.restart_from_message("a1", true).await.unwrap();
    wait_finished(&mut events).await;
    assert_eq!(
        mock.last_run().interrupt_after,
        Some(vec!["tools".to_string()])
    );
}

#[tokio::test]
async fn restart_without_a_thread_fails() {
    let mock = Arc::new(MockGraph::new());
    let (session, _events) = session(&mock);

    let err = session.restart_from_message("a1", false).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn editing_files_writes_them_to_the_thread() {
    let mock = Arc::new(MockGraph::new().with_state(json!({
        "values": {"files": {"notes.md": "draft"}}
    })));
    let (session, _events) = session(&mock);
    session.load_thread("thread-4").await.unwrap();

    let mut files = session.view().files().clone();
    files.insert("notes.md".to_string(), "final".to_string());
    files.insert("plan.md".to_string(), "1. ship".to_string());
    session.update_files(files.clone()).await.unwrap();

    assert_eq!(
        *mock.state_updates.lock(),
        [(
            "thread-4".to_string(),
            json!({"files": {"notes.md": "final", "plan.md": "1. ship"}})
        )]
    );
    assert_eq!(session.view().files(), &files);
}

#[tokio::test]
async fn editing_files_needs_a_thread() {
    let mock = Arc::new(MockGraph::new());
    let (session, _events) = session(&mock);

    assert!(session.update_files(BTreeMap::new()).await.is_err());
    assert!(mock.state_updates.lock().is_empty());
}
