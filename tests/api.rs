//! HTTP API routes exercised without a socket.

mod common;

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use common::MockGraph;
use deep_agent_chat::api::{ApiState, router};

const TOKEN: &str = "s3cret";

fn state(mock: MockGraph, token: Option<&str>) -> ApiState {
    ApiState {
        client: Arc::new(mock),
        assistant_id: "deep-agent".to_string(),
        token: token.map(str::to_string),
    }
}

async fn call(state: ApiState, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(state).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or_else(|_| {
        Value::String(String::from_utf8_lossy(&bytes).into_owned())
    });
    (status, body)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_needs_no_token() {
    let (status, body) = call(state(MockGraph::new(), Some(TOKEN)), get("/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn api_routes_require_the_token() {
    let (status, body) = call(
        state(MockGraph::new(), Some(TOKEN)),
        get("/api/threads", Some("wrong")),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn thread_list_is_summarized() {
    let mock = MockGraph::new().with_threads(json!([
        {
            "thread_id": "t1",
            "status": "interrupted",
            "values": {"messages": [{"type": "human", "id": "h1", "content": "Compare rust web frameworks"}]}
        },
        {"thread_id": "t2", "status": "idle"}
    ]));
    let (status, body) = call(state(mock, None), get("/api/threads?limit=1", None)).await;

    assert_eq!(status, StatusCode::OK);
    let threads = body.as_array().unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0]["id"], "t1");
    assert_eq!(threads[0]["status"], "interrupted");
}

#[tokio::test]
async fn thread_view_carries_messages_todos_and_files() {
    let mock = MockGraph::new().with_state(json!({
        "values": {
            "messages": [
                {"type": "human", "id": "h1", "content": "research rust"},
                {"type": "ai", "id": "a1", "content": "", "tool_calls": [
                    {"id": "call-1", "name": "task", "args": {"description": "find sources", "subagent_type": "researcher"}}
                ]},
                {"type": "tool", "id": "m3", "tool_call_id": "call-1", "name": "task", "content": "3 sources"}
            ],
            "todos": [
                {"content": "collect sources", "status": "completed"},
                {"content": "write summary", "status": "in_progress"}
            ],
            "files": {"summary.md": "# Rust"}
        }
    }));
    let (status, body) = call(state(mock, Some(TOKEN)), get("/api/threads/t1", Some(TOKEN))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["thread_id"], "t1");
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    assert_eq!(body["sub_agents"].as_array().unwrap().len(), 1);
    assert_eq!(body["todos"]["in_progress"][0]["content"], "write summary");
    assert_eq!(body["files"]["summary.md"], "# Rust");
    assert!(body.get("interrupt").is_none());
}

#[tokio::test]
async fn unknown_thread_maps_the_upstream_status() {
    let (status, body) = call(
        state(MockGraph::new(), None),
        get("/api/threads/missing", None),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"].as_str().unwrap().contains("thread not found"));
}

#[tokio::test]
async fn diff_reports_changed_lines() {
    let request = post_json(
        "/api/diff",
        &json!({
            "old": {"model": "small", "tools": ["search"]},
            "new": {"model": "large", "tools": ["search"]}
        }),
    );
    let (status, body) = call(state(MockGraph::new(), Some(TOKEN)), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_changes"], true);
    assert_eq!(body["stats"], json!({"added": 1, "removed": 1}));
    assert!(!body["rows"].as_array().unwrap().is_empty());
    assert_eq!(
        body["rows"].as_array().unwrap().len(),
        body["html_rows"].as_array().unwrap().len()
    );
}

#[tokio::test]
async fn identical_configs_have_no_changes() {
    let config = json!({"model": "small"});
    let request = post_json(
        "/api/diff",
        &json!({"old": config, "new": config, "format": "json"}),
    );
    let (status, body) = call(state(MockGraph::new(), Some(TOKEN)), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_changes"], false);
    assert_eq!(body["stats"], json!({"added": 0, "removed": 0}));
}
