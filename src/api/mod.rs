//! HTTP API serving derived chat views.
//!
//! `dac serve` exposes what the TUI renders (reconciled messages, grouped
//! todos, files, the pending interrupt) plus the config diff renderer, so
//! other front ends can reuse them without reimplementing the logic.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use crate::chat::ChatView;
use crate::client::{GraphApi, ThreadState};
use crate::core::diff::{ConfigDiff, DiffFormat, DiffRow, HtmlDiffRow};
use crate::core::interrupt::Interrupt;
use crate::core::reconcile::{ProcessedMessage, SubAgent};
use crate::core::state::{Files, GroupedTodos, group_todos};
use crate::core::threads::{ThreadSummary, history_query, summarize_threads};
use crate::core::Error;

/// Title for threads whose first message has no text.
const UNTITLED: &str = "Untitled thread";

/// Shared server state.
#[derive(Clone)]
pub struct ApiState {
    pub client: Arc<dyn GraphApi>,
    pub assistant_id: String,
    /// Bearer token required on `/api` routes, if any.
    pub token: Option<String>,
}

type SharedState = Arc<ApiState>;

/// Error body returned by every failing route.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Api { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Error::Validation(_) | Error::Json(_) | Error::Yaml(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.status.canonical_reason().unwrap_or("error"),
            "message": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

async fn auth_middleware(
    State(state): State<SharedState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.token.as_deref() else {
        return next.run(request).await;
    };

    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if provided == Some(expected) {
        next.run(request).await
    } else {
        ApiError {
            status: StatusCode::UNAUTHORIZED,
            message: "Missing or invalid Authorization header. Use: Bearer <token>".to_string(),
        }
        .into_response()
    }
}

/// Build the router. Split out from [`serve`] so it can be exercised
/// without a socket.
pub fn router(state: ApiState) -> Router {
    let state: SharedState = Arc::new(state);

    let api_routes = Router::new()
        .route("/api/threads", get(list_threads))
        .route("/api/threads/{thread_id}", get(get_thread))
        .route("/api/diff", post(render_diff))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve the API on `host:port` until the process is stopped.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn serve(state: ApiState, host: &str, port: u16) -> anyhow::Result<()> {
    let auth_enabled = state.token.is_some();
    let app = router(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    if auth_enabled {
        tracing::info!(addr = %addr, "starting HTTP API server (auth enabled)");
    } else {
        tracing::warn!(addr = %addr, "starting HTTP API server (no auth, keep it on localhost)");
    }

    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<u32>,
}

async fn list_threads(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ThreadSummary>>, ApiError> {
    let mut search = history_query(Some(&state.assistant_id));
    if let Some(limit) = query.limit {
        search.limit = limit;
    }
    let threads = state.client.search_threads(&search).await?;
    Ok(Json(summarize_threads(&threads, UNTITLED)))
}

/// Everything the chat panels show for one thread.
#[derive(Debug, Serialize)]
pub struct ThreadView {
    pub thread_id: String,
    pub messages: Vec<ProcessedMessage>,
    pub sub_agents: Vec<SubAgent>,
    pub todos: GroupedTodos,
    pub files: Files,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<Interrupt>,
}

impl ThreadView {
    /// Derive the view from a fetched thread state.
    #[must_use]
    pub fn from_state(thread_id: String, state: &ThreadState) -> Self {
        let mut view = ChatView::default();
        view.load(state.thread_values(), state.interrupt().cloned());

        let messages = view.processed_messages();
        let sub_agents = messages
            .iter()
            .flat_map(ProcessedMessage::sub_agents)
            .collect();

        Self {
            thread_id,
            sub_agents,
            messages,
            todos: group_todos(view.todos()),
            files: view.files().clone(),
            interrupt: view.interrupt,
        }
    }
}

async fn get_thread(
    State(state): State<SharedState>,
    Path(thread_id): Path<String>,
) -> Result<Json<ThreadView>, ApiError> {
    let thread_state = state.client.get_thread_state(&thread_id).await?;
    Ok(Json(ThreadView::from_state(thread_id, &thread_state)))
}

#[derive(Debug, Deserialize)]
struct DiffRequest {
    old: Value,
    new: Value,
    #[serde(default)]
    format: DiffFormat,
}

#[derive(Debug, Serialize)]
struct DiffStats {
    added: usize,
    removed: usize,
}

#[derive(Debug, Serialize)]
struct DiffResponse {
    has_changes: bool,
    stats: DiffStats,
    rows: Vec<DiffRow>,
    html_rows: Vec<HtmlDiffRow>,
}

async fn render_diff(Json(request): Json<DiffRequest>) -> Result<Json<DiffResponse>, ApiError> {
    let diff = ConfigDiff::new(&request.old, &request.new, request.format)?;
    let (added, removed) = diff.stats();
    Ok(Json(DiffResponse {
        has_changes: diff.has_changes(),
        stats: DiffStats { added, removed },
        html_rows: diff.html_rows(),
        rows: diff.rows().to_vec(),
    }))
}
