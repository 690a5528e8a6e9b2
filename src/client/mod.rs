//! Client for the remote graph-execution API.
//!
//! Only the operations the chat client consumes are implemented. Retries and
//! reconnection are left to the server.

mod sse;
mod types;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

pub use types::{
    Assistant, AssistantSearch, AssistantUpdate, Checkpoint, Command, RunRequest, SortOrder,
    StreamEvent, Thread, ThreadSearch, ThreadState, ThreadStatus, ThreadTask,
};

use crate::core::{Error, Result};

/// Stream of run events.
pub type RunStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Operations on the graph API.
///
/// [`GraphClient`] talks HTTP; tests substitute an in-memory implementation.
#[async_trait]
pub trait GraphApi: Send + Sync {
    /// Create an empty thread.
    async fn create_thread(&self, metadata: Option<Map<String, Value>>) -> Result<Thread>;

    /// Search threads.
    async fn search_threads(&self, query: &ThreadSearch) -> Result<Vec<Thread>>;

    /// Current state of a thread.
    async fn get_thread_state(&self, thread_id: &str) -> Result<ThreadState>;

    /// Past states of a thread, newest first.
    async fn get_thread_history(&self, thread_id: &str, limit: u32) -> Result<Vec<ThreadState>>;

    /// Write values into a thread's state.
    async fn update_thread_state(
        &self,
        thread_id: &str,
        values: Value,
        as_node: Option<&str>,
    ) -> Result<()>;

    /// Fetch an assistant.
    async fn get_assistant(&self, assistant_id: &str) -> Result<Assistant>;

    /// Update an assistant's config or metadata.
    async fn update_assistant(&self, assistant_id: &str, update: &AssistantUpdate)
    -> Result<Assistant>;

    /// Search assistants.
    async fn search_assistants(&self, query: &AssistantSearch) -> Result<Vec<Assistant>>;

    /// Start a run and stream its events.
    async fn stream_run(&self, thread_id: &str, request: &RunRequest) -> Result<RunStream>;

    /// Cancel a running run.
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()>;
}

/// How requests authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAuth {
    /// Bearer token (also sent as a Supabase access token).
    AccessToken(String),
    /// LangSmith auth scheme; requests go through the deployment proxy when an id is known.
    LangSmith { deployment_id: Option<String> },
}

/// HTTP implementation of [`GraphApi`].
#[derive(Debug, Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
}

impl GraphClient {
    /// Create a client for a deployment.
    ///
    /// With an access token, requests go straight to `deployment_url`.
    /// Without one, they go to `{deployment_url}/langgraph/proxy/{deployment_id}`
    /// (or straight to the URL for local servers with no deployment id).
    pub fn new(deployment_url: &str, auth: ClientAuth) -> Result<Self> {
        let deployment_url = deployment_url.trim_end_matches('/');
        if deployment_url.is_empty() {
            return Err(Error::Config("deployment URL is empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let base_url = match &auth {
            ClientAuth::AccessToken(token) => {
                let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| Error::Config("access token is not a valid header".to_string()))?;
                let raw = HeaderValue::from_str(token)
                    .map_err(|_| Error::Config("access token is not a valid header".to_string()))?;
                headers.insert(AUTHORIZATION, bearer);
                headers.insert(HeaderName::from_static("x-supabase-access-token"), raw);
                deployment_url.to_string()
            }
            ClientAuth::LangSmith { deployment_id } => {
                headers.insert(
                    HeaderName::from_static("x-auth-scheme"),
                    HeaderValue::from_static("langsmith"),
                );
                match deployment_id.as_deref().filter(|id| !id.is_empty()) {
                    Some(id) => format!("{deployment_url}/langgraph/proxy/{id}"),
                    None => deployment_url.to_string(),
                }
            }
        };

        tracing::debug!(base_url = %base_url, "graph client created");

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            headers,
        })
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .headers(self.headers.clone())
    }

    async fn send(builder: RequestBuilder) -> Result<reqwest::Response> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T> {
        let response = Self::send(builder).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| Error::Parse(e.to_string()))
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        Self::json(self.request(Method::POST, path).json(body)).await
    }
}

#[async_trait]
impl GraphApi for GraphClient {
    async fn create_thread(&self, metadata: Option<Map<String, Value>>) -> Result<Thread> {
        let body = json!({ "metadata": metadata.unwrap_or_default() });
        self.post("/threads", &body).await
    }

    async fn search_threads(&self, query: &ThreadSearch) -> Result<Vec<Thread>> {
        self.post("/threads/search", query).await
    }

    async fn get_thread_state(&self, thread_id: &str) -> Result<ThreadState> {
        Self::json(self.request(Method::GET, &format!("/threads/{thread_id}/state"))).await
    }

    async fn get_thread_history(&self, thread_id: &str, limit: u32) -> Result<Vec<ThreadState>> {
        self.post(&format!("/threads/{thread_id}/history"), &json!({ "limit": limit }))
            .await
    }

    async fn update_thread_state(
        &self,
        thread_id: &str,
        values: Value,
        as_node: Option<&str>,
    ) -> Result<()> {
        let mut body = json!({ "values": values });
        if let Some(node) = as_node {
            body["as_node"] = Value::String(node.to_string());
        }
        let _: Value = self.post(&format!("/threads/{thread_id}/state"), &body).await?;
        Ok(())
    }

    async fn get_assistant(&self, assistant_id: &str) -> Result<Assistant> {
        Self::json(self.request(Method::GET, &format!("/assistants/{assistant_id}"))).await
    }

    async fn update_assistant(
        &self,
        assistant_id: &str,
        update: &AssistantUpdate,
    ) -> Result<Assistant> {
        Self::json(
            self.request(Method::PATCH, &format!("/assistants/{assistant_id}"))
                .json(update),
        )
        .await
    }

    async fn search_assistants(&self, query: &AssistantSearch) -> Result<Vec<Assistant>> {
        self.post("/assistants/search", query).await
    }

    async fn stream_run(&self, thread_id: &str, request: &RunRequest) -> Result<RunStream> {
        tracing::debug!(thread_id, assistant_id = %request.assistant_id, "starting run stream");
        let response = Self::send(
            self.request(Method::POST, &format!("/threads/{thread_id}/runs/stream"))
                .header("accept", "text/event-stream")
                .json(request),
        )
        .await?;

        Ok(Box::pin(sse::decode_events(response.bytes_stream())))
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()> {
        Self::send(self.request(
            Method::POST,
            &format!("/threads/{thread_id}/runs/{run_id}/cancel"),
        ))
        .await?;
        Ok(())
    }
}
