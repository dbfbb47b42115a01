//! HTTP-backed agent capability.
//!
//! Posts `{agent, session_id, transcript}` to the configured endpoint and expects
//! `{status, content}` back. Only a `completed` status yields content.

use async_trait::async_trait;
use concierge_core::domain::agent::AgentId;
use concierge_core::domain::transcript::ConversationState;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::capability::{AgentCapability, CapabilityError};

const COMPLETED: &str = "completed";

#[derive(Clone)]
pub struct RemoteCapability {
    agent: AgentId,
    endpoint: String,
    client: Client,
    api_key: Option<SecretString>,
}

#[derive(Debug, Serialize)]
struct InvokeRequest<'a> {
    agent: &'static str,
    session_id: Uuid,
    transcript: Vec<TranscriptEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct TranscriptEntry<'a> {
    author: &'static str,
    content: &'a str,
    turn_index: u32,
}

#[derive(Debug, Deserialize)]
struct InvokeResponse {
    status: String,
    #[serde(default)]
    content: String,
}

impl<'a> InvokeRequest<'a> {
    fn from_state(agent: AgentId, state: &'a ConversationState) -> Self {
        let transcript = state
            .messages()
            .iter()
            .map(|message| TranscriptEntry {
                author: message.author().label(),
                content: message.content(),
                turn_index: message.turn_index(),
            })
            .collect();
        Self { agent: agent.name(), session_id: state.session_id(), transcript }
    }
}

impl RemoteCapability {
    pub fn new(
        agent: AgentId,
        endpoint: impl Into<String>,
        client: Client,
        api_key: Option<SecretString>,
    ) -> Self {
        Self { agent, endpoint: endpoint.into(), client, api_key }
    }

    async fn call(&self, request: &InvokeRequest<'_>) -> Result<String, CapabilityError> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response =
            builder.send().await.map_err(|error| CapabilityError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CapabilityError::HttpStatus(status.as_u16()));
        }

        let body: InvokeResponse =
            response.json().await.map_err(|error| CapabilityError::Decode(error.to_string()))?;

        if body.status != COMPLETED {
            return Err(CapabilityError::NotCompleted(body.status));
        }

        Ok(body.content)
    }
}

#[async_trait]
impl AgentCapability for RemoteCapability {
    async fn invoke(
        &self,
        state: &ConversationState,
        cancel: &CancellationToken,
    ) -> Result<String, CapabilityError> {
        let request = InvokeRequest::from_state(self.agent, state);
        debug!(
            event_name = "agent.remote.invoke",
            agent = self.agent.name(),
            session_id = %state.session_id(),
            turns = state.len(),
            "invoking remote agent"
        );

        tokio::select! {
            _ = cancel.cancelled() => Err(CapabilityError::Cancelled),
            result = self.call(&request) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use concierge_core::domain::agent::{AgentId, Author};
    use concierge_core::domain::transcript::ConversationState;
    use reqwest::Client;
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    use super::RemoteCapability;
    use crate::capability::{AgentCapability, CapabilityError};

    async fn echo(headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
        let auth = headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok()).unwrap_or("");
        let summary = json!({
            "agent": body["agent"],
            "turns": body["transcript"].as_array().map(Vec::len).unwrap_or(0),
            "first_author": body["transcript"][0]["author"],
            "auth": auth,
        });
        Json(json!({"status": "completed", "content": summary.to_string()}))
    }

    async fn failed() -> Json<Value> {
        Json(json!({"status": "failed", "content": ""}))
    }

    async fn broken() -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    async fn slow() -> Json<Value> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Json(json!({"status": "completed", "content": "too late"}))
    }

    async fn serve() -> String {
        let router = Router::new()
            .route("/echo", post(echo))
            .route("/failed", post(failed))
            .route("/broken", post(broken))
            .route("/slow", post(slow));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
        let address = listener.local_addr().expect("local address");
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        format!("http://{address}")
    }

    fn state() -> ConversationState {
        let mut state = ConversationState::new();
        state.append(Author::User, "query: where is my order");
        state.append(AgentId::Triage.into(), "{}");
        state
    }

    fn capability(base: &str, path: &str) -> RemoteCapability {
        RemoteCapability::new(
            AgentId::HeadSupport,
            format!("{base}{path}"),
            Client::new(),
            Some("agent-key".to_string().into()),
        )
    }

    #[tokio::test]
    async fn completed_run_returns_content_and_sends_transcript() {
        let base = serve().await;
        let content = capability(&base, "/echo")
            .invoke(&state(), &CancellationToken::new())
            .await
            .expect("completed run");

        let summary: Value = serde_json::from_str(&content).expect("echo content is json");
        assert_eq!(summary["agent"], "HeadSupportAgent");
        assert_eq!(summary["turns"], 2);
        assert_eq!(summary["first_author"], "user");
        assert_eq!(summary["auth"], "Bearer agent-key");
    }

    #[tokio::test]
    async fn non_completed_status_is_a_failure() {
        let base = serve().await;
        let error = capability(&base, "/failed")
            .invoke(&state(), &CancellationToken::new())
            .await
            .expect_err("failed run");
        assert!(matches!(error, CapabilityError::NotCompleted(ref status) if status == "failed"));
    }

    #[tokio::test]
    async fn http_error_status_is_a_failure() {
        let base = serve().await;
        let error = capability(&base, "/broken")
            .invoke(&state(), &CancellationToken::new())
            .await
            .expect_err("http 500");
        assert!(matches!(error, CapabilityError::HttpStatus(500)));
    }

    #[tokio::test]
    async fn cancellation_interrupts_in_flight_request() {
        let base = serve().await;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            capability(&base, "/slow").invoke(&state(), &cancel),
        )
        .await
        .expect("cancellation should win before the outer timeout");

        assert!(matches!(result, Err(CapabilityError::Cancelled)));
    }
}
