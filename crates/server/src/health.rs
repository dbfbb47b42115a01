use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use concierge_core::domain::agent::AgentId;
use serde::Serialize;

const SERVICE: &str = "concierge-server";

#[derive(Clone)]
pub struct HealthState {
    agents: Vec<AgentId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub agents: Vec<String>,
    pub checked_at: String,
}

pub fn router(agents: Vec<AgentId>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { agents })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let ready = [AgentId::Triage, AgentId::HeadSupport]
        .iter()
        .all(|required| state.agents.contains(required));

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: SERVICE,
        agents: state.agents.iter().map(|agent| agent.name().to_string()).collect(),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}
