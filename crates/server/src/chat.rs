use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use concierge_agent::runtime::{AgentRuntime, ChatTurn};
use concierge_core::errors::InterfaceError;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Clone, Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

#[derive(Clone, Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
}

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new().route("/chat", post(chat)).with_state(runtime)
}

pub async fn chat(
    State(runtime): State<Arc<AgentRuntime>>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let correlation_id = Uuid::new_v4().to_string();

    if request.message.trim().is_empty() {
        return error_response(InterfaceError::BadRequest {
            message: "message must not be empty".to_string(),
            correlation_id,
        });
    }

    info!(
        event_name = "api.chat.received",
        correlation_id = %correlation_id,
        history_turns = request.history.len(),
        "chat request received"
    );

    // Isolated so a panicking agent surfaces as a 500 instead of a dropped connection.
    let handle = tokio::spawn(async move {
        runtime.handle_chat(&request.message, &request.history).await
    });

    match handle.await {
        Ok(reply) => {
            info!(
                event_name = "api.chat.answered",
                correlation_id = %correlation_id,
                need_more_info = reply.need_more_info,
                "chat request answered"
            );
            (StatusCode::OK, Json(reply)).into_response()
        }
        Err(join_error) => {
            error!(
                event_name = "api.chat.failed",
                correlation_id = %correlation_id,
                error = %join_error,
                "chat request failed unexpectedly"
            );
            error_response(InterfaceError::Internal {
                message: join_error.to_string(),
                correlation_id,
            })
        }
    }
}

fn error_response(error: InterfaceError) -> Response {
    let status = match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorBody { error: error.user_message() })).into_response()
}
