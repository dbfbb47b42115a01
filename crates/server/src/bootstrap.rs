use std::sync::Arc;

use axum::Router;
use concierge_agent::capability::CapabilityError;
use concierge_agent::runtime::AgentRuntime;
use concierge_core::config::{AppConfig, ConfigError};
use thiserror::Error;
use tower_http::services::ServeDir;
use tracing::info;

use crate::{chat, health};

pub struct Application {
    pub config: AppConfig,
    pub agent_runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("agent roster could not be built: {0}")]
    Roster(#[source] CapabilityError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let agent_runtime = AgentRuntime::from_config(&config).map_err(BootstrapError::Roster)?;
    info!(
        event_name = "system.bootstrap.roster_ready",
        correlation_id = "bootstrap",
        agents = ?agent_runtime.agents(),
        translation = config.translation_enabled(),
        "agent roster assembled"
    );

    Ok(Application { config, agent_runtime: Arc::new(agent_runtime) })
}

impl Application {
    /// `/chat` and `/health`, with unmatched paths served from `server.static_dir` when set.
    pub fn router(&self) -> Router {
        let router = chat::router(self.agent_runtime.clone())
            .merge(health::router(self.agent_runtime.agents()));

        match &self.config.server.static_dir {
            Some(static_dir) => router.fallback_service(ServeDir::new(static_dir)),
            None => router,
        }
    }
}
