use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use gatekeeper_core::SubmissionRegistry;
use gatekeeper_discord::runner::RunnerStatus;
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    registry: Arc<SubmissionRegistry>,
    gateway: RunnerStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub gateway: HealthCheck,
    pub registered_users: usize,
    pub checked_at: String,
}

pub fn router(registry: Arc<SubmissionRegistry>, gateway: RunnerStatus) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { registry, gateway })
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    registry: Arc<SubmissionRegistry>,
    gateway: RunnerStatus,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(registry, gateway)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status, gateway) = if state.gateway.is_running() {
        (
            StatusCode::OK,
            "ready",
            HealthCheck { status: "ready", detail: "gateway event pump running".to_string() },
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "degraded",
            HealthCheck {
                status: "degraded",
                detail: "gateway event pump stopped; restart required".to_string(),
            },
        )
    };

    let payload = HealthResponse {
        status,
        service: HealthCheck {
            status: "ready",
            detail: "gatekeeper-server runtime initialized".to_string(),
        },
        gateway,
        registered_users: state.registry.len(),
        checked_at: Utc::now().to_rfc3339(),
    };

    (code, Json(payload))
}
