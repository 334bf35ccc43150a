//! Health endpoint: app, database and coordination store status.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::response::DataBody;
use crate::state::AppState;

/// Dependency status block.
#[derive(Debug, Serialize)]
pub struct ServicesStatus {
    /// Application status (always "UP" if this handler answers).
    pub app: &'static str,
    /// Durable store reachability.
    pub database: &'static str,
    /// Coordination store reachability.
    pub redis: &'static str,
}

/// Health payload.
#[derive(Debug, Serialize)]
pub struct HealthData {
    /// Per-dependency status.
    pub services_status: ServicesStatus,
    /// Process uptime, seconds.
    pub uptime_seconds: i64,
}

/// GET `/health`
pub async fn health(State(state): State<AppState>) -> Json<DataBody<HealthData>> {
    let database = match sqlx::query("SELECT 1").execute(state.sales.pool()).await {
        Ok(_) => "UP",
        Err(error) => {
            tracing::warn!(%error, "Database health probe failed");
            "DOWN"
        }
    };

    let redis = match state.cache.ping().await {
        Ok(()) => "UP",
        Err(error) => {
            tracing::warn!(%error, "Redis health probe failed");
            "DOWN"
        }
    };

    Json(DataBody::new(HealthData {
        services_status: ServicesStatus {
            app: "UP",
            database,
            redis,
        },
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
    }))
}
