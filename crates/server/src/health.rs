use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;
use welcomebot_db::SqliteKvStore;

#[derive(Clone)]
pub struct HealthState {
    kv: SqliteKvStore,
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
    pub kv_store: HealthCheck,
    pub checked_at: String,
}

pub fn router(kv: SqliteKvStore) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { kv })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let kv_store = kv_store_check(&state.kv).await;
    let ready = kv_store.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck { status: "ready", detail: "welcomebot-server running".to_string() },
        kv_store,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn kv_store_check(kv: &SqliteKvStore) -> HealthCheck {
    match kv.ping().await {
        Ok(()) => HealthCheck { status: "ready", detail: "kv store query succeeded".to_string() },
        Err(error) => {
            warn!(
                event_name = "welcomebot.health.kv_unreachable",
                error = %error,
                "kv store health check failed"
            );
            HealthCheck { status: "degraded", detail: format!("kv store query failed: {error}") }
        }
    }
}
