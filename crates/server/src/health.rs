use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use intake_db::DbPool;
use serde::Serialize;
use tracing::warn;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    sms_enabled: bool,
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
    pub database: HealthCheck,
    pub notifications: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, sms_enabled: bool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, sms_enabled })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck { status: "ready", detail: "intake-server accepting requests".to_string() },
        database,
        notifications: if state.sms_enabled {
            HealthCheck { status: "ready", detail: "sms gateway configured".to_string() }
        } else {
            HealthCheck { status: "disabled", detail: "order notifications are skipped".to_string() }
        },
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query("SELECT 1 FROM customer LIMIT 1").fetch_optional(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            warn!(event_name = "system.health.database_failed", error = %error, "health check query failed");
            HealthCheck { status: "degraded", detail: "database query failed".to_string() }
        }
    }
}
