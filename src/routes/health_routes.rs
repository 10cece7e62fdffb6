use axum::{Json, Router, extract::State, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub database: &'static str,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// Always 200; store reachability is reported, not enforced.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = if state.store.ping().await {
        "connected"
    } else {
        "disconnected"
    };

    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
        database,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::test_state;

    #[tokio::test]
    async fn test_health_reports_store() {
        let Json(body) = health(State(test_state())).await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.database, "connected");
    }
}
