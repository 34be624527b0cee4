use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::config::StoreBackend;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    /// Which persistence backend this instance was started with.
    pub store: &'static str,
    pub timestamp: String,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: backend_name(state.config.database.backend),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(response))
}

fn backend_name(backend: StoreBackend) -> &'static str {
    match backend {
        StoreBackend::Sqlite => "sqlite",
        StoreBackend::Memory => "memory",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_match_config_spelling() {
        assert_eq!(backend_name(StoreBackend::Sqlite), "sqlite");
        assert_eq!(backend_name(StoreBackend::Memory), "memory");
    }
}
