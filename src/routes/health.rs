//! Health Check Endpoint
//!
//! # Interview Q&A
//!
//! Q: DB 연결 상태까지 체크하는 이유는?
//! A: 가입/로그인/딜 기록 모두 DB 의존
//!    - 프로세스만 살아있고 DB가 죽었으면 "degraded"
//!    - 로드밸런서가 트래픽을 뺄 수 있도록 상태 노출

use std::time::Instant;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub database: DatabaseStatus,
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct DatabaseStatus {
    pub connected: bool,
    pub latency_ms: Option<u64>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let started = Instant::now();
    let database = match state.store.health_check().await {
        Ok(()) => DatabaseStatus {
            connected: true,
            latency_ms: Some(started.elapsed().as_millis() as u64),
        },
        Err(e) => {
            tracing::warn!("database health check failed: {}", e);
            DatabaseStatus {
                connected: false,
                latency_ms: None,
            }
        }
    };

    Json(HealthResponse {
        status: if database.connected { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: format!("{:?}", state.config.environment).to_lowercase(),
        database,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
