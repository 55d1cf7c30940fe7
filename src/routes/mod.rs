//! API Routes Module
//!
//! # Routes
//!
//! ```text
//! GET  /health          - 서버/DB 상태
//!
//! POST /register        - 가입 (borrower | lender)
//! POST /auth/login      - 로그인 → 세션 토큰
//! GET  /auth/session    - Bearer 토큰 → 세션
//!
//! GET  /deals?userId=   - lender 딜 히스토리 (최신순)
//! POST /deals           - 딜 기록
//! ```

pub mod auth;
pub mod deals;
pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

/// 미들웨어(CORS, trace)를 제외한 라우터
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))

        // Auth
        .route("/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/session", get(auth::current_session))

        // Deal history
        .route("/deals", get(deals::list_deals).post(deals::create_deal))

        .with_state(state)
}
