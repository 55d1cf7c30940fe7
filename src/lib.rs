//! Lending Marketplace DApp
//!
//! # Overview
//!
//! 대출 마켓플레이스 대시보드의 Rust 구현.
//! 금융 로직(이자, 담보, 대출 장부)은 전부 외부 컨트랙트가 소유하고,
//! 이 크레이트는 세션/지갑 상태를 맞추고 컨트랙트 호출을 감싸는 역할만 함.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────── dashboard core ───────────────────────┐
//! │                                                               │
//! │  Session Guard → Wallet Reconciler → Tx Wrapper → Refresher   │
//! │       │                 │                │            │       │
//! └───────┼─────────────────┼────────────────┼────────────┼───────┘
//!         ▼                 ▼                ▼            ▼
//!   ┌───────────┐    ┌────────────┐    ┌──────────────────────┐
//!   │ API (axum)│    │   Wallet   │    │ Escrow / Registries  │
//!   │ users,    │    │ (RPC node) │    │ / Token contracts    │
//!   │ deals     │    └────────────┘    └──────────────────────┘
//!   └─────┬─────┘
//!         ▼
//!    PostgreSQL
//! ```
//!
//! ## Modules
//!
//! - `config`: 환경 설정 관리
//! - `error`: 에러 타입 (`ApiError`, `ClientError`)
//! - `routes`: HTTP 엔드포인트 핸들러
//! - `services`: 외부 경계 (세션, 지갑, 컨트랙트, API 클라이언트)
//! - `dashboard`: reconciler, 주기적 갱신, 트랜잭션 래퍼, lender/borrower 흐름
//! - `db`: 데이터베이스 연동
//! - `types`: 공통 타입 정의
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lending_dapp::dashboard::{DashboardContext, LenderDashboard, WalletReconciler};
//!
//! let mounted = WalletReconciler::new(session_client, wallet, navigator).mount().await;
//! let ctx = DashboardContext::mount(&mounted.state(), contracts, notifier, interval)?;
//! let _follow = ctx.follow(mounted.watch());
//!
//! let lender = LenderDashboard::new(ctx, deals)?;
//! lender.deposit("1000000000000000000").await;
//! ```

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod routes;
pub mod services;
pub mod dashboard;
pub mod db;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use error::{ApiError, ClientError};
pub use db::Database;
pub use services::SessionService;

/// 백엔드 API 상태
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn db::Store>,
    pub sessions: Arc<SessionService>,
    pub config: Arc<Config>,
}
