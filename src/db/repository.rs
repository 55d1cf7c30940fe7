//! Repository Pattern Implementation
//!
//! # Interview Q&A
//!
//! Q: Repository 패턴이란?
//! A: 데이터 접근 로직을 추상화하는 패턴
//!
//!    - 핸들러는 `Arc<dyn Store>`만 알고 있음
//!    - PostgreSQL 구현: `Database` (db/mod.rs)
//!    - 테스트용 구현: `mock::MemoryStore`
//!
//! Q: 딜 히스토리에 update/delete가 없는 이유는?
//! A: 감사(audit) 로그 성격 → append-only

use async_trait::async_trait;
use thiserror::Error;

use super::models::{Deal, NewDeal, NewUser, User};
use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("duplicate {0}")]
    Duplicate(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Duplicate(what) => ApiError::Conflict(what),
            RepositoryError::Sqlx(e) => e.into(),
        }
    }
}

pub type RepoResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 이메일 중복이면 `RepositoryError::Duplicate`
    async fn create_user(&self, user: &NewUser) -> RepoResult<User>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn find_user_by_id(&self, user_id: i64) -> RepoResult<Option<User>>;
}

#[async_trait]
pub trait DealRepository: Send + Sync {
    async fn insert_deal(&self, deal: &NewDeal) -> RepoResult<Deal>;
    /// 최신순 (date_time DESC, id DESC)
    async fn list_deals(&self, user_id: i64) -> RepoResult<Vec<Deal>>;
}

/// 핸들러가 사용하는 저장소 전체
#[async_trait]
pub trait Store: UserRepository + DealRepository {
    async fn health_check(&self) -> RepoResult<()>;
}
