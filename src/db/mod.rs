//! Database Module
//!
//! # Interview Q&A
//!
//! Q: 왜 PostgreSQL을 선택했는가?
//! A: 사용자 계정 + 딜 히스토리 정도의 작은 스키마지만
//!
//!    1. UNIQUE 제약: 이메일 중복 가입 방지
//!    2. CHECK 제약: role / deal type 값 강제
//!    3. 인덱싱: (user_id, date_time DESC) 히스토리 조회
//!
//! Q: 금액을 TEXT로 저장하는 이유는?
//! A: wei 단위 uint256 → BIGINT(i64) 범위를 넘을 수 있음
//!    - decimal string으로 저장, 계산은 컨트랙트가 담당
//!
//! Q: 커넥션 풀은 어떻게 관리하는가?
//! A: SQLx의 PgPool 사용
//!    - 최소/최대 커넥션 수 설정
//!    - 타임아웃 처리

mod models;
mod repository;

pub use models::*;
pub use repository::{DealRepository, RepoResult, RepositoryError, Store, UserRepository};

#[cfg(test)]
pub use repository::mock;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};

/// 데이터베이스 연결 및 쿼리 담당
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 데이터베이스 연결
    ///
    /// # Connection Pool Settings
    ///
    /// - max_connections: 10
    /// - min_connections: 1
    /// - acquire_timeout: 3초
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(3))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// 마이그레이션 실행
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await?;
        Ok(())
    }
}

fn map_unique_violation(err: sqlx::Error, what: &str) -> RepositoryError {
    match err.as_database_error() {
        Some(db_err) if db_err.is_unique_violation() => RepositoryError::Duplicate(what.to_string()),
        _ => RepositoryError::Sqlx(err),
    }
}

#[async_trait]
impl UserRepository for Database {
    async fn create_user(&self, user: &NewUser) -> RepoResult<User> {
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password, address, type, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING user_id, email, password, address, type, created_at
            "#
        )
        .bind(user.email.to_lowercase())
        .bind(&user.password_hash)
        .bind(user.address.to_lowercase())
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "User"))?;

        Ok(created)
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, email, password, address, type, created_at
            FROM users
            WHERE email = $1
            "#
        )
        .bind(email.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_user_by_id(&self, user_id: i64) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, email, password, address, type, created_at
            FROM users
            WHERE user_id = $1
            "#
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }
}

#[async_trait]
impl DealRepository for Database {
    async fn insert_deal(&self, deal: &NewDeal) -> RepoResult<Deal> {
        let created = sqlx::query_as::<_, Deal>(
            r#"
            INSERT INTO deals_lenders (user_id, type, amount, interest_gained, date_time)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, type, amount, interest_gained, date_time
            "#
        )
        .bind(deal.user_id)
        .bind(deal.deal_type.as_str())
        .bind(&deal.amount)
        .bind(&deal.interest_gained)
        .bind(deal.date_time)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn list_deals(&self, user_id: i64) -> RepoResult<Vec<Deal>> {
        let deals = sqlx::query_as::<_, Deal>(
            r#"
            SELECT id, user_id, type, amount, interest_gained, date_time
            FROM deals_lenders
            WHERE user_id = $1
            ORDER BY date_time DESC, id DESC
            "#
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(deals)
    }
}

#[async_trait]
impl Store for Database {
    /// Health check
    async fn health_check(&self) -> RepoResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
