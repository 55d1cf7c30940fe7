//! Database Models
//!
//! Users are created once at registration. Lender deals are an append-only log.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::types::{DealType, Role};

/// 사용자
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: i64,

    /// 이메일 (lowercase, unique)
    pub email: String,

    /// argon2 해시 (평문 저장 금지)
    pub password: String,

    /// 연결된 지갑 주소 (lowercase)
    pub address: String,

    /// borrower | lender
    #[sqlx(rename = "type")]
    pub user_type: String,

    pub created_at: DateTime<Utc>,
}

impl User {
    /// 저장된 role 파싱 (과거 "Lender" 표기도 허용)
    pub fn role(&self) -> Result<Role, String> {
        self.user_type.parse()
    }
}

/// 가입 요청 → insert 입력
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub address: String,
    pub role: Role,
}

/// Lender 딜 기록
#[derive(Debug, Clone, FromRow)]
pub struct Deal {
    pub id: i64,
    pub user_id: i64,

    /// deposit | withdraw
    #[sqlx(rename = "type")]
    pub deal_type: String,

    /// wei (decimal string, 256-bit 보존)
    pub amount: String,

    pub interest_gained: String,

    pub date_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDeal {
    pub user_id: i64,
    pub deal_type: DealType,
    pub amount: String,
    pub interest_gained: String,
    pub date_time: DateTime<Utc>,
}
