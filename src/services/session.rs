//! Session Service
//!
//! 자격 증명(email + password) 로그인과 세션 토큰 발급/검증.
//!
//! # Token
//!
//! HS512 JWT. 세션이 노출하는 필드(user id, email, wallet address, role)를
//! claim에 그대로 담음 → 세션 조회 시 DB 왕복 없음

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::types::Role;

/// 인증된 사용자 세션
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "id")]
    pub user_id: i64,
    pub email: String,
    pub address: String,
    #[serde(rename = "type")]
    pub role: Role,
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    address: String,
    role: Role,
    iat: i64,
    exp: i64,
    jti: String,
}

pub struct SessionService {
    secret: String,
    ttl: Duration,
}

impl SessionService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            secret: secret.to_string(),
            ttl,
        }
    }

    /// 비밀번호 해시 (argon2, 사용자별 랜덤 salt)
    pub fn hash_password(&self, raw_password: &str) -> Result<String> {
        let salt: [u8; 16] = rand::random();
        argon2::hash_encoded(raw_password.as_bytes(), &salt, &argon2::Config::default())
            .context("failed to hash password")
    }

    /// 비밀번호 검증
    ///
    /// 해시 형식이 깨졌으면 실패로 처리 (로그만 남김)
    pub fn verify_password(&self, hashed_password: &str, raw_password: &str) -> bool {
        match argon2::verify_encoded(hashed_password, raw_password.as_bytes()) {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!("stored password hash is unreadable: {}", e);
                false
            }
        }
    }

    /// 세션 토큰 발급
    pub fn issue(&self, session: &Session) -> Result<String> {
        self.issue_at(session, Utc::now())
    }

    fn issue_at(&self, session: &Session, issued_at: DateTime<Utc>) -> Result<String> {
        let ttl = chrono::Duration::from_std(self.ttl).context("session ttl out of range")?;
        let claims = Claims {
            sub: session.user_id.to_string(),
            email: session.email.clone(),
            address: session.address.clone(),
            role: session.role,
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .context("failed to sign session token")
    }

    /// 세션 토큰 검증 → 세션
    ///
    /// 서명 불일치, 만료, 형식 오류 모두 Err
    pub fn verify(&self, token: &str) -> Result<Session> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::new(Algorithm::HS512),
        )
        .context("invalid session token")?;

        let claims = data.claims;
        Ok(Session {
            user_id: claims.sub.parse().context("invalid subject in session token")?,
            email: claims.email,
            address: claims.address,
            role: claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn service() -> SessionService {
        SessionService::new("test-secret", Duration::from_secs(3600))
    }

    fn session() -> Session {
        Session {
            user_id: 7,
            email: "alice@example.com".to_string(),
            address: "0x1234567890123456789012345678901234567890".to_string(),
            role: Role::Lender,
        }
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let svc = service();
        let hash = svc.hash_password("hunter2").unwrap();

        assert_ne!(hash, "hunter2");
        assert!(svc.verify_password(&hash, "hunter2"));
        assert!(!svc.verify_password(&hash, "hunter3"));
    }

    #[test]
    fn test_same_password_gets_different_salt() {
        let svc = service();
        let a = svc.hash_password("pw").unwrap();
        let b = svc.hash_password("pw").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_corrupt_hash_is_rejected() {
        assert!(!service().verify_password("not-a-hash", "pw"));
    }

    #[test]
    fn test_issue_and_verify() {
        let svc = service();
        let token = assert_ok!(svc.issue(&session()));
        assert_eq!(assert_ok!(svc.verify(&token)), session());
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let token = SessionService::new("other", Duration::from_secs(3600))
            .issue(&session())
            .unwrap();
        assert_err!(service().verify(&token));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let svc = service();
        let two_days_ago = Utc::now() - chrono::Duration::days(2);
        let token = svc.issue_at(&session(), two_days_ago).unwrap();
        assert_err!(svc.verify(&token));
    }

    #[test]
    fn test_session_json_shape() {
        let json = serde_json::to_value(session()).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["type"], "lender");
    }
}
