//! Backend API Client
//!
//! 대시보드 코어 → 백엔드 API (세션, 딜 히스토리) HTTP 어댑터.
//!
//! # Boundaries
//! - `SessionSource`: 현재 세션 조회 (세션 가드가 사용)
//! - `DealRecorder`: lender 딜 기록/조회

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::RwLock;

use crate::error::ClientError;
use crate::routes::auth::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use crate::services::Session;
use crate::types::{DealRecord, DealView};

/// 세션 경계
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// 세션 없음 → `Ok(None)`
    async fn current_session(&self) -> Result<Option<Session>, ClientError>;
}

/// 딜 히스토리 경계
#[async_trait]
pub trait DealRecorder: Send + Sync {
    async fn record(&self, deal: &DealRecord) -> Result<DealView, ClientError>;

    /// 최신순
    async fn history(&self, user_id: i64) -> Result<Vec<DealView>, ClientError>;
}

/// 세션 토큰을 들고 있는 HTTP 클라이언트
pub struct HttpSessionClient {
    http: reqwest::Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl HttpSessionClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        }
    }

    /// POST /register
    pub async fn register(&self, req: &RegisterRequest) -> Result<RegisterResponse, ClientError> {
        let resp = self
            .http
            .post(format!("{}/register", self.base_url))
            .json(req)
            .send()
            .await?;

        if resp.status() == StatusCode::BAD_REQUEST || resp.status() == StatusCode::CONFLICT {
            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            return Err(ClientError::InvalidInput(error_message(&body)));
        }

        Ok(resp.error_for_status()?.json().await?)
    }

    /// POST /auth/login
    ///
    /// 실패 시 재시도 없음 → 호출자가 sign-in 화면 유지
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        let resp = self
            .http
            .post(format!("{}/auth/login", self.base_url))
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }

        let body: LoginResponse = resp.error_for_status()?.json().await?;
        *self.token.write().await = Some(body.token);
        tracing::info!("signed in as {}", body.session.email);
        Ok(body.session)
    }

    pub async fn sign_out(&self) {
        *self.token.write().await = None;
    }
}

#[async_trait]
impl SessionSource for HttpSessionClient {
    async fn current_session(&self) -> Result<Option<Session>, ClientError> {
        let token = match self.token.read().await.clone() {
            Some(token) => token,
            None => return Ok(None),
        };

        let resp = self
            .http
            .get(format!("{}/auth/session", self.base_url))
            .bearer_auth(token)
            .send()
            .await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            // 만료/폐기된 토큰은 세션 없음과 동일
            *self.token.write().await = None;
            return Ok(None);
        }

        Ok(Some(resp.error_for_status()?.json().await?))
    }
}

/// `/deals` HTTP 어댑터
pub struct HttpDealRecorder {
    http: reqwest::Client,
    base_url: String,
}

impl HttpDealRecorder {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl DealRecorder for HttpDealRecorder {
    async fn record(&self, deal: &DealRecord) -> Result<DealView, ClientError> {
        let resp = self
            .http
            .post(format!("{}/deals", self.base_url))
            .json(deal)
            .send()
            .await?;
        Ok(resp.error_for_status()?.json().await?)
    }

    async fn history(&self, user_id: i64) -> Result<Vec<DealView>, ClientError> {
        let resp = self
            .http
            .get(format!("{}/deals", self.base_url))
            .query(&[("userId", user_id)])
            .send()
            .await?;
        Ok(resp.error_for_status()?.json().await?)
    }
}

/// `{error, details}` 에러 바디 → 메시지
fn error_message(body: &serde_json::Value) -> String {
    let error = body["error"].as_str().unwrap_or("Request failed");
    match body["details"].as_str() {
        Some(details) => format!("{}: {}", error, details),
        None => error.to_string(),
    }
}
