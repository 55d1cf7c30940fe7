//! Registration / Login / Session Endpoints
//!
//! # Interview Q&A
//!
//! Q: 세션을 서버에 저장하지 않는 이유는?
//! A: 토큰 자체가 세션 (HS512 JWT)
//!    - 세션 조회 = 서명 검증 + 만료 확인, DB 왕복 없음
//!    - role은 가입 후 바뀌지 않으므로 토큰에 넣어도 stale 문제 없음
//!
//! Q: 로그인 실패 시 "이메일 없음"과 "비밀번호 틀림"을 구분하는가?
//! A: 구분하지 않음. 둘 다 401 INVALID_CREDENTIALS (계정 존재 여부 노출 방지)

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db::{NewUser, User, UserRepository},
    error::ApiError,
    services::Session,
    types::{EthAddress, Role},
    AppState,
};

// ============ Request/Response Types ============

/// 가입 요청
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    /// 지갑 주소
    pub address: String,
    /// borrower | lender (대소문자 무관)
    #[serde(rename = "type")]
    pub user_type: String,
}

/// 비밀번호 해시를 뺀 사용자 정보
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    #[serde(rename = "id")]
    pub user_id: i64,
    pub email: String,
    pub address: String,
    #[serde(rename = "type")]
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user: UserView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub session: Session,
}

// ============ Handlers ============

/// POST /register
///
/// # Errors
///
/// - 400: 알 수 없는 type, 이메일/주소 형식 오류, 빈 비밀번호
/// - 409: 이미 가입된 이메일
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let role: Role = req.user_type.parse().map_err(ApiError::ValidationError)?;

    let email = normalize_email(&req.email);
    if !email.contains('@') {
        return Err(ApiError::ValidationError("Invalid email address".to_string()));
    }
    if req.password.is_empty() {
        return Err(ApiError::ValidationError("Password is required".to_string()));
    }
    let address = EthAddress::new(&req.address).map_err(ApiError::ValidationError)?;

    // argon2는 CPU 바운드 → blocking 풀에서 실행
    let sessions = state.sessions.clone();
    let password = req.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || sessions.hash_password(&password))
        .await
        .map_err(anyhow::Error::from)??;

    let user = state
        .store
        .create_user(&NewUser {
            email,
            password_hash,
            address: address.as_str().to_string(),
            role,
        })
        .await?;

    tracing::info!("Registered {} as {}", user.email, role);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: user_view(&user)?,
        }),
    ))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = normalize_email(&req.email);

    let user = match state.store.find_user_by_email(&email).await? {
        Some(user) => user,
        None => {
            tracing::debug!("login for unknown email {}", email);
            return Err(ApiError::InvalidCredentials);
        }
    };

    let sessions = state.sessions.clone();
    let stored_hash = user.password.clone();
    let password = req.password;
    let valid = tokio::task::spawn_blocking(move || sessions.verify_password(&stored_hash, &password))
        .await
        .map_err(anyhow::Error::from)?;
    if !valid {
        tracing::debug!("wrong password for {}", email);
        return Err(ApiError::InvalidCredentials);
    }

    let session = Session {
        user_id: user.user_id,
        email: user.email.clone(),
        address: user.address.clone(),
        role: stored_role(&user)?,
    };
    let token = state.sessions.issue(&session)?;

    tracing::info!("{} signed in", session.email);
    Ok(Json(LoginResponse { token, session }))
}

/// GET /auth/session
///
/// `Authorization: Bearer <token>` → 세션
pub async fn current_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Session>, ApiError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    match state.sessions.verify(token.trim()) {
        Ok(session) => Ok(Json(session)),
        Err(e) => {
            tracing::debug!("rejected session token: {:#}", e);
            Err(ApiError::Unauthorized)
        }
    }
}

// ============ Helpers ============

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn stored_role(user: &User) -> Result<Role, ApiError> {
    user.role().map_err(|e| {
        tracing::error!("user {} has unreadable role: {}", user.user_id, e);
        ApiError::InternalError
    })
}

fn user_view(user: &User) -> Result<UserView, ApiError> {
    Ok(UserView {
        user_id: user.user_id,
        email: user.email.clone(),
        address: user.address.clone(),
        role: stored_role(user)?,
        created_at: user.created_at,
    })
}
