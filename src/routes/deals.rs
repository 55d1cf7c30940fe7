//! Lender Deal History Endpoints
//!
//! append-only. 수정/삭제 경로 없음

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::{
    db::{Deal, DealRepository, NewDeal, UserRepository},
    error::ApiError,
    types::{parse_base_units, DealRecord, DealType, DealView},
    AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealsQuery {
    pub user_id: i64,
}

/// GET /deals?userId=
///
/// 최신순 정렬
pub async fn list_deals(
    State(state): State<AppState>,
    Query(query): Query<DealsQuery>,
) -> Result<Json<Vec<DealView>>, ApiError> {
    let deals = state.store.list_deals(query.user_id).await?;
    let views = deals.into_iter().map(deal_view).collect::<Result<Vec<_>, _>>()?;
    Ok(Json(views))
}

/// POST /deals
///
/// # Request Body
///
/// ```json
/// {
///   "type": "withdraw",
///   "amount": "1050",
///   "interestGained": "50",
///   "dateTime": "2024-06-01T12:00:00Z",
///   "userId": 7
/// }
/// ```
pub async fn create_deal(
    State(state): State<AppState>,
    Json(req): Json<DealRecord>,
) -> Result<(StatusCode, Json<DealView>), ApiError> {
    let amount = parse_base_units(&req.amount).map_err(ApiError::ValidationError)?;
    let interest = parse_base_units(&req.interest_gained).map_err(ApiError::ValidationError)?;

    if state.store.find_user_by_id(req.user_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("User {}", req.user_id)));
    }

    // 숫자 문자열 정규화 ("007" → "7")
    let deal = state
        .store
        .insert_deal(&NewDeal {
            user_id: req.user_id,
            deal_type: req.deal_type,
            amount: amount.to_string(),
            interest_gained: interest.to_string(),
            date_time: req.date_time,
        })
        .await?;

    tracing::info!("user {} {} of {} recorded", deal.user_id, deal.deal_type, deal.amount);
    Ok((StatusCode::CREATED, Json(deal_view(deal)?)))
}

fn deal_view(deal: Deal) -> Result<DealView, ApiError> {
    let deal_type: DealType = deal.deal_type.parse().map_err(|e| {
        tracing::error!("deal {} has unreadable type: {}", deal.id, e);
        ApiError::InternalError
    })?;

    Ok(DealView {
        id: deal.id,
        user_id: deal.user_id,
        deal_type,
        amount: deal.amount,
        interest_gained: deal.interest_gained,
        date_time: deal.date_time,
    })
}
