//! Lender 대시보드
//!
//! deposit / withdraw 확정 시 딜 히스토리에 1건씩 기록

use std::sync::Arc;

use chrono::Utc;

use super::{DashboardContext, TxOutcome};
use crate::error::ClientError;
use crate::services::{DealRecorder, LenderPosition, Operation, Position};
use crate::types::{parse_base_units, DealRecord, DealType, DealView, Role};

pub struct LenderDashboard {
    ctx: DashboardContext,
    deals: Arc<dyn DealRecorder>,
}

impl LenderDashboard {
    pub fn new(ctx: DashboardContext, deals: Arc<dyn DealRecorder>) -> Result<Self, ClientError> {
        if ctx.session().role != Role::Lender {
            return Err(ClientError::Unauthorized);
        }
        Ok(Self { ctx, deals })
    }

    pub fn context(&self) -> &DashboardContext {
        &self.ctx
    }

    /// 마지막으로 조회된 포지션
    pub async fn position(&self) -> Option<LenderPosition> {
        match self.ctx.view().get().await {
            Some(Position::Lender(p)) => Some(p),
            _ => None,
        }
    }

    pub async fn deposit(&self, amount: &str) -> TxOutcome {
        let runner = self.ctx.runner();
        let value = match parse_base_units(amount) {
            Ok(value) => value,
            Err(e) => return runner.reject("Deposit", e),
        };

        let outcome = runner.execute(Operation::Deposit { amount: value }).await;
        if outcome.is_confirmed() {
            self.record(DealType::Deposit, value.to_string(), "0".to_string()).await;
        }
        outcome
    }

    /// 출금 금액 = 예치금 + 이자 (호출 시점에 다시 조회)
    pub async fn withdraw(&self) -> TxOutcome {
        let runner = self.ctx.runner();
        let position = match self.ctx.gateway().lender_position(self.ctx.account()).await {
            Ok(position) => position,
            Err(e) => return runner.reject("Withdraw", e.to_string()),
        };

        let outcome = runner.execute(Operation::Withdraw).await;
        if outcome.is_confirmed() {
            let total = position.deposit.saturating_add(position.interest_earned);
            self.record(DealType::Withdraw, total.to_string(), position.interest_earned.to_string())
                .await;
        }
        outcome
    }

    pub async fn history(&self) -> Result<Vec<DealView>, ClientError> {
        self.deals.history(self.ctx.session().user_id).await
    }

    // 트랜잭션은 이미 확정됨. 기록 실패는 알림만
    async fn record(&self, deal_type: DealType, amount: String, interest_gained: String) {
        let deal = DealRecord {
            deal_type,
            amount,
            interest_gained,
            date_time: Utc::now(),
            user_id: self.ctx.session().user_id,
        };

        match self.deals.record(&deal).await {
            Ok(saved) => tracing::debug!("recorded {} deal #{}", deal_type.as_str(), saved.id),
            Err(e) => {
                tracing::error!("Error recording {} deal: {}", deal_type.as_str(), e);
                self.ctx
                    .notifier()
                    .error(&format!("Failed to record {} history: {}", deal_type.as_str(), e));
            }
        }
    }
}
