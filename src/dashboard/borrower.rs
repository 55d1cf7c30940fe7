//! Borrower 대시보드
//!
//! # Flow
//!
//! ```text
//! getTokens → approve → stakeTokens → borrow → repay
//!                                         └─(기간 만료 & 미상환)─▶ claimCollateral
//! ```
//!
//! 이자율 변경은 관리자 계정만 가능

use chrono::Utc;
use ethers::types::{Address, U256};

use super::{DashboardContext, TxOutcome};
use crate::error::ClientError;
use crate::services::{BorrowerPosition, Operation, Position};
use crate::types::{parse_base_units, Role};

pub struct BorrowerDashboard {
    ctx: DashboardContext,
    admin: Option<Address>,
}

impl BorrowerDashboard {
    pub fn new(ctx: DashboardContext, admin: Option<Address>) -> Result<Self, ClientError> {
        if ctx.session().role != Role::Borrower {
            return Err(ClientError::Unauthorized);
        }
        Ok(Self { ctx, admin })
    }

    pub fn context(&self) -> &DashboardContext {
        &self.ctx
    }

    pub async fn position(&self) -> Option<BorrowerPosition> {
        match self.ctx.view().get().await {
            Some(Position::Borrower(p)) => Some(p),
            _ => None,
        }
    }

    /// `Address` 비교라 대소문자 무관
    pub fn is_admin(&self) -> bool {
        self.admin == Some(self.ctx.account())
    }

    pub async fn get_tokens(&self, amount: &str) -> TxOutcome {
        self.with_amount("Get Tokens", amount, |amount| Operation::GetTokens { amount })
            .await
    }

    pub async fn approve_tokens(&self, amount: &str) -> TxOutcome {
        self.with_amount("Approve Tokens", amount, |amount| Operation::ApproveTokens { amount })
            .await
    }

    pub async fn stake_tokens(&self, amount: &str) -> TxOutcome {
        self.with_amount("Stake Tokens", amount, |amount| Operation::StakeTokens { amount })
            .await
    }

    pub async fn repay(&self, amount: &str) -> TxOutcome {
        self.with_amount("Repay", amount, |amount| Operation::Repay { amount })
            .await
    }

    /// 금액과 기간(초) 모두 0보다 커야 제출
    pub async fn borrow(&self, amount: &str, duration: &str) -> TxOutcome {
        let runner = self.ctx.runner();
        let parsed = parse_base_units(amount).and_then(|amount| {
            let duration = parse_base_units(duration)
                .map_err(|_| format!("Invalid loan duration: '{}'", duration))?;
            Ok((amount, duration))
        });

        match parsed {
            Ok((amount, duration)) if amount.is_zero() || duration.is_zero() => runner.reject(
                "Borrow",
                "Please enter both loan amount and loan duration".to_string(),
            ),
            Ok((amount, duration)) => runner.execute(Operation::Borrow { amount, duration }).await,
            Err(e) => runner.reject("Borrow", e),
        }
    }

    pub async fn claim_staked_tokens(&self) -> TxOutcome {
        self.ctx.runner().execute(Operation::ClaimStakedTokens).await
    }

    /// 담보 청구
    ///
    /// 화면에 표시된 값이 아니라 호출 시점의 포지션으로 자격을 다시 계산.
    /// 확인과 제출 사이의 경합은 컨트랙트가 최종 판단
    pub async fn claim_collateral(&self) -> TxOutcome {
        let runner = self.ctx.runner();
        let account = self.ctx.account();

        let position = match self.ctx.gateway().borrower_position(account).await {
            Ok(position) => position,
            Err(e) => return runner.reject("Claim Collateral", e.to_string()),
        };

        let now = Utc::now().timestamp();
        if position.time_left(now) > 0 {
            return runner.reject("Claim Collateral", "Loan duration has not yet expired.".to_string());
        }
        if !position.can_claim_collateral(now) {
            return runner.reject("Claim Collateral", "Nothing left to claim".to_string());
        }

        runner.execute(Operation::ClaimCollateral { borrower: account }).await
    }

    /// 관리자 전용 (basis points)
    pub async fn change_interest_rate(&self, rate: &str) -> TxOutcome {
        if !self.is_admin() {
            return self
                .ctx
                .runner()
                .reject("Change Interest Rate", "Only the admin can change the interest rate".to_string());
        }
        self.with_amount("Change Interest Rate", rate, |rate| Operation::ChangeBorrowersInterestRate { rate })
            .await
    }

    async fn with_amount<F>(&self, name: &str, input: &str, op: F) -> TxOutcome
    where
        F: FnOnce(U256) -> Operation,
    {
        match parse_base_units(input) {
            Ok(amount) => self.ctx.runner().execute(op(amount)).await,
            Err(e) => self.ctx.runner().reject(name, e),
        }
    }
}
