//! Contract Gateway
//!
//! Escrow / Borrower / Lender / Token 컨트랙트 호출 경계.
//!
//! # Contract Layout
//!
//! ```text
//!              ┌──────────────┐
//!   write ───▶ │    Escrow    │ ── lenderContract() ──▶ Lender registry (read)
//!              │              │ ── borrowerContract() ─▶ Borrower registry (read)
//!              └──────────────┘
//!   approve ─▶ PlatformToken
//! ```
//!
//! 금융 로직은 전부 컨트랙트 쪽. 여기서는 호출과 결과 해석만 담당

use std::sync::Arc;

use async_trait::async_trait;
use ethers::contract::{ContractError, FunctionCall};
use ethers::core::abi::Detokenize;
use ethers::providers::{Http, Middleware, PendingTransaction, Provider};
use ethers::types::{Address, TxHash, U256, U64};
use serde::Serialize;

use crate::error::ClientError;

pub mod bindings {
    pub mod escrow {
        ethers::contract::abigen!(
            Escrow,
            r#"[
                function lenderContract() external view returns (address)
                function borrowerContract() external view returns (address)
                function deposit() external payable
                function withdraw() external
                function getTokens(uint256 amount) external
                function borrow(uint256 amount, uint256 duration) external
                function repay() external payable
                function claimCollateral(address borrower) external
                function stakeTokens(uint256 amount) external
                function claimStackedTokens() external
                function changeBorrowersInterestRate(uint256 rate) external
            ]"#
        );
    }

    pub mod lender {
        ethers::contract::abigen!(
            LenderRegistry,
            r#"[
                function lenders(address lender) external view returns (uint256 amount, uint256 depositTime)
                function totalInterestGained(address lender) external view returns (uint256)
                function interestRate() external view returns (uint256)
            ]"#
        );
    }

    pub mod borrower {
        ethers::contract::abigen!(
            BorrowerRegistry,
            r#"[
                function borrowers(address borrower) external view returns (uint256 loanAmount, uint256 repaymentAmount, uint256 stackedTokens, uint256 loanDuration, uint256 borrowTime)
                function interestRate() external view returns (uint256)
            ]"#
        );
    }

    pub mod token {
        ethers::contract::abigen!(
            PlatformToken,
            r#"[
                function approve(address spender, uint256 amount) external returns (bool)
            ]"#
        );
    }
}

use bindings::borrower::BorrowerRegistry;
use bindings::escrow::Escrow;
use bindings::lender::LenderRegistry;
use bindings::token::PlatformToken;

/// 상태 변경 호출 (write)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// escrow.deposit() payable
    Deposit { amount: U256 },
    /// escrow.withdraw()
    Withdraw,
    /// escrow.getTokens(amount)
    GetTokens { amount: U256 },
    /// token.approve(escrow, amount)
    ApproveTokens { amount: U256 },
    /// escrow.borrow(amount, duration)
    Borrow { amount: U256, duration: U256 },
    /// escrow.repay() payable
    Repay { amount: U256 },
    /// escrow.claimCollateral(borrower)
    ClaimCollateral { borrower: Address },
    /// escrow.stakeTokens(amount)
    StakeTokens { amount: U256 },
    /// escrow.claimStackedTokens()
    ClaimStakedTokens,
    /// escrow.changeBorrowersInterestRate(rate) - admin
    ChangeBorrowersInterestRate { rate: U256 },
}

impl Operation {
    /// 사용자 알림/로그용 이름
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Deposit { .. } => "Deposit",
            Operation::Withdraw => "Withdraw",
            Operation::GetTokens { .. } => "Get Tokens",
            Operation::ApproveTokens { .. } => "Approve Tokens",
            Operation::Borrow { .. } => "Borrow",
            Operation::Repay { .. } => "Repay",
            Operation::ClaimCollateral { .. } => "Claim Collateral",
            Operation::StakeTokens { .. } => "Stake Tokens",
            Operation::ClaimStakedTokens => "Claim Stacked Tokens",
            Operation::ChangeBorrowersInterestRate { .. } => "Change Interest Rate",
        }
    }
}

/// 트랜잭션 확정 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Success,
    Failure,
}

/// Lender 포지션 (volatile view)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LenderPosition {
    pub deposit: U256,
    pub interest_earned: U256,
    /// basis points (500 = 5%)
    pub interest_rate: U256,
}

/// Borrower 포지션 (volatile view)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BorrowerPosition {
    pub loan_amount: U256,
    pub repayment_amount: U256,
    pub staked_tokens: U256,
    /// 초 단위
    pub loan_duration: U256,
    /// unix timestamp (초)
    pub borrow_time: U256,
    pub interest_rate: U256,
}

impl BorrowerPosition {
    /// 남은 상환 기간 (초). 음수면 기간 만료
    pub fn time_left(&self, now: i64) -> i128 {
        let elapsed = (now as i128).saturating_sub(saturating_i128(self.borrow_time));
        saturating_i128(self.loan_duration).saturating_sub(elapsed)
    }

    /// 담보 청구 가능 여부
    ///
    /// 대출 기간 만료 AND 미상환 금액 > 0
    pub fn can_claim_collateral(&self, now: i64) -> bool {
        self.time_left(now) <= 0 && !self.repayment_amount.is_zero()
    }
}

fn saturating_i128(value: U256) -> i128 {
    if value > U256::from(i128::MAX as u128) {
        i128::MAX
    } else {
        value.as_u128() as i128
    }
}

/// 화면에 표시되는 포지션
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "data")]
pub enum Position {
    Lender(LenderPosition),
    Borrower(BorrowerPosition),
}

/// 제출된 트랜잭션 핸들
#[async_trait]
pub trait PendingTx: Send {
    fn tx_hash(&self) -> TxHash;

    /// 블록 포함까지 대기 후 상태 반환
    async fn wait(self: Box<Self>) -> Result<TxStatus, ClientError>;
}

/// 컨트랙트 경계
#[async_trait]
pub trait ContractGateway: Send + Sync {
    async fn lender_position(&self, account: Address) -> Result<LenderPosition, ClientError>;

    async fn borrower_position(&self, account: Address) -> Result<BorrowerPosition, ClientError>;

    /// 서명자/컨트랙트 거절, 네트워크 오류 → `ClientError::Rejected` / `Transport`
    async fn submit(&self, from: Address, op: &Operation) -> Result<Box<dyn PendingTx>, ClientError>;
}

/// ethers 기반 구현
///
/// 트랜잭션은 `from` 계정으로 전송 → 노드(지갑)가 서명
pub struct EthersContracts {
    provider: Arc<Provider<Http>>,
    escrow: Address,
    token: Option<Address>,
    confirmations: usize,
}

impl EthersContracts {
    pub fn new(provider: Arc<Provider<Http>>, escrow: Address, token: Option<Address>) -> Self {
        Self {
            provider,
            escrow,
            token,
            confirmations: 1,
        }
    }

    fn escrow(&self) -> Escrow<Provider<Http>> {
        Escrow::new(self.escrow, self.provider.clone())
    }

    async fn lender_registry(&self) -> Result<LenderRegistry<Provider<Http>>, ClientError> {
        let address = self.escrow().lender_contract().call().await.map_err(contract_error)?;
        Ok(LenderRegistry::new(address, self.provider.clone()))
    }

    async fn borrower_registry(&self) -> Result<BorrowerRegistry<Provider<Http>>, ClientError> {
        let address = self.escrow().borrower_contract().call().await.map_err(contract_error)?;
        Ok(BorrowerRegistry::new(address, self.provider.clone()))
    }
}

/// 컨트랙트 에러 → 사용자에게 보여줄 메시지
///
/// revert reason 문자열이 있으면 그대로 사용
fn contract_error<M: Middleware>(err: ContractError<M>) -> ClientError {
    match err.decode_revert::<String>() {
        Some(reason) => ClientError::Rejected(reason),
        None if err.is_revert() => ClientError::Rejected(err.to_string()),
        None => ClientError::Transport(err.to_string()),
    }
}

async fn send<D: Detokenize>(
    call: FunctionCall<Arc<Provider<Http>>, Provider<Http>, D>,
) -> Result<TxHash, ClientError> {
    let pending = call.send().await.map_err(contract_error)?;
    Ok(*pending)
}

#[async_trait]
impl ContractGateway for EthersContracts {
    async fn lender_position(&self, account: Address) -> Result<LenderPosition, ClientError> {
        let registry = self.lender_registry().await?;

        let (amount, _deposit_time) = registry.lenders(account).call().await.map_err(contract_error)?;
        let interest = registry.total_interest_gained(account).call().await.map_err(contract_error)?;
        let rate = registry.interest_rate().call().await.map_err(contract_error)?;

        Ok(LenderPosition {
            deposit: amount,
            interest_earned: interest,
            interest_rate: rate,
        })
    }

    async fn borrower_position(&self, account: Address) -> Result<BorrowerPosition, ClientError> {
        let registry = self.borrower_registry().await?;

        let (loan_amount, repayment_amount, staked_tokens, loan_duration, borrow_time) =
            registry.borrowers(account).call().await.map_err(contract_error)?;
        let rate = registry.interest_rate().call().await.map_err(contract_error)?;

        Ok(BorrowerPosition {
            loan_amount,
            repayment_amount,
            staked_tokens,
            loan_duration,
            borrow_time,
            interest_rate: rate,
        })
    }

    async fn submit(&self, from: Address, op: &Operation) -> Result<Box<dyn PendingTx>, ClientError> {
        let escrow = self.escrow();

        let tx_hash = match op.clone() {
            Operation::Deposit { amount } => send(escrow.deposit().value(amount).from(from)).await?,
            Operation::Withdraw => send(escrow.withdraw().from(from)).await?,
            Operation::GetTokens { amount } => send(escrow.get_tokens(amount).from(from)).await?,
            Operation::ApproveTokens { amount } => {
                let token = self
                    .token
                    .ok_or_else(|| ClientError::Unavailable("Token contract".to_string()))?;
                let token = PlatformToken::new(token, self.provider.clone());
                send(token.approve(self.escrow, amount).from(from)).await?
            }
            Operation::Borrow { amount, duration } => {
                send(escrow.borrow(amount, duration).from(from)).await?
            }
            Operation::Repay { amount } => send(escrow.repay().value(amount).from(from)).await?,
            Operation::ClaimCollateral { borrower } => {
                send(escrow.claim_collateral(borrower).from(from)).await?
            }
            Operation::StakeTokens { amount } => send(escrow.stake_tokens(amount).from(from)).await?,
            Operation::ClaimStakedTokens => send(escrow.claim_stacked_tokens().from(from)).await?,
            Operation::ChangeBorrowersInterestRate { rate } => {
                send(escrow.change_borrowers_interest_rate(rate).from(from)).await?
            }
        };

        tracing::info!("{} submitted: 0x{}", op.name(), hex::encode(tx_hash.as_bytes()));

        Ok(Box::new(EthersPendingTx {
            provider: self.provider.clone(),
            tx_hash,
            confirmations: self.confirmations,
        }))
    }
}

struct EthersPendingTx {
    provider: Arc<Provider<Http>>,
    tx_hash: TxHash,
    confirmations: usize,
}

#[async_trait]
impl PendingTx for EthersPendingTx {
    fn tx_hash(&self) -> TxHash {
        self.tx_hash
    }

    async fn wait(self: Box<Self>) -> Result<TxStatus, ClientError> {
        let receipt = PendingTransaction::new(self.tx_hash, self.provider.as_ref())
            .confirmations(self.confirmations)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        // receipt 없음 = mempool에서 drop
        Ok(match receipt {
            Some(r) if r.status == Some(U64::from(1)) => TxStatus::Success,
            _ => TxStatus::Failure,
        })
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// 미리 정해둔 결과를 돌려주는 컨트랙트
    pub struct MockContracts {
        pub lender: Mutex<LenderPosition>,
        pub borrower: Mutex<BorrowerPosition>,
        /// None이면 submit 자체가 실패 (서명자 거절)
        pub next_status: Mutex<Option<TxStatus>>,
        pub reject_message: String,
        pub submitted: Mutex<Vec<Operation>>,
        /// 제출된 트랜잭션의 `from` 계정
        pub senders: Mutex<Vec<Address>>,
        /// 포지션 조회 대상 계정
        pub read_accounts: Mutex<Vec<Address>>,
        pub lender_reads: Mutex<usize>,
        pub borrower_reads: Mutex<usize>,
    }

    impl MockContracts {
        pub fn new() -> Self {
            Self {
                lender: Mutex::new(LenderPosition::default()),
                borrower: Mutex::new(BorrowerPosition::default()),
                next_status: Mutex::new(Some(TxStatus::Success)),
                reject_message: "user rejected transaction".to_string(),
                submitted: Mutex::new(Vec::new()),
                senders: Mutex::new(Vec::new()),
                read_accounts: Mutex::new(Vec::new()),
                lender_reads: Mutex::new(0),
                borrower_reads: Mutex::new(0),
            }
        }

        pub fn set_status(&self, status: Option<TxStatus>) {
            *self.next_status.lock().unwrap() = status;
        }

        pub fn reads(&self) -> usize {
            *self.lender_reads.lock().unwrap() + *self.borrower_reads.lock().unwrap()
        }

        pub fn submitted(&self) -> Vec<Operation> {
            self.submitted.lock().unwrap().clone()
        }

        pub fn senders(&self) -> Vec<Address> {
            self.senders.lock().unwrap().clone()
        }

        pub fn last_read_account(&self) -> Option<Address> {
            self.read_accounts.lock().unwrap().last().copied()
        }
    }

    struct Ready(TxStatus);

    #[async_trait]
    impl PendingTx for Ready {
        fn tx_hash(&self) -> TxHash {
            TxHash::repeat_byte(0xab)
        }

        async fn wait(self: Box<Self>) -> Result<TxStatus, ClientError> {
            Ok(self.0)
        }
    }

    #[async_trait]
    impl ContractGateway for MockContracts {
        async fn lender_position(&self, account: Address) -> Result<LenderPosition, ClientError> {
            self.read_accounts.lock().unwrap().push(account);
            *self.lender_reads.lock().unwrap() += 1;
            Ok(self.lender.lock().unwrap().clone())
        }

        async fn borrower_position(&self, account: Address) -> Result<BorrowerPosition, ClientError> {
            self.read_accounts.lock().unwrap().push(account);
            *self.borrower_reads.lock().unwrap() += 1;
            Ok(self.borrower.lock().unwrap().clone())
        }

        async fn submit(&self, from: Address, op: &Operation) -> Result<Box<dyn PendingTx>, ClientError> {
            self.submitted.lock().unwrap().push(op.clone());
            self.senders.lock().unwrap().push(from);
            match *self.next_status.lock().unwrap() {
                Some(status) => Ok(Box::new(Ready(status))),
                None => Err(ClientError::Rejected(self.reject_message.clone())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(duration: u64, borrow_time: u64, repayment: u64) -> BorrowerPosition {
        BorrowerPosition {
            loan_duration: U256::from(duration),
            borrow_time: U256::from(borrow_time),
            repayment_amount: U256::from(repayment),
            ..Default::default()
        }
    }

    #[test]
    fn test_time_left() {
        let p = position(3600, 1_000, 0);
        assert_eq!(p.time_left(1_000), 3600);
        assert_eq!(p.time_left(4_600), 0);
        assert_eq!(p.time_left(5_000), -400);
    }

    #[test]
    fn test_claim_requires_expired_loan() {
        let p = position(3600, 1_000, 500);
        assert!(!p.can_claim_collateral(1_001));
        assert!(!p.can_claim_collateral(4_599));
        assert!(p.can_claim_collateral(4_600));
    }

    #[test]
    fn test_claim_requires_outstanding_repayment() {
        let p = position(10, 1_000, 0);
        assert!(!p.can_claim_collateral(100_000));
    }

    #[test]
    fn test_huge_values_do_not_overflow() {
        let p = BorrowerPosition {
            loan_duration: U256::MAX,
            borrow_time: U256::MAX,
            repayment_amount: U256::one(),
            ..Default::default()
        };
        assert!(!p.can_claim_collateral(0));
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::ClaimStakedTokens.name(), "Claim Stacked Tokens");
        assert_eq!(Operation::Deposit { amount: U256::one() }.name(), "Deposit");
    }
}
