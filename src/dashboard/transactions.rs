//! Transaction Call Wrapper
//!
//! submit → wait → status 확인 → (성공 시) 1회 refresh + 알림
//!
//! 재시도, 롤백, idempotency key 없음. 실패하면 사용자가 다시 눌러야 함
//!
//! `from` 계정은 제출 시점에 연결된 계정. 대시보드가 비활성이면 제출하지 않음

use std::sync::Arc;

use ethers::types::{Address, TxHash};
use tokio::sync::watch;

use super::refresh::RefreshHandle;
use super::Notifier;
use crate::services::{ContractGateway, Operation, TxStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    Confirmed { tx_hash: TxHash },
    Failed { message: String },
}

impl TxOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, TxOutcome::Confirmed { .. })
    }
}

pub struct TransactionRunner {
    gateway: Arc<dyn ContractGateway>,
    account: watch::Receiver<Address>,
    refresh: RefreshHandle,
    notifier: Arc<dyn Notifier>,
}

impl TransactionRunner {
    pub fn new(
        gateway: Arc<dyn ContractGateway>,
        account: watch::Receiver<Address>,
        refresh: RefreshHandle,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            gateway,
            account,
            refresh,
            notifier,
        }
    }

    pub async fn execute(&self, op: Operation) -> TxOutcome {
        if !self.refresh.is_active() {
            return self.reject(op.name(), "Please connect a wallet".to_string());
        }

        let from = *self.account.borrow();
        let pending = match self.gateway.submit(from, &op).await {
            Ok(pending) => pending,
            Err(e) => return self.fail(&op, e.to_string()),
        };

        let tx_hash = pending.tx_hash();
        match pending.wait().await {
            Ok(TxStatus::Success) => {
                tracing::info!("{} confirmed: 0x{}", op.name(), hex::encode(tx_hash.as_bytes()));
                // owner가 unmount 되었으면 no-op
                self.refresh.refresh_now().await;
                self.notifier.success(&format!("{} transaction successful", op.name()));
                TxOutcome::Confirmed { tx_hash }
            }
            Ok(TxStatus::Failure) => self.fail(&op, format!("{} transaction failed", op.name())),
            Err(e) => self.fail(&op, e.to_string()),
        }
    }

    /// 실행 전 로컬 검증 실패 (제출하지 않음)
    pub fn reject(&self, op_name: &str, message: String) -> TxOutcome {
        tracing::warn!("{} not submitted: {}", op_name, message);
        self.notifier.error(&message);
        TxOutcome::Failed { message }
    }

    fn fail(&self, op: &Operation, message: String) -> TxOutcome {
        tracing::error!("Error during {}: {}", op.name(), message);
        self.notifier.error(&message);
        TxOutcome::Failed { message }
    }
}
