//! Periodic Refresh
//!
//! 컨트랙트에는 push 알림이 없으므로 포지션을 주기적으로 다시 읽음.
//!
//! # Lifecycle
//!
//! ```text
//! start() ──▶ fetch (즉시) ──▶ fetch (+interval) ──▶ ... ──▶ stop() / drop
//!                                                        │
//!          RefreshHandle::refresh_now() ─────────────────┘ (stop 이후엔 no-op)
//! ```
//!
//! 읽기 호출은 idempotent → coalescing 없음

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::Address;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;
use crate::services::{ContractGateway, Position};
use crate::types::Role;

/// 포지션 읽기 경계
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn fetch(&self) -> Result<Position, ClientError>;
}

/// 폴링 주기 하한. `interval(0)`은 panic
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// 역할에 맞는 레지스트리에서 포지션 조회
///
/// 계정은 조회할 때마다 다시 읽음 (지갑 계정 전환 반영)
pub struct ContractPositionSource {
    gateway: Arc<dyn ContractGateway>,
    account: watch::Receiver<Address>,
    role: Role,
}

impl ContractPositionSource {
    pub fn new(gateway: Arc<dyn ContractGateway>, account: watch::Receiver<Address>, role: Role) -> Self {
        Self { gateway, account, role }
    }
}

#[async_trait]
impl PositionSource for ContractPositionSource {
    async fn fetch(&self) -> Result<Position, ClientError> {
        let account = *self.account.borrow();
        match self.role {
            Role::Lender => self.gateway.lender_position(account).await.map(Position::Lender),
            Role::Borrower => self.gateway.borrower_position(account).await.map(Position::Borrower),
        }
    }
}

/// 화면 표시용 포지션 (마지막 쓰기가 이김)
#[derive(Clone, Default)]
pub struct PositionView {
    inner: Arc<RwLock<Option<Position>>>,
}

impl PositionView {
    pub async fn get(&self) -> Option<Position> {
        self.inner.read().await.clone()
    }

    async fn set(&self, position: Position) {
        *self.inner.write().await = Some(position);
    }
}

struct Shared {
    source: Arc<dyn PositionSource>,
    view: PositionView,
    token: CancellationToken,
}

impl Shared {
    /// 1회 조회. 적용했으면 true
    async fn refresh_once(&self) -> bool {
        if self.token.is_cancelled() {
            return false;
        }

        match self.source.fetch().await {
            Ok(position) => {
                // 조회 중 stop 되었으면 결과 버림
                if self.token.is_cancelled() {
                    return false;
                }
                self.view.set(position).await;
                true
            }
            Err(e) => {
                tracing::warn!("Error fetching position: {}", e);
                false
            }
        }
    }
}

/// 취소 가능한 폴링 태스크
pub struct Refresher {
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl Refresher {
    /// 즉시 1회 조회 후 `interval`마다 반복
    ///
    /// `MIN_REFRESH_INTERVAL`보다 짧은 주기는 하한으로 올림
    pub fn start(source: Arc<dyn PositionSource>, view: PositionView, interval: Duration) -> Self {
        let interval = if interval < MIN_REFRESH_INTERVAL {
            tracing::warn!("refresh interval {:?} is too short, using {:?}", interval, MIN_REFRESH_INTERVAL);
            MIN_REFRESH_INTERVAL
        } else {
            interval
        };

        let shared = Arc::new(Shared {
            source,
            view,
            token: CancellationToken::new(),
        });

        let task_shared = shared.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = task_shared.token.cancelled() => break,
                    _ = ticker.tick() => {
                        task_shared.refresh_once().await;
                    }
                }
            }
            tracing::debug!("position refresher stopped");
        });

        Self {
            shared,
            task: Some(task),
        }
    }

    pub fn handle(&self) -> RefreshHandle {
        RefreshHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn view(&self) -> PositionView {
        self.shared.view.clone()
    }

    /// 세션/계정 변경 감시 태스크가 공유하는 취소 토큰
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.token.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.shared.token.is_cancelled()
    }

    pub fn stop(&mut self) {
        self.shared.token.cancel();
        self.task.take();
    }
}

impl Drop for Refresher {
    fn drop(&mut self) {
        self.shared.token.cancel();
    }
}

/// 트랜잭션 확정 후 1회 갱신용 핸들
///
/// 소유한 refresher가 멈췄거나 사라졌으면 아무것도 하지 않음
#[derive(Clone)]
pub struct RefreshHandle {
    shared: Weak<Shared>,
}

impl RefreshHandle {
    /// 소유한 refresher가 아직 폴링 중인지
    pub fn is_active(&self) -> bool {
        self.shared
            .upgrade()
            .map(|shared| !shared.token.is_cancelled())
            .unwrap_or(false)
    }

    pub async fn refresh_now(&self) -> bool {
        match self.shared.upgrade() {
            Some(shared) => shared.refresh_once().await,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mocks::MockContracts;
    use crate::services::LenderPosition;
    use ethers::types::U256;

    fn lender_source(contracts: Arc<MockContracts>) -> Arc<dyn PositionSource> {
        let (_tx, account) = watch::channel(Address::zero());
        Arc::new(ContractPositionSource::new(contracts, account, Role::Lender))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_immediately_then_every_interval() {
        let contracts = Arc::new(MockContracts::new());
        let mut refresher = Refresher::start(
            lender_source(contracts.clone()),
            PositionView::default(),
            Duration::from_secs(10),
        );

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(contracts.reads(), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(contracts.reads(), 2);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(contracts.reads(), 4);

        refresher.stop();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(contracts.reads(), 4);
        assert!(!refresher.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_view_tracks_latest_fetch() {
        let contracts = Arc::new(MockContracts::new());
        *contracts.lender.lock().unwrap() = LenderPosition {
            deposit: U256::from(1000u64),
            ..Default::default()
        };

        let refresher = Refresher::start(
            lender_source(contracts.clone()),
            PositionView::default(),
            Duration::from_secs(10),
        );
        tokio::time::sleep(Duration::from_millis(1)).await;

        match refresher.view().get().await {
            Some(Position::Lender(p)) => assert_eq!(p.deposit, U256::from(1000u64)),
            other => panic!("unexpected view: {:?}", other),
        }

        contracts.lender.lock().unwrap().deposit = U256::from(1500u64);
        tokio::time::sleep(Duration::from_secs(10)).await;

        match refresher.view().get().await {
            Some(Position::Lender(p)) => assert_eq!(p.deposit, U256::from(1500u64)),
            other => panic!("unexpected view: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_now_is_noop_after_stop_or_drop() {
        let contracts = Arc::new(MockContracts::new());
        let mut refresher = Refresher::start(
            lender_source(contracts.clone()),
            PositionView::default(),
            Duration::from_secs(10),
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
        let handle = refresher.handle();

        assert!(handle.is_active());
        assert!(handle.refresh_now().await);
        assert_eq!(contracts.reads(), 2);

        refresher.stop();
        assert!(!handle.is_active());
        assert!(!handle.refresh_now().await);

        drop(refresher);
        assert!(!handle.refresh_now().await);
        assert_eq!(contracts.reads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_clamped_and_keeps_polling() {
        let contracts = Arc::new(MockContracts::new());
        let refresher = Refresher::start(
            lender_source(contracts.clone()),
            PositionView::default(),
            Duration::ZERO,
        );

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(contracts.reads(), 1);

        tokio::time::sleep(MIN_REFRESH_INTERVAL * 3).await;
        assert_eq!(contracts.reads(), 4);
        assert!(refresher.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_follows_rebound_account() {
        let contracts = Arc::new(MockContracts::new());
        let (tx, account) = watch::channel(Address::from_low_u64_be(0xaa));
        let source = ContractPositionSource::new(contracts.clone(), account, Role::Borrower);

        source.fetch().await.unwrap();
        assert_eq!(contracts.last_read_account(), Some(Address::from_low_u64_be(0xaa)));

        tx.send_replace(Address::from_low_u64_be(0xbb));
        source.fetch().await.unwrap();
        assert_eq!(contracts.last_read_account(), Some(Address::from_low_u64_be(0xbb)));
    }
}
