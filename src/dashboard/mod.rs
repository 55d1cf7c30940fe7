//! Dashboard Core
//!
//! 브라우저 대시보드가 하던 상태 관리를 명시적인 컨텍스트로 옮긴 것.
//!
//! # Pipeline
//!
//! ```text
//! SessionSource ─▶ WalletReconciler ─▶ DashboardContext ─┬─▶ Refresher (폴링)
//!                                                        └─▶ TransactionRunner
//!                                                               ├─ LenderDashboard
//!                                                               └─ BorrowerDashboard
//! ```
//!
//! 전역 상태 없음. 모든 의존성은 생성 시 주입

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use ethers::types::Address;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub mod reconciler;
pub mod refresh;
pub mod transactions;
mod lender;
mod borrower;
mod live;

pub use borrower::BorrowerDashboard;
pub use lender::LenderDashboard;
pub use live::LiveBackends;
pub use reconciler::{MountedReconciler, ReconcilerState, RedirectPolicy, WalletReconciler};
pub use refresh::{ContractPositionSource, PositionSource, PositionView, RefreshHandle, Refresher};
pub use transactions::{TransactionRunner, TxOutcome};

use crate::error::ClientError;
use crate::services::{ContractGateway, Session};

/// 이동할 화면
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    SignIn,
    WalletConnect,
    Dashboard,
}

/// 화면 전환 경계
pub trait Navigator: Send + Sync {
    fn redirect(&self, route: Route);
}

/// 사용자 알림 경계
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

/// 알림을 로그로만 남기는 기본 구현
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn success(&self, message: &str) {
        tracing::info!(target: "notification", "{}", message);
    }

    fn error(&self, message: &str) {
        tracing::warn!(target: "notification", "{}", message);
    }
}

/// 세션 하나에 대한 대시보드 컨텍스트
///
/// mount 시 폴링 시작, unmount/drop 시 폴링 중지.
/// 지갑 계정이 바뀌면 폴링과 트랜잭션 모두 새 계정으로 다시 묶음
pub struct DashboardContext {
    session: Session,
    account: Arc<watch::Sender<Address>>,
    gateway: Arc<dyn ContractGateway>,
    notifier: Arc<dyn Notifier>,
    refresher: Refresher,
    runner: TransactionRunner,
}

impl DashboardContext {
    /// `AuthenticatedConnected` 상태에서만 생성 가능
    pub fn mount(
        state: &ReconcilerState,
        gateway: Arc<dyn ContractGateway>,
        notifier: Arc<dyn Notifier>,
        refresh_interval: Duration,
    ) -> Result<Self, ClientError> {
        let (session, account) = match state {
            ReconcilerState::AuthenticatedConnected { session, account } => (session.clone(), account),
            ReconcilerState::AuthenticatedNoWallet { .. } => {
                return Err(ClientError::Unavailable("Wallet".to_string()))
            }
            ReconcilerState::Unauthenticated => return Err(ClientError::Unauthorized),
        };

        let account = Address::from_str(account)
            .map_err(|_| ClientError::InvalidInput(format!("Invalid account address: {}", account)))?;

        tracing::info!("dashboard mounted for {} ({:?})", session.email, account);

        let (account_tx, account_rx) = watch::channel(account);
        let source = Arc::new(ContractPositionSource::new(gateway.clone(), account_rx.clone(), session.role));
        let refresher = Refresher::start(source, PositionView::default(), refresh_interval);
        let runner = TransactionRunner::new(gateway.clone(), account_rx, refresher.handle(), notifier.clone());

        Ok(Self {
            session,
            account: Arc::new(account_tx),
            gateway,
            notifier,
            refresher,
            runner,
        })
    }

    /// reconciler 상태 추적
    ///
    /// - 다른 계정으로 전환: 새 계정으로 다시 묶고 즉시 1회 조회
    /// - 지갑 연결 해제 / 세션 없음: 폴링 중지
    pub fn follow(&self, mut states: watch::Receiver<ReconcilerState>) -> JoinHandle<()> {
        let token = self.refresher.cancellation_token();
        let refresh = self.refresher.handle();
        let account = self.account.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    changed = states.changed() => {
                        let current = match changed {
                            Ok(()) => states.borrow().account().and_then(|a| Address::from_str(a).ok()),
                            Err(_) => None,
                        };

                        let Some(next) = current else {
                            tracing::info!("wallet or session lost, stopping position refresh");
                            token.cancel();
                            break;
                        };

                        let switched = account.send_if_modified(|held| {
                            if *held == next {
                                false
                            } else {
                                *held = next;
                                true
                            }
                        });
                        if switched {
                            tracing::info!("wallet account switched to {:?}", next);
                            refresh.refresh_now().await;
                        }
                    }
                }
            }
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// 현재 연결된 계정
    pub fn account(&self) -> Address {
        *self.account.borrow()
    }

    pub fn view(&self) -> PositionView {
        self.refresher.view()
    }

    pub fn is_active(&self) -> bool {
        self.refresher.is_running()
    }

    pub fn runner(&self) -> &TransactionRunner {
        &self.runner
    }

    pub fn gateway(&self) -> &Arc<dyn ContractGateway> {
        &self.gateway
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn unmount(mut self) {
        self.refresher.stop();
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mocks::{MockContracts, MockWallet, StaticSession};
    use crate::types::Role;
    use mock::{RecordingNavigator, RecordingNotifier};

    const ACCOUNT: &str = "0x00000000000000000000000000000000000000aa";

    fn session() -> Session {
        Session {
            user_id: 3,
            email: "carol@example.com".to_string(),
            address: ACCOUNT.to_string(),
            role: Role::Lender,
        }
    }

    #[tokio::test]
    async fn test_mount_requires_connected_wallet() {
        let contracts = Arc::new(MockContracts::new());
        let notifier = Arc::new(TracingNotifier);

        let err = DashboardContext::mount(
            &ReconcilerState::Unauthenticated,
            contracts.clone(),
            notifier.clone(),
            Duration::from_secs(10),
        )
        .err();
        assert_eq!(err, Some(ClientError::Unauthorized));

        let err = DashboardContext::mount(
            &ReconcilerState::AuthenticatedNoWallet { session: session() },
            contracts,
            notifier,
            Duration::from_secs(10),
        )
        .err();
        assert!(matches!(err, Some(ClientError::Unavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_stops_when_wallet_disconnects() {
        let wallet = Arc::new(MockWallet::new(Some(vec![ACCOUNT])));
        let reconciler = WalletReconciler::new(
            Arc::new(StaticSession(Some(session()))),
            wallet.clone(),
            Arc::new(RecordingNavigator::default()),
        );
        let mounted = reconciler.mount().await;

        let contracts = Arc::new(MockContracts::new());
        let ctx = DashboardContext::mount(
            &mounted.state(),
            contracts.clone(),
            Arc::new(RecordingNotifier::default()),
            Duration::from_secs(10),
        )
        .unwrap();
        let _follower = ctx.follow(mounted.watch());

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(ctx.is_active());
        assert_eq!(contracts.reads(), 1);

        wallet.emit_disconnect();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(!ctx.is_active());
        assert_eq!(contracts.reads(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_account_switch_rebinds_polling_and_submissions() {
        const NEXT: &str = "0x00000000000000000000000000000000000000bb";
        let wallet = Arc::new(MockWallet::new(Some(vec![ACCOUNT])));
        let reconciler = WalletReconciler::new(
            Arc::new(StaticSession(Some(session()))),
            wallet.clone(),
            Arc::new(RecordingNavigator::default()),
        );
        let mounted = reconciler.mount().await;

        let contracts = Arc::new(MockContracts::new());
        let ctx = DashboardContext::mount(
            &mounted.state(),
            contracts.clone(),
            Arc::new(RecordingNotifier::default()),
            Duration::from_secs(10),
        )
        .unwrap();
        let _follower = ctx.follow(mounted.watch());

        tokio::time::sleep(Duration::from_millis(1)).await;
        let reads_before = contracts.reads();

        wallet.emit_accounts(vec![NEXT]);
        tokio::time::sleep(Duration::from_secs(35)).await;

        let next = Address::from_str(NEXT).unwrap();
        assert!(ctx.is_active());
        assert_eq!(ctx.account(), next);
        assert!(contracts.reads() > reads_before);
        assert_eq!(contracts.last_read_account(), Some(next));

        let outcome = ctx.runner().execute(crate::services::Operation::Withdraw).await;
        assert!(outcome.is_confirmed());
        assert_eq!(contracts.senders(), vec![next]);

        // 연결 해제 후에는 제출 안 함
        wallet.emit_accounts(vec![]);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!ctx.is_active());
        assert!(!ctx.runner().execute(crate::services::Operation::Withdraw).await.is_confirmed());
        assert_eq!(contracts.senders(), vec![next]);
    }
}
