//! Wallet/Session Reconciler
//!
//! 세션 인증 상태와 지갑 연결 상태를 하나의 "연결된 계정"으로 맞춤.
//!
//! # State Machine
//!
//! ```text
//!                 session 없음
//!   mount ──┬────────────────────────────▶ Unauthenticated ──▶ redirect(SignIn)
//!           │
//!           │ session 있음 → list_accounts()
//!           ├── 계정 없음 / 지갑 없음 ───▶ AuthenticatedNoWallet ──▶ redirect(WalletConnect)
//!           └── 계정 있음 ───────────────▶ AuthenticatedConnected(accounts[0])
//!
//!   accountsChanged([])        ──▶ AuthenticatedNoWallet
//!   accountsChanged([a, ..])   ──▶ AuthenticatedConnected(a)   (재인증 없음)
//!   disconnect()               ──▶ AuthenticatedNoWallet
//! ```
//!
//! 상태는 `watch` 채널로 노출. 전역 상태 없음

use std::sync::Arc;

use tokio::sync::watch;

use super::{Navigator, Route};
use crate::error::ClientError;
use crate::services::{Session, SessionSource, Subscription, WalletProvider};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcilerState {
    Unauthenticated,
    AuthenticatedNoWallet { session: Session },
    AuthenticatedConnected { session: Session, account: String },
}

impl ReconcilerState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            ReconcilerState::Unauthenticated => None,
            ReconcilerState::AuthenticatedNoWallet { session }
            | ReconcilerState::AuthenticatedConnected { session, .. } => Some(session),
        }
    }

    pub fn account(&self) -> Option<&str> {
        match self {
            ReconcilerState::AuthenticatedConnected { account, .. } => Some(account),
            _ => None,
        }
    }
}

/// 지갑이 없을 때의 동작
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectPolicy {
    /// 보호된 페이지: 지갑 연결 화면으로 이동
    Guard,
    /// 지갑 연결 화면 자체: 이동하지 않고 `connect_wallet()` 대기
    Stay,
}

pub struct WalletReconciler {
    session: Arc<dyn SessionSource>,
    wallet: Arc<dyn WalletProvider>,
    navigator: Arc<dyn Navigator>,
    policy: RedirectPolicy,
}

impl WalletReconciler {
    pub fn new(
        session: Arc<dyn SessionSource>,
        wallet: Arc<dyn WalletProvider>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            session,
            wallet,
            navigator,
            policy: RedirectPolicy::Guard,
        }
    }

    pub fn with_policy(mut self, policy: RedirectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 세션 조회 → 지갑 조회 → 리스너 등록
    ///
    /// 어떤 외부 실패도 Err로 올리지 않음. 상태로 degrade
    pub async fn mount(&self) -> MountedReconciler {
        let session = match self.session.current_session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("session lookup failed: {}", e);
                None
            }
        };

        let session = match session {
            Some(session) => session,
            None => {
                tracing::debug!("no session, redirecting to sign-in");
                self.navigator.redirect(Route::SignIn);
                let (tx, rx) = watch::channel(ReconcilerState::Unauthenticated);
                return MountedReconciler {
                    state_tx: Arc::new(tx),
                    state_rx: rx,
                    subscriptions: Vec::new(),
                    wallet: self.wallet.clone(),
                    navigator: self.navigator.clone(),
                    policy: self.policy,
                };
            }
        };

        let initial = match self.wallet.list_accounts().await {
            Ok(accounts) => match accounts.into_iter().next() {
                Some(account) => ReconcilerState::AuthenticatedConnected {
                    session: session.clone(),
                    account,
                },
                None => ReconcilerState::AuthenticatedNoWallet { session: session.clone() },
            },
            Err(ClientError::Unavailable(what)) => {
                tracing::info!("{} is not installed", what);
                ReconcilerState::AuthenticatedNoWallet { session: session.clone() }
            }
            Err(e) => {
                tracing::error!("Error checking wallet connection: {}", e);
                ReconcilerState::AuthenticatedNoWallet { session: session.clone() }
            }
        };

        if initial.account().is_none() && self.policy == RedirectPolicy::Guard {
            self.navigator.redirect(Route::WalletConnect);
        }

        let (tx, rx) = watch::channel(initial);
        let tx = Arc::new(tx);

        let accounts_sub = {
            let tx = tx.clone();
            let navigator = self.navigator.clone();
            let policy = self.policy;
            let session = session.clone();
            self.wallet.on_accounts_changed(Arc::new(move |accounts: &Vec<String>| {
                apply_accounts(&tx, navigator.as_ref(), policy, &session, accounts);
            }))
        };

        let disconnect_sub = {
            let tx = tx.clone();
            let navigator = self.navigator.clone();
            let policy = self.policy;
            let session = session.clone();
            self.wallet.on_disconnect(Arc::new(move |_: &()| {
                tracing::info!("wallet disconnected");
                apply_accounts(&tx, navigator.as_ref(), policy, &session, &[]);
            }))
        };

        MountedReconciler {
            state_tx: tx,
            state_rx: rx,
            subscriptions: vec![accounts_sub, disconnect_sub],
            wallet: self.wallet.clone(),
            navigator: self.navigator.clone(),
            policy: self.policy,
        }
    }
}

/// 계정 목록 변경 반영
///
/// 빈 목록 → NoWallet, 아니면 첫 번째 계정을 보관
fn apply_accounts(
    tx: &watch::Sender<ReconcilerState>,
    navigator: &dyn Navigator,
    policy: RedirectPolicy,
    session: &Session,
    accounts: &[String],
) {
    let next = match accounts.first() {
        Some(account) => ReconcilerState::AuthenticatedConnected {
            session: session.clone(),
            account: account.clone(),
        },
        None => ReconcilerState::AuthenticatedNoWallet { session: session.clone() },
    };

    let lost_wallet = next.account().is_none();
    let changed = tx.send_if_modified(|state| {
        if *state == next {
            false
        } else {
            *state = next;
            true
        }
    });

    if changed && lost_wallet {
        tracing::info!("Please connect a wallet");
        if policy == RedirectPolicy::Guard {
            navigator.redirect(Route::WalletConnect);
        }
    }
}

/// mount된 reconciler
///
/// drop 또는 `unmount()` 시 두 리스너 모두 해제
pub struct MountedReconciler {
    state_tx: Arc<watch::Sender<ReconcilerState>>,
    state_rx: watch::Receiver<ReconcilerState>,
    subscriptions: Vec<Subscription>,
    wallet: Arc<dyn WalletProvider>,
    navigator: Arc<dyn Navigator>,
    policy: RedirectPolicy,
}

impl MountedReconciler {
    pub fn state(&self) -> ReconcilerState {
        self.state_rx.borrow().clone()
    }

    pub fn account(&self) -> Option<String> {
        self.state_rx.borrow().account().map(str::to_string)
    }

    /// 상태 변경 구독
    pub fn watch(&self) -> watch::Receiver<ReconcilerState> {
        self.state_rx.clone()
    }

    /// 지갑 연결 요청 (`eth_requestAccounts`)
    ///
    /// 사용자가 거절해도 상태는 그대로. 에러는 로그 후 반환
    pub async fn connect_wallet(&self) -> Result<Option<String>, ClientError> {
        let session = match self.state_rx.borrow().session() {
            Some(session) => session.clone(),
            None => return Err(ClientError::Unauthorized),
        };

        match self.wallet.request_accounts().await {
            Ok(accounts) => {
                apply_accounts(&self.state_tx, self.navigator.as_ref(), self.policy, &session, &accounts);
                Ok(self.account())
            }
            Err(e) => {
                tracing::warn!("User denied account access: {}", e);
                Err(e)
            }
        }
    }

    /// 지갑 연결 화면의 "Go to Dashboard"
    ///
    /// 계정이 연결된 상태에서만 이동
    pub fn enter_dashboard(&self) -> Result<(), ClientError> {
        match &*self.state_rx.borrow() {
            ReconcilerState::AuthenticatedConnected { .. } => {}
            ReconcilerState::AuthenticatedNoWallet { .. } => {
                return Err(ClientError::Unavailable("Wallet".to_string()))
            }
            ReconcilerState::Unauthenticated => return Err(ClientError::Unauthorized),
        }
        self.navigator.redirect(Route::Dashboard);
        Ok(())
    }

    pub fn unmount(self) {
        drop(self);
    }
}

impl Drop for MountedReconciler {
    fn drop(&mut self) {
        for sub in self.subscriptions.drain(..) {
            sub.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::mock::RecordingNavigator;
    use crate::services::mocks::{MockWallet, StaticSession};
    use crate::types::Role;

    fn session() -> Session {
        Session {
            user_id: 1,
            email: "bob@example.com".to_string(),
            address: "0x1234567890123456789012345678901234567890".to_string(),
            role: Role::Borrower,
        }
    }

    fn reconciler(
        session: Option<Session>,
        wallet: Arc<MockWallet>,
        navigator: Arc<RecordingNavigator>,
    ) -> WalletReconciler {
        WalletReconciler::new(Arc::new(StaticSession(session)), wallet, navigator)
    }

    #[tokio::test]
    async fn test_no_session_redirects_without_wallet_queries() {
        let wallet = Arc::new(MockWallet::new(Some(vec!["0xABC"])));
        let navigator = Arc::new(RecordingNavigator::default());

        let mounted = reconciler(None, wallet.clone(), navigator.clone()).mount().await;

        assert_eq!(mounted.state(), ReconcilerState::Unauthenticated);
        assert_eq!(navigator.routes(), vec![Route::SignIn]);
        assert_eq!(wallet.list_calls(), 0);
        assert_eq!(wallet.accounts_changed.listener_count(), 0);
        assert_eq!(wallet.disconnect.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_session_with_account_connects() {
        let wallet = Arc::new(MockWallet::new(Some(vec!["0xABC"])));
        let navigator = Arc::new(RecordingNavigator::default());

        let mounted = reconciler(Some(session()), wallet, navigator.clone()).mount().await;

        assert_eq!(
            mounted.state(),
            ReconcilerState::AuthenticatedConnected {
                session: session(),
                account: "0xABC".to_string(),
            }
        );
        assert!(navigator.routes().is_empty());
    }

    #[tokio::test]
    async fn test_session_without_accounts_redirects_to_wallet_connect() {
        let wallet = Arc::new(MockWallet::new(Some(vec![])));
        let navigator = Arc::new(RecordingNavigator::default());

        let mounted = reconciler(Some(session()), wallet, navigator.clone()).mount().await;

        assert_eq!(mounted.state(), ReconcilerState::AuthenticatedNoWallet { session: session() });
        assert_eq!(navigator.routes(), vec![Route::WalletConnect]);
    }

    #[tokio::test]
    async fn test_missing_wallet_degrades() {
        let wallet = Arc::new(MockWallet::new(None));
        let navigator = Arc::new(RecordingNavigator::default());

        let mounted = reconciler(Some(session()), wallet, navigator).mount().await;

        assert_eq!(mounted.account(), None);
        assert!(mounted.state().session().is_some());
    }

    #[tokio::test]
    async fn test_held_account_follows_last_notification() {
        let wallet = Arc::new(MockWallet::new(Some(vec!["0xA"])));
        let navigator = Arc::new(RecordingNavigator::default());
        let mounted = reconciler(Some(session()), wallet.clone(), navigator).mount().await;

        let sequences: Vec<Vec<&str>> = vec![
            vec!["0xB", "0xC"],
            vec![],
            vec!["0xD"],
            vec!["0xD", "0xA"],
            vec!["0xE"],
            vec![],
        ];

        for accounts in sequences {
            let expected = accounts.first().map(|a| a.to_string());
            wallet.emit_accounts(accounts);
            assert_eq!(mounted.account(), expected);
        }
    }

    #[tokio::test]
    async fn test_account_change_keeps_session() {
        let wallet = Arc::new(MockWallet::new(Some(vec!["0xA"])));
        let navigator = Arc::new(RecordingNavigator::default());
        let mounted = reconciler(Some(session()), wallet.clone(), navigator.clone()).mount().await;

        wallet.emit_accounts(vec!["0xB"]);

        assert_eq!(mounted.state().session(), Some(&session()));
        assert!(navigator.routes().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_drops_account() {
        let wallet = Arc::new(MockWallet::new(Some(vec!["0xA"])));
        let navigator = Arc::new(RecordingNavigator::default());
        let mounted = reconciler(Some(session()), wallet.clone(), navigator.clone()).mount().await;

        wallet.emit_disconnect();

        assert_eq!(mounted.state(), ReconcilerState::AuthenticatedNoWallet { session: session() });
        assert_eq!(navigator.routes(), vec![Route::WalletConnect]);
    }

    #[tokio::test]
    async fn test_unmount_deregisters_both_listeners() {
        let wallet = Arc::new(MockWallet::new(Some(vec!["0xA"])));
        let navigator = Arc::new(RecordingNavigator::default());
        let mounted = reconciler(Some(session()), wallet.clone(), navigator.clone()).mount().await;
        let rx = mounted.watch();

        assert_eq!(wallet.accounts_changed.listener_count(), 1);
        assert_eq!(wallet.disconnect.listener_count(), 1);

        mounted.unmount();

        assert_eq!(wallet.accounts_changed.listener_count(), 0);
        assert_eq!(wallet.disconnect.listener_count(), 0);

        wallet.emit_accounts(vec![]);
        wallet.emit_disconnect();
        assert_eq!(rx.borrow().account(), Some("0xA"));
        assert!(navigator.routes().is_empty());
    }

    #[tokio::test]
    async fn test_remount_does_not_duplicate_listeners() {
        let wallet = Arc::new(MockWallet::new(Some(vec!["0xA"])));
        let navigator = Arc::new(RecordingNavigator::default());
        let r = reconciler(Some(session()), wallet.clone(), navigator);

        for _ in 0..3 {
            let mounted = r.mount().await;
            drop(mounted);
        }
        let _mounted = r.mount().await;

        assert_eq!(wallet.accounts_changed.listener_count(), 1);
        assert_eq!(wallet.disconnect.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_wallet_connect_page_stays_and_connects() {
        let wallet = Arc::new(MockWallet::new(Some(vec![])));
        let navigator = Arc::new(RecordingNavigator::default());
        let mounted = reconciler(Some(session()), wallet.clone(), navigator.clone())
            .with_policy(RedirectPolicy::Stay)
            .mount()
            .await;

        assert!(navigator.routes().is_empty());
        assert!(mounted.connect_wallet().await.is_err());
        assert_eq!(
            mounted.enter_dashboard(),
            Err(ClientError::Unavailable("Wallet".to_string()))
        );
        assert!(navigator.routes().is_empty());

        wallet.grant_on_request(vec!["0xF00"]);
        let account = mounted.connect_wallet().await.unwrap();
        assert_eq!(account.as_deref(), Some("0xF00"));

        assert_eq!(mounted.enter_dashboard(), Ok(()));
        assert_eq!(navigator.routes(), vec![Route::Dashboard]);
    }

    #[tokio::test]
    async fn test_signed_out_user_cannot_enter_dashboard() {
        let wallet = Arc::new(MockWallet::new(Some(vec!["0xABC"])));
        let navigator = Arc::new(RecordingNavigator::default());
        let mounted = reconciler(None, wallet, navigator.clone()).mount().await;

        assert_eq!(mounted.enter_dashboard(), Err(ClientError::Unauthorized));
        assert_eq!(navigator.routes(), vec![Route::SignIn]);
    }
}
