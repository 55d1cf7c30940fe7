//! Wallet Provider
//!
//! 지갑(서명 주체) 경계와 이벤트 구독 인터페이스.
//!
//! # Subscription Model
//!
//! ```text
//! on_accounts_changed(listener) ──▶ Subscription ──(unsubscribe / drop)──▶ 리스너 제거
//! on_disconnect(listener)       ──▶ Subscription ──(unsubscribe / drop)──▶ 리스너 제거
//! ```
//!
//! 등록과 해제가 항상 짝을 이룸 → 페이지 이동 후 중복 리스너 없음

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::Address;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;

/// 지갑 이벤트 리스너
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// `accountsChanged(addresses)` 리스너
pub type AccountsListener = Listener<Vec<String>>;

/// `disconnect()` 리스너
pub type DisconnectListener = Listener<()>;

struct RegistryInner<E> {
    next_id: u64,
    listeners: Vec<(u64, Listener<E>)>,
}

/// 이벤트 하나에 대한 리스너 목록
pub struct ListenerRegistry<E> {
    inner: Arc<Mutex<RegistryInner<E>>>,
}

impl<E: 'static> ListenerRegistry<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// 리스너 등록. 반환된 핸들이 살아있는 동안만 호출됨
    pub fn register(&self, listener: Listener<E>) -> Subscription {
        let id = {
            let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            let id = inner.next_id;
            inner.next_id += 1;
            inner.listeners.push((id, listener));
            id
        };

        let weak: Weak<Mutex<RegistryInner<E>>> = Arc::downgrade(&self.inner);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let mut inner = inner.lock().unwrap_or_else(|p| p.into_inner());
                    inner.listeners.retain(|(lid, _)| *lid != id);
                }
            })),
        }
    }

    /// 등록된 모든 리스너 호출
    ///
    /// 락을 잡은 채로 리스너를 호출하지 않음 (리스너 안에서 해제 가능)
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Listener<E>> = {
            let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            inner.listeners.iter().map(|(_, l)| l.clone()).collect()
        };
        for listener in snapshot {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).listeners.len()
    }
}

impl<E: 'static> Default for ListenerRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for ListenerRegistry<E> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

/// 구독 해제 핸들
///
/// `unsubscribe()` 또는 drop 시 정확히 해당 리스너만 제거
#[must_use = "dropping a Subscription immediately removes the listener"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}

/// 지갑 경계
///
/// 브라우저 지갑 확장이 제공하던 기능:
/// - `listAccounts()`: 이미 승인된 계정 목록
/// - `eth_requestAccounts`: 연결 요청 (사용자 프롬프트)
/// - `accountsChanged` / `disconnect` 이벤트
///
/// 지갑이 없으면 `ClientError::Unavailable`
#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn list_accounts(&self) -> Result<Vec<String>, ClientError>;

    async fn request_accounts(&self) -> Result<Vec<String>, ClientError>;

    fn on_accounts_changed(&self, listener: AccountsListener) -> Subscription;

    fn on_disconnect(&self, listener: DisconnectListener) -> Subscription;
}

/// JSON-RPC 노드가 관리하는 계정을 지갑으로 사용
///
/// 노드에는 push 알림이 없으므로 watcher가 `eth_accounts`를 주기적으로 조회해
/// 목록이 바뀌면 `accountsChanged`, 응답이 끊기면 `disconnect`를 발생시킴
pub struct RpcWallet {
    provider: Arc<Provider<Http>>,
    accounts_changed: ListenerRegistry<Vec<String>>,
    disconnect: ListenerRegistry<()>,
}

impl RpcWallet {
    pub fn new(rpc_url: &str) -> Result<Self, ClientError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| ClientError::InvalidInput(format!("Invalid RPC URL: {}", e)))?;
        Ok(Self::with_provider(Arc::new(provider)))
    }

    pub fn with_provider(provider: Arc<Provider<Http>>) -> Self {
        Self {
            provider,
            accounts_changed: ListenerRegistry::new(),
            disconnect: ListenerRegistry::new(),
        }
    }

    pub fn provider(&self) -> Arc<Provider<Http>> {
        self.provider.clone()
    }

    /// 계정 변경 감시 태스크 시작
    pub fn spawn_watcher(
        self: &Arc<Self>,
        poll_interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let wallet = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            let mut last: Option<Vec<String>> = None;
            let mut reachable = true;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                match wallet.list_accounts().await {
                    Ok(accounts) => {
                        reachable = true;
                        if last.as_ref() != Some(&accounts) {
                            if last.is_some() {
                                tracing::debug!("wallet accounts changed: {:?}", accounts);
                                wallet.accounts_changed.emit(&accounts);
                            }
                            last = Some(accounts);
                        }
                    }
                    Err(e) => {
                        if reachable {
                            tracing::warn!("wallet endpoint unreachable: {}", e);
                            wallet.disconnect.emit(&());
                        }
                        reachable = false;
                        last = None;
                    }
                }
            }
        })
    }
}

fn format_accounts(accounts: Vec<Address>) -> Vec<String> {
    accounts.into_iter().map(|a| format!("{:?}", a)).collect()
}

#[async_trait]
impl WalletProvider for RpcWallet {
    async fn list_accounts(&self) -> Result<Vec<String>, ClientError> {
        let accounts = self
            .provider
            .get_accounts()
            .await
            .map_err(|e| ClientError::Unavailable(format!("Wallet ({})", e)))?;
        Ok(format_accounts(accounts))
    }

    async fn request_accounts(&self) -> Result<Vec<String>, ClientError> {
        let accounts: Vec<Address> = self
            .provider
            .request("eth_requestAccounts", ())
            .await
            .map_err(|e| ClientError::Rejected(e.to_string()))?;
        Ok(format_accounts(accounts))
    }

    fn on_accounts_changed(&self, listener: AccountsListener) -> Subscription {
        self.accounts_changed.register(listener)
    }

    fn on_disconnect(&self, listener: DisconnectListener) -> Subscription {
        self.disconnect.register(listener)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_listener_receives_events_until_unsubscribed() {
        let registry: ListenerRegistry<Vec<String>> = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let sub = registry.register(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        registry.emit(&vec!["0x1".to_string()]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        sub.unsubscribe();
        registry.emit(&vec!["0x2".to_string()]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(registry.listener_count(), 0);
    }

    #[test]
    fn test_drop_removes_only_its_listener() {
        let registry: ListenerRegistry<()> = ListenerRegistry::new();
        let a = registry.register(Arc::new(|_| {}));
        let b = registry.register(Arc::new(|_| {}));
        assert_eq!(registry.listener_count(), 2);

        drop(a);
        assert_eq!(registry.listener_count(), 1);

        drop(b);
        assert_eq!(registry.listener_count(), 0);
    }

    #[test]
    fn test_subscription_outliving_registry() {
        let registry: ListenerRegistry<()> = ListenerRegistry::new();
        let sub = registry.register(Arc::new(|_| {}));
        drop(registry);
        // registry가 먼저 사라져도 panic 없음
        sub.unsubscribe();
    }
}
