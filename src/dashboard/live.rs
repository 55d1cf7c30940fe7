//! 실제 백엔드 연결 (RPC 노드 + 백엔드 API)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ethers::types::Address;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{DashboardContext, Navigator, Notifier, ReconcilerState, WalletReconciler};
use crate::config::Config;
use crate::error::ClientError;
use crate::services::{EthersContracts, HttpDealRecorder, HttpSessionClient, RpcWallet};

/// 지갑 계정 변경 감지 주기
const WALLET_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct LiveBackends {
    pub wallet: Arc<RpcWallet>,
    pub contracts: Arc<EthersContracts>,
    pub sessions: Arc<HttpSessionClient>,
    pub deals: Arc<HttpDealRecorder>,
    pub admin: Option<Address>,
    refresh_interval: Duration,
}

impl LiveBackends {
    pub fn from_config(config: &Config) -> Result<Self> {
        let escrow = config
            .escrow_address
            .as_ref()
            .context("ESCROW_CONTRACT_ADDRESS must be set")?
            .to_address();

        let wallet = RpcWallet::new(&config.eth_rpc_url)
            .map_err(|e| anyhow::anyhow!("ETH_RPC_URL: {}", e))?;
        let contracts = EthersContracts::new(
            wallet.provider(),
            escrow,
            config.token_address.as_ref().map(|a| a.to_address()),
        );

        Ok(Self {
            wallet: Arc::new(wallet),
            contracts: Arc::new(contracts),
            sessions: Arc::new(HttpSessionClient::new(&config.api_base_url)),
            deals: Arc::new(HttpDealRecorder::new(&config.api_base_url)),
            admin: config.admin_address.as_ref().map(|a| a.to_address()),
            refresh_interval: config.refresh_interval,
        })
    }

    /// 노드 계정 감시 시작. token 취소 시 종료
    pub fn watch_wallet(&self, token: CancellationToken) -> JoinHandle<()> {
        self.wallet.spawn_watcher(WALLET_POLL_INTERVAL, token)
    }

    pub fn reconciler(&self, navigator: Arc<dyn Navigator>) -> WalletReconciler {
        WalletReconciler::new(self.sessions.clone(), self.wallet.clone(), navigator)
    }

    pub fn context(
        &self,
        state: &ReconcilerState,
        notifier: Arc<dyn Notifier>,
    ) -> Result<DashboardContext, ClientError> {
        DashboardContext::mount(state, self.contracts.clone(), notifier, self.refresh_interval)
    }
}
