//! Services Module
//!
//! 외부 경계와의 연동을 담당하는 서비스 레이어
//!
//! # Services
//! - `SessionService`: 비밀번호 해시, 세션 토큰 발급/검증 (서버)
//! - `WalletProvider`: 지갑 계정 조회/연결 요청, 이벤트 구독
//! - `ContractGateway`: Escrow/Borrower/Lender/Token 컨트랙트 호출
//! - `HttpSessionClient` / `HttpDealRecorder`: 백엔드 API 클라이언트

mod session;
mod wallet;
mod contracts;
mod api_client;

pub use session::{Session, SessionService};
pub use wallet::{
    AccountsListener, DisconnectListener, Listener, ListenerRegistry, RpcWallet, Subscription,
    WalletProvider,
};
pub use contracts::{
    bindings, BorrowerPosition, ContractGateway, EthersContracts, LenderPosition, Operation,
    PendingTx, Position, TxStatus,
};
pub use api_client::{DealRecorder, HttpDealRecorder, HttpSessionClient, SessionSource};
