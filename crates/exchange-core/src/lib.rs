//! Exchange-facing capabilities used by the trading engine.
//!
//! The engine never talks HTTP or WebSocket directly. It goes through two
//! seams:
//!
//! - [`ExchangeApi`]: request/response calls (snapshot, orders, session lease)
//! - [`AccountFeed`]: the server-pushed account event stream for a session
//!
//! Concrete Binance adapters live in `binance-rest` and `connector-binance`;
//! tests substitute in-memory fakes.

mod account;
mod error;
mod order;

pub use account::{AccountMessage, BalancePosition, RawBalance};
pub use error::ExchangeError;
pub use order::{Fill, OrderAck, OrderRequest, OrderSide, OrderStatus, Sizing};

use async_trait::async_trait;
use model::AccountSnapshot;
use tokio::sync::mpsc;

/// Request/response capabilities of the exchange.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// Full free-balance snapshot of the account.
    async fn account_snapshot(&self) -> Result<AccountSnapshot, ExchangeError>;

    /// Submit a market order. Returns the exchange acknowledgment including fills.
    async fn place_market_order(&self, request: &OrderRequest) -> Result<OrderAck, ExchangeError>;

    /// Current status of an order.
    async fn query_order(&self, symbol: &str, order_id: u64) -> Result<OrderStatus, ExchangeError>;

    /// Cancel an open order.
    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<(), ExchangeError>;

    /// Obtain a streaming session lease (Binance: listen key).
    async fn start_session(&self) -> Result<String, ExchangeError>;

    /// Extend a session lease.
    async fn renew_session(&self, session: &str) -> Result<(), ExchangeError>;

    /// Release a session lease.
    async fn close_session(&self, session: &str) -> Result<(), ExchangeError>;
}

/// Messages from one account stream session. The stream ending (`None`)
/// means the session is over.
pub type AccountStream = mpsc::Receiver<Result<AccountMessage, ExchangeError>>;

/// Server-pushed account events.
#[async_trait]
pub trait AccountFeed: Send + Sync {
    /// Connect to the event stream authorised by `session`.
    async fn connect(&self, session: &str) -> Result<AccountStream, ExchangeError>;
}
