//! Binance spot REST API client.
//!
//! - **Time synchronization**: adjusts signed request timestamps for clock skew
//! - **Account snapshot**: free balances via `GET /api/v3/account`
//! - **Market orders**: sized by quote amount or base quantity, with fills
//! - **Listen key management**: create, keep alive and close the user data stream lease
//!
//! [`BinanceRestClient`] implements [`exchange_core::ExchangeApi`], which is
//! how the rest of the bot reaches it.

mod client;
mod credentials;
mod error;
mod responses;
mod signer;

pub use client::{BinanceRestClient, REQUEST_TIMEOUT};
pub use credentials::ApiCredentials;
pub use error::BinanceRestError;
pub use responses::{
    AccountBalance, AccountResponse, ListenKeyResponse, NewOrderResponse, OrderFill,
    OrderQueryResponse, ServerTimeResponse,
};
