//! Binance WebSocket adapters.
//!
//! - [`BinanceAccountFeed`]: user data stream behind the `AccountFeed` seam
//! - [`run_kline_stream`]: reconnecting per-symbol candle stream

mod account_feed;
mod error;
mod kline_parser;
mod kline_stream;
mod user_data_parser;
mod ws;

pub use account_feed::BinanceAccountFeed;
pub use error::ConnectorError;
pub use kline_parser::{parse_kline_message, ParsedKline};
pub use kline_stream::{run_kline_stream, CandleSender, KlineStreamConfig};
pub use user_data_parser::{parse_user_data_message, UserDataEvent};
