//! User data stream message parser.
//!
//! Only `outboundAccountPosition` is decoded into balances. Quantities stay
//! strings here so a single malformed asset can be skipped downstream
//! without losing the rest of the event.

use exchange_core::{AccountMessage, BalancePosition, RawBalance};
use serde::Deserialize;

/// Raw account position from Binance WebSocket.
#[derive(Debug, Deserialize)]
pub struct BinanceAccountPositionRaw {
    /// Event time
    #[serde(rename = "E")]
    pub event_time: u64,
    /// Balances
    #[serde(rename = "B")]
    pub balances: Vec<BinanceBalanceRaw>,
}

/// Raw balance from Binance WebSocket.
#[derive(Debug, Deserialize)]
pub struct BinanceBalanceRaw {
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "f")]
    pub free: String,
}

impl From<BinanceAccountPositionRaw> for BalancePosition {
    fn from(raw: BinanceAccountPositionRaw) -> Self {
        BalancePosition {
            event_time_ms: raw.event_time,
            balances: raw
                .balances
                .into_iter()
                .map(|b| RawBalance {
                    asset: b.asset,
                    free: b.free,
                })
                .collect(),
        }
    }
}

/// Parsed user data message.
#[derive(Debug, PartialEq)]
pub enum UserDataEvent {
    Account(AccountMessage),
    /// The server invalidated the listen key; the stream is over.
    ListenKeyExpired,
}

/// Parse a user data stream message.
pub fn parse_user_data_message(text: &str) -> Result<UserDataEvent, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let event_type = value
        .get("e")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    match event_type.as_str() {
        "outboundAccountPosition" => {
            let raw: BinanceAccountPositionRaw = serde_json::from_value(value)?;
            Ok(UserDataEvent::Account(AccountMessage::BalancePosition(
                raw.into(),
            )))
        }
        "listenKeyExpired" => Ok(UserDataEvent::ListenKeyExpired),
        _ => Ok(UserDataEvent::Account(AccountMessage::Other { event_type })),
    }
}
