//! Kline (candlestick) stream message parser.

use model::Candle;
use rust_decimal::Decimal;
use serde::Deserialize;

/// Raw kline event from Binance WebSocket.
#[derive(Debug, Deserialize)]
pub struct BinanceKlineEventRaw {
    /// Event time
    #[serde(rename = "E")]
    pub event_time: u64,
    /// Symbol
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub kline: BinanceKlineRaw,
}

/// Raw kline body. Prices arrive as strings.
#[derive(Debug, Deserialize)]
pub struct BinanceKlineRaw {
    /// Kline start time
    #[serde(rename = "t")]
    pub open_time: i64,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "o")]
    pub open: Decimal,
    #[serde(rename = "c")]
    pub close: Decimal,
    #[serde(rename = "h")]
    pub high: Decimal,
    #[serde(rename = "l")]
    pub low: Decimal,
    /// Is this kline closed?
    #[serde(rename = "x")]
    pub is_closed: bool,
}

impl From<BinanceKlineEventRaw> for Candle {
    fn from(raw: BinanceKlineEventRaw) -> Self {
        Candle {
            symbol: raw.symbol,
            interval: raw.kline.interval,
            open_time_ms: raw.kline.open_time,
            open: raw.kline.open,
            high: raw.kline.high,
            low: raw.kline.low,
            close: raw.kline.close,
            is_closed: raw.kline.is_closed,
        }
    }
}

/// Parsed market stream message.
#[derive(Debug)]
pub enum ParsedKline {
    Candle(Candle),
    Unknown,
}

/// Parse a kline stream message.
///
/// Accepts both raw (`/ws/...`) and combined (`/stream?streams=...`)
/// payloads.
pub fn parse_kline_message(text: &str) -> Result<ParsedKline, serde_json::Error> {
    let mut value: serde_json::Value = serde_json::from_str(text)?;

    if let Some(data) = value.get_mut("data") {
        value = data.take();
    }

    match value.get("e").and_then(|v| v.as_str()) {
        Some("kline") => {
            let raw: BinanceKlineEventRaw = serde_json::from_value(value)?;
            Ok(ParsedKline::Candle(raw.into()))
        }
        _ => Ok(ParsedKline::Unknown),
    }
}
