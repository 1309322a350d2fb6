//! Binance API response types.

use exchange_core::{Fill, OrderAck, OrderStatus};
use model::{AccountSnapshot, AssetBalance};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::BinanceRestError;

/// Response from GET /api/v3/time.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerTimeResponse {
    #[serde(rename = "serverTime")]
    pub server_time: i64,
}

/// Response from POST /api/v3/userDataStream.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenKeyResponse {
    #[serde(rename = "listenKey")]
    pub listen_key: String,
}

/// Response from GET /api/v3/account.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountResponse {
    #[serde(rename = "updateTime")]
    pub update_time: i64,
    pub balances: Vec<AccountBalance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountBalance {
    pub asset: String,
    #[serde(deserialize_with = "deserialize_decimal_from_str")]
    pub free: Decimal,
    #[serde(deserialize_with = "deserialize_decimal_from_str")]
    pub locked: Decimal,
}

impl AccountResponse {
    /// Free balances above zero.
    pub fn into_snapshot(self) -> AccountSnapshot {
        AccountSnapshot::from_balances(
            self.update_time.max(0) as u64,
            self.balances.into_iter().map(|b| AssetBalance {
                asset: b.asset,
                free: b.free,
            }),
        )
    }
}

/// Response from POST /api/v3/order.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrderResponse {
    pub symbol: String,
    #[serde(rename = "orderId")]
    pub order_id: u64,
    #[serde(rename = "clientOrderId")]
    pub client_order_id: String,
    #[serde(
        rename = "executedQty",
        deserialize_with = "deserialize_decimal_from_str"
    )]
    pub executed_qty: Decimal,
    #[serde(
        rename = "cummulativeQuoteQty",
        deserialize_with = "deserialize_decimal_from_str"
    )]
    pub cummulative_quote_qty: Decimal,
    pub status: String,
    pub side: String,
    /// Fills included when using newOrderRespType=FULL
    #[serde(default)]
    pub fills: Vec<OrderFill>,
}

impl NewOrderResponse {
    pub fn into_ack(self) -> Result<OrderAck, BinanceRestError> {
        let status = parse_status(&self.status)?;
        Ok(OrderAck {
            order_id: self.order_id,
            status,
            fills: self
                .fills
                .into_iter()
                .map(|f| Fill {
                    price: f.price,
                    qty: f.qty,
                })
                .collect(),
        })
    }
}

/// A fill from an order response.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderFill {
    #[serde(deserialize_with = "deserialize_decimal_from_str")]
    pub price: Decimal,
    #[serde(deserialize_with = "deserialize_decimal_from_str")]
    pub qty: Decimal,
    #[serde(deserialize_with = "deserialize_decimal_from_str")]
    pub commission: Decimal,
    #[serde(rename = "commissionAsset")]
    pub commission_asset: String,
}

/// Response from GET and DELETE /api/v3/order.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderQueryResponse {
    pub symbol: String,
    #[serde(rename = "orderId")]
    pub order_id: u64,
    #[serde(
        rename = "executedQty",
        deserialize_with = "deserialize_decimal_from_str"
    )]
    pub executed_qty: Decimal,
    pub status: String,
}

impl OrderQueryResponse {
    pub fn order_status(&self) -> Result<OrderStatus, BinanceRestError> {
        parse_status(&self.status)
    }
}

fn parse_status(raw: &str) -> Result<OrderStatus, BinanceRestError> {
    OrderStatus::from_binance_str(raw)
        .ok_or_else(|| BinanceRestError::Parse(format!("unknown order status '{}'", raw)))
}

/// Deserialize a Decimal from a string.
fn deserialize_decimal_from_str<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: &str = Deserialize::deserialize(deserializer)?;
    s.parse::<Decimal>().map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_deserialize_server_time() {
        let json = r#"{"serverTime": 1499827319559}"#;
        let response: ServerTimeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.server_time, 1499827319559);
    }

    #[test]
    fn test_account_into_snapshot_drops_empty_balances() {
        let json = r#"{
            "makerCommission": 15,
            "canTrade": true,
            "updateTime": 123456789,
            "accountType": "SPOT",
            "balances": [
                {"asset": "BNB", "free": "1.50000000", "locked": "0.00000000"},
                {"asset": "USDT", "free": "250.12000000", "locked": "10.00000000"},
                {"asset": "LTC", "free": "0.00000000", "locked": "0.00000000"}
            ],
            "permissions": ["SPOT"]
        }"#;

        let snapshot = serde_json::from_str::<AccountResponse>(json)
            .unwrap()
            .into_snapshot();

        assert_eq!(snapshot.update_time_ms, 123456789);
        assert_eq!(snapshot.balances.len(), 2);
        assert_eq!(snapshot.balances["BNB"], dec!(1.5));
        assert_eq!(snapshot.balances["USDT"], dec!(250.12));
    }

    #[test]
    fn test_market_order_into_ack() {
        let json = r#"{
            "symbol": "BNBUSDT",
            "orderId": 28,
            "orderListId": -1,
            "clientOrderId": "qb_6gCrw2kRUAF9CvJDGP16IP",
            "transactTime": 1507725176595,
            "price": "0.00000000",
            "origQty": "0.00000000",
            "executedQty": "0.05000000",
            "cummulativeQuoteQty": "15.10000000",
            "status": "FILLED",
            "timeInForce": "GTC",
            "type": "MARKET",
            "side": "BUY",
            "fills": [
                {"price": "302.00000000", "qty": "0.03000000", "commission": "0.00002250", "commissionAsset": "BNB", "tradeId": 56},
                {"price": "302.00000000", "qty": "0.02000000", "commission": "0.00001500", "commissionAsset": "BNB", "tradeId": 57}
            ]
        }"#;

        let ack = serde_json::from_str::<NewOrderResponse>(json)
            .unwrap()
            .into_ack()
            .unwrap();

        assert_eq!(ack.order_id, 28);
        assert_eq!(ack.status, OrderStatus::Filled);
        assert_eq!(ack.fills.len(), 2);
        assert_eq!(ack.fills[1].qty, dec!(0.02));
    }

    #[test]
    fn test_unknown_status_is_parse_error() {
        let json = r#"{"symbol": "BNBUSDT", "orderId": 1, "executedQty": "0", "status": "WAT"}"#;
        let response: OrderQueryResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            response.order_status(),
            Err(BinanceRestError::Parse(_))
        ));
    }
}
