//! Binance REST API client.

use crate::credentials::ApiCredentials;
use crate::error::BinanceRestError;
use crate::responses::{
    AccountResponse, ListenKeyResponse, NewOrderResponse, OrderQueryResponse, ServerTimeResponse,
};
use crate::signer::RequestSigner;
use async_trait::async_trait;
use common::BinanceEnvironment;
use exchange_core::{ExchangeApi, ExchangeError, OrderAck, OrderRequest, OrderStatus, Sizing};
use model::AccountSnapshot;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Request timeout for Binance API calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Binance spot REST client with authentication support.
pub struct BinanceRestClient {
    http: Client,
    base_url: String,
    credentials: ApiCredentials,
    environment: BinanceEnvironment,
    /// Time offset between local clock and Binance server (local - server).
    time_offset_ms: AtomicI64,
}

impl BinanceRestClient {
    pub fn new(
        credentials: ApiCredentials,
        environment: BinanceEnvironment,
    ) -> Result<Self, BinanceRestError> {
        Self::with_base_url(credentials, environment, environment.rest_base_url())
    }

    /// Client against an explicit base URL (proxies, local mocks).
    pub fn with_base_url(
        credentials: ApiCredentials,
        environment: BinanceEnvironment,
        base_url: &str,
    ) -> Result<Self, BinanceRestError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BinanceRestError::ClientBuild(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            environment,
            time_offset_ms: AtomicI64::new(0),
        })
    }

    pub fn environment(&self) -> BinanceEnvironment {
        self.environment
    }

    /// Estimated current Binance server time.
    pub fn server_timestamp_ms(&self) -> i64 {
        local_time_ms() - self.time_offset_ms.load(Ordering::Relaxed)
    }

    // ========================================================================
    // Time Synchronization
    // ========================================================================

    /// Synchronize with Binance server time.
    ///
    /// Signed requests carry a timestamp the server checks against its own
    /// clock, so this runs before the first signed call.
    pub async fn sync_time(&self) -> Result<(), BinanceRestError> {
        let before = std::time::Instant::now();
        let response: ServerTimeResponse = self.send(Method::GET, "/api/v3/time", None, false).await?;
        let rtt = before.elapsed().as_millis() as i64;

        let local_time = local_time_ms();
        // Estimate server time at midpoint of request
        let estimated_server_time = response.server_time + (rtt / 2);
        let offset = local_time - estimated_server_time;

        self.time_offset_ms.store(offset, Ordering::Relaxed);

        tracing::info!(
            server_time = response.server_time,
            local_time = local_time,
            offset_ms = offset,
            rtt_ms = rtt,
            "Time synchronized with Binance server"
        );

        Ok(())
    }

    // ========================================================================
    // Account
    // ========================================================================

    /// GET /api/v3/account
    pub async fn get_account(&self) -> Result<AccountResponse, BinanceRestError> {
        let query = self.signed_query(&[("omitZeroBalances", "true")]);
        self.send(Method::GET, "/api/v3/account", Some(&query), true)
            .await
    }

    // ========================================================================
    // Listen Key Management
    // ========================================================================

    /// Create a new listen key for the user data stream.
    ///
    /// POST /api/v3/userDataStream
    ///
    /// The key is valid for 60 minutes unless kept alive.
    pub async fn create_listen_key(&self) -> Result<String, BinanceRestError> {
        let response: ListenKeyResponse = self
            .send(Method::POST, "/api/v3/userDataStream", None, true)
            .await?;

        tracing::info!("Created listen key");
        Ok(response.listen_key)
    }

    /// PUT /api/v3/userDataStream
    pub async fn keepalive_listen_key(&self, listen_key: &str) -> Result<(), BinanceRestError> {
        let query = format!("listenKey={}", listen_key);
        self.send_empty(Method::PUT, "/api/v3/userDataStream", Some(&query))
            .await?;

        tracing::debug!("Listen key refreshed");
        Ok(())
    }

    /// DELETE /api/v3/userDataStream
    pub async fn close_listen_key(&self, listen_key: &str) -> Result<(), BinanceRestError> {
        let query = format!("listenKey={}", listen_key);
        self.send_empty(Method::DELETE, "/api/v3/userDataStream", Some(&query))
            .await?;

        tracing::info!("Listen key closed");
        Ok(())
    }

    // ========================================================================
    // Order Management
    // ========================================================================

    /// Place a market order.
    ///
    /// POST /api/v3/order with `newOrderRespType=FULL` so fills come back
    /// with the acknowledgment.
    pub async fn submit_market_order(
        &self,
        request: &OrderRequest,
    ) -> Result<NewOrderResponse, BinanceRestError> {
        let amount = request.sizing.amount().normalize().to_string();
        let sizing_key = match request.sizing {
            Sizing::Quote(_) => "quoteOrderQty",
            Sizing::Base(_) => "quantity",
        };
        let params = [
            ("symbol", request.symbol.as_str()),
            ("side", request.side.as_binance_str()),
            ("type", "MARKET"),
            (sizing_key, amount.as_str()),
            ("newClientOrderId", request.client_order_id.as_str()),
            ("newOrderRespType", "FULL"),
        ];
        let query = self.signed_query(&params);

        tracing::info!(
            symbol = %request.symbol,
            side = ?request.side,
            sizing = ?request.sizing,
            client_order_id = %request.client_order_id,
            "Placing market order"
        );

        self.send(Method::POST, "/api/v3/order", Some(&query), true)
            .await
    }

    /// GET /api/v3/order
    pub async fn query_order_by_id(
        &self,
        symbol: &str,
        order_id: u64,
    ) -> Result<OrderQueryResponse, BinanceRestError> {
        let order_id = order_id.to_string();
        let query = self.signed_query(&[("symbol", symbol), ("orderId", order_id.as_str())]);
        self.send(Method::GET, "/api/v3/order", Some(&query), true)
            .await
    }

    /// DELETE /api/v3/order
    pub async fn cancel_order_by_id(
        &self,
        symbol: &str,
        order_id: u64,
    ) -> Result<OrderQueryResponse, BinanceRestError> {
        let order_id_str = order_id.to_string();
        let query = self.signed_query(&[("symbol", symbol), ("orderId", order_id_str.as_str())]);

        tracing::info!(symbol = %symbol, order_id, "Canceling order");

        let response: OrderQueryResponse = self
            .send(Method::DELETE, "/api/v3/order", Some(&query), true)
            .await?;

        tracing::info!(
            order_id = response.order_id,
            status = %response.status,
            "Order canceled"
        );
        Ok(response)
    }

    // ========================================================================
    // Transport
    // ========================================================================

    fn signed_query(&self, params: &[(&str, &str)]) -> String {
        RequestSigner::new(&self.credentials).sign_params(params, self.server_timestamp_ms())
    }

    fn build_url(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", self.base_url, path, q),
            _ => format!("{}{}", self.base_url, path),
        }
    }

    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        with_key: bool,
    ) -> Result<Response, BinanceRestError> {
        let url = self.build_url(path, query);
        tracing::debug!(method = %method, path = %path, "REST request");

        let mut request = self.http.request(method, &url);
        if with_key {
            request = request.header(API_KEY_HEADER, self.credentials.api_key());
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(BinanceRestError::from_api_response(status.as_u16(), &body))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        with_key: bool,
    ) -> Result<T, BinanceRestError> {
        let body = self.dispatch(method, path, query, with_key).await?.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(body = %body, error = %e, "Failed to parse response");
            BinanceRestError::Parse(e.to_string())
        })
    }

    async fn send_empty(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
    ) -> Result<(), BinanceRestError> {
        self.dispatch(method, path, query, true).await.map(|_| ())
    }
}

fn local_time_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[async_trait]
impl ExchangeApi for BinanceRestClient {
    async fn account_snapshot(&self) -> Result<AccountSnapshot, ExchangeError> {
        Ok(self.get_account().await?.into_snapshot())
    }

    async fn place_market_order(&self, request: &OrderRequest) -> Result<OrderAck, ExchangeError> {
        let response = self.submit_market_order(request).await?;
        Ok(response.into_ack()?)
    }

    async fn query_order(&self, symbol: &str, order_id: u64) -> Result<OrderStatus, ExchangeError> {
        Ok(self.query_order_by_id(symbol, order_id).await?.order_status()?)
    }

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<(), ExchangeError> {
        self.cancel_order_by_id(symbol, order_id).await?;
        Ok(())
    }

    async fn start_session(&self) -> Result<String, ExchangeError> {
        Ok(self.create_listen_key().await?)
    }

    async fn renew_session(&self, session: &str) -> Result<(), ExchangeError> {
        Ok(self.keepalive_listen_key(session).await?)
    }

    async fn close_session(&self, session: &str) -> Result<(), ExchangeError> {
        Ok(self.close_listen_key(session).await?)
    }
}

impl std::fmt::Debug for BinanceRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceRestClient")
            .field("environment", &self.environment)
            .field("base_url", &self.base_url)
            .field("api_key", &self.credentials.api_key())
            .field(
                "time_offset_ms",
                &self.time_offset_ms.load(Ordering::Relaxed),
            )
            .finish()
    }
}
