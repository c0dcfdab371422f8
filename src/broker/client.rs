//! SmartAPI REST client
//!
//! Session login (MPIN + TOTP), batch quotes, historical candles, order
//! placement and fund endpoints. Raw reqwest, no broker SDK.

use crate::broker::totp;
use crate::config::with_config;
use crate::logger::{self, LogTag};
use crate::types::OhlcvBar;
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use tokio::sync::RwLock;

const BASE_URL: &str = "https://apiconnect.angelbroking.com";

/// Session tokens expire 8 hours after login
const SESSION_LIFETIME_HOURS: i64 = 8;

/// One entry of a batch-quote response
#[derive(Debug, Clone)]
pub struct QuoteTick {
    pub symbol_token: String,
    pub ltp: f64,
    pub total_traded_value: f64,
}

/// Broker holding line used for portfolio valuation
#[derive(Debug, Clone)]
pub struct HoldingLine {
    pub quantity: f64,
    pub ltp: f64,
}

#[derive(Debug, Clone)]
struct Session {
    jwt_token: String,
    #[allow(dead_code)]
    refresh_token: String,
    #[allow(dead_code)]
    feed_token: String,
    expires_at: DateTime<Utc>,
}

pub struct BrokerClient {
    http: reqwest::Client,
    session: RwLock<Option<Session>>,
}

static BROKER: Lazy<BrokerClient> = Lazy::new(BrokerClient::new);

/// Global broker client instance
pub fn broker() -> &'static BrokerClient {
    &BROKER
}

impl BrokerClient {
    fn new() -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            http,
            session: RwLock::new(None),
        }
    }

    // =========================================================================
    // AUTHENTICATION
    // =========================================================================

    /// Generates a new SmartAPI session. Called at startup and whenever the
    /// 8-hour token has expired.
    pub async fn login(&self) -> Result<(), String> {
        let (client_id, mpin, totp_secret) = with_config(|c| {
            (
                c.broker.client_id.clone(),
                c.broker.mpin.clone(),
                c.broker.totp_secret.clone(),
            )
        });

        if client_id.is_empty() {
            return Err("broker.client_id not configured".to_string());
        }

        let code = totp::generate(&totp_secret)?;
        let body = json!({
            "clientcode": client_id,
            "password": mpin,
            "totp": code,
        });

        let root = self
            .post("/rest/auth/angelbroking/user/v1/loginByPassword", &body, false)
            .await?;

        if !root["status"].as_bool().unwrap_or(false) {
            let message = root["message"].as_str().unwrap_or("unknown error");
            return Err(format!("Broker login failed: {}", message));
        }

        let data = &root["data"];
        let session = Session {
            jwt_token: data["jwtToken"].as_str().unwrap_or("").to_string(),
            refresh_token: data["refreshToken"].as_str().unwrap_or("").to_string(),
            feed_token: data["feedToken"].as_str().unwrap_or("").to_string(),
            expires_at: Utc::now() + Duration::hours(SESSION_LIFETIME_HOURS),
        };

        if session.jwt_token.is_empty() {
            return Err("Broker login returned an empty session token".to_string());
        }

        *self.session.write().await = Some(session);
        logger::success(
            LogTag::Broker,
            &format!("SmartAPI session established for client {}", client_id),
        );
        Ok(())
    }

    /// True while a non-expired session token is held
    pub async fn is_authenticated(&self) -> bool {
        match self.session.read().await.as_ref() {
            Some(s) => !s.jwt_token.is_empty() && Utc::now() < s.expires_at,
            None => false,
        }
    }

    /// Re-logins inline when the session is missing or expired.
    async fn ensure_authenticated(&self) -> Result<(), String> {
        if self.is_authenticated().await {
            return Ok(());
        }
        logger::info(LogTag::Broker, "Session expired or missing, re-authenticating");
        self.login().await
    }

    // =========================================================================
    // MARKET DATA
    // =========================================================================

    /// Fetches live quotes for up to 250 tokens on one exchange.
    pub async fn get_quote(
        &self,
        exchange: &str,
        symbol_tokens: &[String],
    ) -> Result<Vec<QuoteTick>, String> {
        self.ensure_authenticated().await?;

        let mut exchange_tokens = serde_json::Map::new();
        exchange_tokens.insert(exchange.to_string(), json!(symbol_tokens));
        let body = json!({
            "mode": "FULL",
            "exchangeTokens": exchange_tokens,
        });

        let root = self
            .post("/rest/secure/angelbroking/market/v1/quote", &body, true)
            .await?;

        if !root["status"].as_bool().unwrap_or(false) {
            return Err(format!(
                "getQuote returned status=false for {} tokens on {}: {}",
                symbol_tokens.len(),
                exchange,
                root["message"].as_str().unwrap_or("")
            ));
        }

        let mut ticks = Vec::new();
        if let Some(fetched) = root["data"]["fetched"].as_array() {
            for item in fetched {
                ticks.push(QuoteTick {
                    symbol_token: item["symbolToken"].as_str().unwrap_or("").to_string(),
                    ltp: item["ltp"].as_f64().unwrap_or(0.0),
                    total_traded_value: item["totaltradedvalue"]
                        .as_f64()
                        .or_else(|| {
                            item["totaltradedvalue"]
                                .as_str()
                                .and_then(|s| s.parse().ok())
                        })
                        .unwrap_or(0.0),
                });
            }
        }
        Ok(ticks)
    }

    /// Fetches historical OHLCV candles. Dates use "yyyy-MM-dd HH:mm".
    pub async fn get_candles(
        &self,
        exchange: &str,
        symbol_token: &str,
        interval: &str,
        from_date: &str,
        to_date: &str,
    ) -> Result<Vec<OhlcvBar>, String> {
        self.ensure_authenticated().await?;

        let body = json!({
            "exchange": exchange,
            "symboltoken": symbol_token,
            "interval": interval,
            "fromdate": from_date,
            "todate": to_date,
        });

        let root = self
            .post(
                "/rest/secure/angelbroking/historical/v1/getCandleData",
                &body,
                true,
            )
            .await?;

        if !root["status"].as_bool().unwrap_or(false) {
            return Err(format!(
                "Historical data fetch failed for token {}: {}",
                symbol_token,
                root["message"].as_str().unwrap_or("")
            ));
        }

        let mut bars = Vec::new();
        if let Some(candles) = root["data"].as_array() {
            for candle in candles {
                // Each candle: [timestamp, open, high, low, close, volume]
                let Some(fields) = candle.as_array() else {
                    continue;
                };
                if fields.len() < 6 {
                    continue;
                }
                let Some(ts_str) = fields[0].as_str() else {
                    continue;
                };
                let Ok(timestamp) = DateTime::parse_from_rfc3339(ts_str) else {
                    continue;
                };
                bars.push(OhlcvBar {
                    timestamp: timestamp.with_timezone(&Utc),
                    open: fields[1].as_f64().unwrap_or(0.0),
                    high: fields[2].as_f64().unwrap_or(0.0),
                    low: fields[3].as_f64().unwrap_or(0.0),
                    close: fields[4].as_f64().unwrap_or(0.0),
                    volume: fields[5].as_i64().unwrap_or(0),
                });
            }
        }
        Ok(bars)
    }

    // =========================================================================
    // ORDERS
    // =========================================================================

    /// Places a LIMIT DELIVERY order. Returns the broker order id, or None
    /// when the broker rejected it.
    pub async fn place_order(
        &self,
        symbol_token: &str,
        exchange: &str,
        symbol: &str,
        transaction_type: &str,
        quantity: i64,
        price: f64,
    ) -> Option<String> {
        if let Err(e) = self.ensure_authenticated().await {
            logger::error(LogTag::Broker, &format!("Order auth failed: {}", e));
            return None;
        }

        let body = json!({
            "variety": "NORMAL",
            "tradingsymbol": format!("{}-EQ", symbol),
            "symboltoken": symbol_token,
            "transactiontype": transaction_type,
            "exchange": exchange,
            "ordertype": "LIMIT",
            "producttype": "DELIVERY",
            "duration": "DAY",
            "price": price,
            "squareoff": "0",
            "stoploss": "0",
            "quantity": quantity,
        });

        match self
            .post("/rest/secure/angelbroking/order/v1/placeOrder", &body, true)
            .await
        {
            Ok(root) => {
                if root["status"].as_bool().unwrap_or(false) {
                    let order_id = root["data"]["orderid"].as_str().unwrap_or("").to_string();
                    logger::success(
                        LogTag::Broker,
                        &format!(
                            "Order placed: {} {} {} @ ₹{:.2} -> orderId={}",
                            transaction_type, quantity, symbol, price, order_id
                        ),
                    );
                    Some(order_id)
                } else {
                    logger::error(
                        LogTag::Broker,
                        &format!(
                            "Order placement failed for {}: {}",
                            symbol,
                            root["message"].as_str().unwrap_or("")
                        ),
                    );
                    None
                }
            }
            Err(e) => {
                logger::error(LogTag::Broker, &format!("placeOrder failed for {}: {}", symbol, e));
                None
            }
        }
    }

    // =========================================================================
    // FUNDS & HOLDINGS
    // =========================================================================

    /// Fetches available cash from the risk-management endpoint
    pub async fn get_available_cash(&self) -> Result<f64, String> {
        self.ensure_authenticated().await?;
        let root = self.get("/rest/secure/angelbroking/user/v1/getRMS").await?;
        let cash = root["data"]["availablecash"]
            .as_f64()
            .or_else(|| {
                root["data"]["availablecash"]
                    .as_str()
                    .and_then(|s| s.parse().ok())
            })
            .unwrap_or(0.0);
        Ok(cash)
    }

    /// Fetches delivery holdings for mark-to-market valuation
    pub async fn get_holdings(&self) -> Result<Vec<HoldingLine>, String> {
        self.ensure_authenticated().await?;
        let root = self
            .get("/rest/secure/angelbroking/portfolio/v1/getHolding")
            .await?;

        let mut holdings = Vec::new();
        if let Some(lines) = root["data"].as_array() {
            for line in lines {
                holdings.push(HoldingLine {
                    quantity: line["quantity"]
                        .as_f64()
                        .or_else(|| line["quantity"].as_str().and_then(|s| s.parse().ok()))
                        .unwrap_or(0.0),
                    ltp: line["ltp"]
                        .as_f64()
                        .or_else(|| line["ltp"].as_str().and_then(|s| s.parse().ok()))
                        .unwrap_or(0.0),
                });
            }
        }
        Ok(holdings)
    }

    // =========================================================================
    // HTTP HELPERS
    // =========================================================================

    async fn post(&self, path: &str, body: &Value, authenticated: bool) -> Result<Value, String> {
        let mut request = self
            .http
            .post(format!("{}{}", BASE_URL, path))
            .json(body);

        request = self.attach_headers(request).await;
        if authenticated {
            if let Some(session) = self.session.read().await.as_ref() {
                request = request.bearer_auth(&session.jwt_token);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| format!("Broker POST {} failed: {}", path, e))?;
        response
            .json::<Value>()
            .await
            .map_err(|e| format!("Broker POST {} returned invalid JSON: {}", path, e))
    }

    async fn get(&self, path: &str) -> Result<Value, String> {
        let mut request = self.http.get(format!("{}{}", BASE_URL, path));
        request = self.attach_headers(request).await;
        if let Some(session) = self.session.read().await.as_ref() {
            request = request.bearer_auth(&session.jwt_token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| format!("Broker GET {} failed: {}", path, e))?;
        response
            .json::<Value>()
            .await
            .map_err(|e| format!("Broker GET {} returned invalid JSON: {}", path, e))
    }

    async fn attach_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let api_key = with_config(|c| c.broker.api_key.clone());
        request
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .header("X-UserType", "USER")
            .header("X-SourceID", "WEB")
            .header("X-ClientLocalIP", "127.0.0.1")
            .header("X-ClientPublicIP", "127.0.0.1")
            .header("X-MACAddress", "00:00:00:00:00:00")
            .header("X-PrivateKey", api_key)
    }
}
