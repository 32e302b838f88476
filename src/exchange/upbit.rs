//! Upbit exchange integration.
//!
//! Implements the `Exchange` and `MarketFeed` traits over the Upbit
//! REST API. Authenticated endpoints use Upbit's JWT scheme: an
//! HS256-signed token whose payload carries the access key, a UUID
//! nonce, and (for parameterized requests) a SHA-512 hash of the
//! canonical query string.
//!
//! Order submissions are never retried here — a transport error after
//! submission leaves the order state ambiguous, and retrying would risk
//! double-execution. The next scheduled cycle re-reads fresh state.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256, Sha512};
use tracing::{debug, warn};

use super::{Exchange, MarketFeed};
use crate::types::{AccountSnapshot, MarketContext, OrderReceipt, SageError};

const UPBIT_API_URL: &str = "https://api.upbit.com/v1";

/// Daily candles included in the oracle context payload.
const CONTEXT_CANDLE_COUNT: u32 = 30;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

/// One balance row from GET /v1/accounts. Upbit returns numeric fields
/// as strings.
#[derive(Debug, Deserialize)]
struct UpbitBalance {
    currency: String,
    balance: String,
    avg_buy_price: String,
}

#[derive(Debug, Deserialize)]
struct UpbitTicker {
    trade_price: f64,
    signed_change_rate: f64,
    acc_trade_price_24h: f64,
}

#[derive(Debug, Deserialize)]
struct UpbitOrder {
    uuid: String,
}

#[derive(Debug, Deserialize)]
struct UpbitApiError {
    error: UpbitErrorBody,
}

#[derive(Debug, Deserialize)]
struct UpbitErrorBody {
    #[serde(default)]
    name: String,
    #[serde(default)]
    message: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct UpbitClient {
    http: Client,
    access_key: String,
    secret_key: SecretString,
    /// Traded pair, e.g. "KRW-BTC".
    pair: String,
    /// Quote currency ("KRW") — the cash side of the snapshot.
    quote: String,
    /// Base currency ("BTC") — the asset side of the snapshot.
    base: String,
}

impl UpbitClient {
    pub fn new(
        access_key: String,
        secret_key: SecretString,
        pair: &str,
        timeout_secs: u64,
    ) -> Result<Self, SageError> {
        let (quote, base) = split_pair(pair)?;
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SageError::collaborator("exchange", e))?;

        Ok(Self {
            http,
            access_key,
            secret_key,
            pair: pair.to_string(),
            quote,
            base,
        })
    }

    /// Build the JWT authorization header. `query` is the canonical
    /// query string of the request, hashed into the token so the server
    /// can verify parameter integrity.
    fn auth_header(&self, query: Option<&str>) -> Result<String, SageError> {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);

        let nonce = uuid::Uuid::new_v4().to_string();
        let payload = match query {
            Some(q) => {
                let query_hash = hex::encode(Sha512::digest(q.as_bytes()));
                serde_json::json!({
                    "access_key": self.access_key,
                    "nonce": nonce,
                    "query_hash": query_hash,
                    "query_hash_alg": "SHA512",
                })
            }
            None => serde_json::json!({
                "access_key": self.access_key,
                "nonce": nonce,
            }),
        };
        let payload = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&payload)
                .map_err(|e| SageError::collaborator("exchange", e))?,
        );

        let signing_input = format!("{header}.{payload}");
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.expose_secret().as_bytes())
            .map_err(|e| SageError::collaborator("exchange", e))?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("Bearer {signing_input}.{signature}"))
    }

    async fn get_accounts(&self) -> Result<Vec<UpbitBalance>, SageError> {
        let url = format!("{UPBIT_API_URL}/accounts");
        let auth = self.auth_header(None)?;

        let resp = self
            .http
            .get(&url)
            .header("Authorization", auth)
            .send()
            .await
            .map_err(|e| SageError::collaborator("exchange", e))?;

        read_json(resp, "exchange").await
    }

    async fn get_ticker(&self) -> Result<UpbitTicker, SageError> {
        let url = format!("{UPBIT_API_URL}/ticker?markets={}", self.pair);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| SageError::collaborator("market-feed", e))?;

        let mut tickers: Vec<UpbitTicker> = read_json(resp, "market-feed").await?;
        tickers
            .pop()
            .ok_or_else(|| SageError::collaborator("market-feed", "empty ticker response"))
    }

    async fn get_daily_candles(&self) -> Result<serde_json::Value, SageError> {
        let url = format!(
            "{UPBIT_API_URL}/candles/days?market={}&count={}",
            self.pair, CONTEXT_CANDLE_COUNT
        );
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| SageError::collaborator("market-feed", e))?;

        read_json(resp, "market-feed").await
    }

    /// POST /v1/orders with the given canonical query string.
    ///
    /// A 4xx here is a venue-side business rejection; anything else is
    /// a transport failure.
    async fn place_order(&self, query: &str) -> Result<UpbitOrder, SageError> {
        let url = format!("{UPBIT_API_URL}/orders?{query}");
        let auth = self.auth_header(Some(query))?;

        let resp = self
            .http
            .post(&url)
            .header("Authorization", auth)
            .send()
            .await
            .map_err(|e| SageError::collaborator("exchange", e))?;

        let status = resp.status();
        if status.is_client_error() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            let message = serde_json::from_str::<UpbitApiError>(&body)
                .map(|e| format!("{}: {}", e.error.name, e.error.message))
                .unwrap_or(body);
            warn!(%status, %message, "Order rejected by Upbit");
            return Err(SageError::OrderRejected(message));
        }
        if !status.is_success() {
            return Err(SageError::collaborator(
                "exchange",
                format!("HTTP {status} from order endpoint"),
            ));
        }

        resp.json()
            .await
            .map_err(|e| SageError::collaborator("exchange", e))
    }

    fn parse_decimal(raw: &str, field: &str) -> Result<Decimal, SageError> {
        raw.parse::<Decimal>().map_err(|e| {
            SageError::collaborator("exchange", format!("bad {field} value {raw:?}: {e}"))
        })
    }
}

#[async_trait]
impl Exchange for UpbitClient {
    async fn account_snapshot(&self) -> Result<AccountSnapshot, SageError> {
        let balances = self.get_accounts().await?;

        let mut cash_balance = Decimal::ZERO;
        let mut asset_balance = Decimal::ZERO;
        let mut asset_average_price = Decimal::ZERO;

        for b in &balances {
            if b.currency == self.quote {
                cash_balance = Self::parse_decimal(&b.balance, "cash balance")?;
            } else if b.currency == self.base {
                asset_balance = Self::parse_decimal(&b.balance, "asset balance")?;
                asset_average_price = Self::parse_decimal(&b.avg_buy_price, "average price")?;
            }
        }

        // Mark price of zero (conversion failure included) is recorded
        // as "unknown" and blocks sizing downstream.
        let mark_price = match self.get_ticker().await {
            Ok(t) => Decimal::from_f64(t.trade_price).unwrap_or(Decimal::ZERO),
            Err(e) => {
                warn!(error = %e, "Mark price unavailable, snapshot carries mark=0");
                Decimal::ZERO
            }
        };

        let snapshot = AccountSnapshot {
            cash_balance,
            asset_balance,
            asset_average_price,
            mark_price,
        };
        debug!(%snapshot, "Account snapshot");
        Ok(snapshot)
    }

    async fn submit_market_buy(&self, notional: Decimal) -> Result<OrderReceipt, SageError> {
        // Market buys are priced in quote currency (ord_type=price).
        let query = format!(
            "market={}&ord_type=price&price={}&side=bid",
            self.pair, notional
        );
        let order = self.place_order(&query).await?;
        Ok(OrderReceipt { order_id: order.uuid })
    }

    async fn submit_market_sell(&self, quantity: Decimal) -> Result<OrderReceipt, SageError> {
        // Market sells are sized in base currency (ord_type=market).
        let query = format!(
            "market={}&ord_type=market&side=ask&volume={}",
            self.pair, quantity
        );
        let order = self.place_order(&query).await?;
        Ok(OrderReceipt { order_id: order.uuid })
    }

    fn name(&self) -> &str {
        "upbit"
    }
}

#[async_trait]
impl MarketFeed for UpbitClient {
    async fn mark_price(&self) -> Result<Decimal, SageError> {
        let ticker = self.get_ticker().await?;
        Decimal::from_f64(ticker.trade_price)
            .ok_or_else(|| SageError::collaborator("market-feed", "non-finite trade price"))
    }

    async fn market_context(&self) -> Result<MarketContext, SageError> {
        let ticker = self.get_ticker().await?;
        let candles = self.get_daily_candles().await?;

        let mark_price = Decimal::from_f64(ticker.trade_price)
            .ok_or_else(|| SageError::collaborator("market-feed", "non-finite trade price"))?;

        Ok(MarketContext {
            payload: serde_json::json!({
                "pair": self.pair,
                "current_price": ticker.trade_price,
                "change_24h": ticker.signed_change_rate,
                "volume_24h": ticker.acc_trade_price_24h,
                "daily_candles": candles,
            }),
            mark_price,
            change_24h: ticker.signed_change_rate,
            captured_at: Utc::now(),
        })
    }

    fn name(&self) -> &str {
        "upbit"
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Split "KRW-BTC" into ("KRW", "BTC").
fn split_pair(pair: &str) -> Result<(String, String), SageError> {
    match pair.split_once('-') {
        Some((quote, base)) if !quote.is_empty() && !base.is_empty() => {
            Ok((quote.to_string(), base.to_string()))
        }
        _ => Err(SageError::Config(format!(
            "pair must look like QUOTE-BASE, got {pair:?}"
        ))),
    }
}

/// Decode a JSON body, mapping non-2xx statuses and parse failures to
/// collaborator errors.
async fn read_json<T: for<'de> Deserialize<'de>>(
    resp: reqwest::Response,
    collaborator: &str,
) -> Result<T, SageError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(SageError::collaborator(
            collaborator,
            format!("HTTP {status}: {body}"),
        ));
    }
    resp.json()
        .await
        .map_err(|e| SageError::collaborator(collaborator, e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
