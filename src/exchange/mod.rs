// =============================================================================
// Exchange Connector — external market-data / order-placement boundary
// =============================================================================
//
// The real connector (HTTP client, HMAC request signing, rate limiting) is an
// external collaborator described only by this interface (see Non-goals).
// `PaperExchangeConnector` is the in-scope, in-process implementation used by
// every agent in this codebase; it simulates fills locally.
// =============================================================================

pub mod paper;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{Direction, OrderType};

/// Current best bid/ask and recent range for a pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ticker {
    pub bid: f64,
    pub ask: f64,
    pub close: f64,
    pub open: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub volume_24h: f64,
}

/// One OHLCV bar.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ohlc {
    pub timestamp: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A tradable pair as reported by `tradable_pairs()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairInfo {
    pub pair: String,
    pub status: String,
    pub quote: String,
}

impl PairInfo {
    pub fn is_online_usd(&self) -> bool {
        self.status.eq_ignore_ascii_case("online") && self.quote.eq_ignore_ascii_case("usd")
    }
}

/// Result of a `place_order` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub status: String,
    pub fill_price: f64,
    pub filled_amount: f64,
}

/// The interface every agent that touches the market uses. Implementations
/// must be safe to call concurrently from any callback thread.
#[async_trait]
pub trait ExchangeConnector: Send + Sync {
    async fn ticker(&self, pair: &str) -> anyhow::Result<Ticker>;
    async fn ohlc(&self, pair: &str, interval_minutes: u32, limit: u32) -> anyhow::Result<Vec<Ohlc>>;
    async fn tradable_pairs(&self) -> anyhow::Result<Vec<PairInfo>>;
    async fn place_order(
        &self,
        pair: &str,
        order_type: OrderType,
        direction: Direction,
        amount: f64,
        price: Option<f64>,
    ) -> anyhow::Result<OrderAck>;
    async fn account_balance(&self) -> anyhow::Result<std::collections::HashMap<String, f64>>;
}
