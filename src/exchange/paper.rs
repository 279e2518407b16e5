// =============================================================================
// Paper Exchange Connector — local order-fill simulation
// =============================================================================
//
// Every call succeeds with a synthetic fill; there is no external network
// call. This mirrors the observed behaviour of a real connector's
// `place_order(..., validate=true)` dry-run path: the response is still
// treated as "executed" for downstream P&L bookkeeping.
// =============================================================================

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use tracing::debug;

use crate::types::{Direction, OrderType};

use super::{ExchangeConnector, Ohlc, OrderAck, PairInfo, Ticker};

/// In-memory last-traded price per pair, seeded on first access.
pub struct PaperExchangeConnector {
    prices: RwLock<HashMap<String, f64>>,
    universe: Vec<PairInfo>,
}

impl PaperExchangeConnector {
    pub fn new(universe: Vec<PairInfo>) -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            universe,
        }
    }

    fn price_for(&self, pair: &str) -> f64 {
        let mut prices = self.prices.write();
        if let Some(p) = prices.get(pair) {
            *p
        } else {
            let mut rng = rand::thread_rng();
            let seeded = rng.gen_range(1.0..50_000.0);
            prices.insert(pair.to_string(), seeded);
            seeded
        }
    }

    fn walk_price(&self, pair: &str) -> f64 {
        let mut prices = self.prices.write();
        let current = *prices.get(pair).unwrap_or(&100.0);
        let mut rng = rand::thread_rng();
        let pct = rng.gen_range(-0.01..0.01);
        let next = (current * (1.0 + pct)).max(0.000_001);
        prices.insert(pair.to_string(), next);
        next
    }
}

#[async_trait]
impl ExchangeConnector for PaperExchangeConnector {
    async fn ticker(&self, pair: &str) -> anyhow::Result<Ticker> {
        let close = self.walk_price(pair);
        let spread = close * 0.0005;
        Ok(Ticker {
            bid: close - spread,
            ask: close + spread,
            close,
            open: close * 0.999,
            high_24h: close * 1.02,
            low_24h: close * 0.98,
            volume_24h: 1_000_000.0,
        })
    }

    async fn ohlc(&self, pair: &str, interval_minutes: u32, limit: u32) -> anyhow::Result<Vec<Ohlc>> {
        let mut bars = Vec::with_capacity(limit as usize);
        let mut close = self.price_for(pair);
        let mut rng = rand::thread_rng();
        for i in 0..limit {
            let open = close;
            let pct = rng.gen_range(-0.01..0.01);
            close = (open * (1.0 + pct)).max(0.000_001);
            let high = open.max(close) * 1.002;
            let low = open.min(close) * 0.998;
            bars.push(Ohlc {
                timestamp: (i as f64) * (interval_minutes as f64) * 60.0,
                open,
                high,
                low,
                close,
                volume: rng.gen_range(10.0..10_000.0),
            });
        }
        Ok(bars)
    }

    async fn tradable_pairs(&self) -> anyhow::Result<Vec<PairInfo>> {
        Ok(self.universe.clone())
    }

    async fn place_order(
        &self,
        pair: &str,
        order_type: OrderType,
        direction: Direction,
        amount: f64,
        price: Option<f64>,
    ) -> anyhow::Result<OrderAck> {
        let fill_price = match (order_type, price) {
            (OrderType::Limit, Some(p)) => p,
            _ => self.walk_price(pair),
        };
        debug!(pair, %direction, amount, fill_price, "paper order filled");
        Ok(OrderAck {
            status: "filled".to_string(),
            fill_price,
            filled_amount: amount,
        })
    }

    async fn account_balance(&self) -> anyhow::Result<HashMap<String, f64>> {
        Ok(HashMap::from([("USD".to_string(), 100_000.0)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector() -> PaperExchangeConnector {
        PaperExchangeConnector::new(vec![PairInfo {
            pair: "XXBTZUSD".into(),
            status: "online".into(),
            quote: "usd".into(),
        }])
    }

    #[tokio::test]
    async fn place_order_always_fills() {
        let c = connector();
        let ack = c
            .place_order("XXBTZUSD", OrderType::Market, Direction::Buy, 0.001, None)
            .await
            .unwrap();
        assert_eq!(ack.status, "filled");
        assert!(ack.fill_price > 0.0);
    }

    #[tokio::test]
    async fn limit_order_fills_at_requested_price() {
        let c = connector();
        let ack = c
            .place_order("XXBTZUSD", OrderType::Limit, Direction::Sell, 0.001, Some(123.45))
            .await
            .unwrap();
        assert!((ack.fill_price - 123.45).abs() < 1e-9);
    }

    #[tokio::test]
    async fn tradable_pairs_returns_configured_universe() {
        let c = connector();
        let pairs = c.tradable_pairs().await.unwrap();
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].is_online_usd());
    }

    #[tokio::test]
    async fn ohlc_returns_requested_length() {
        let c = connector();
        let bars = c.ohlc("XXBTZUSD", 5, 10).await.unwrap();
        assert_eq!(bars.len(), 10);
    }
}
