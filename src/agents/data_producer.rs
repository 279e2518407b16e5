// =============================================================================
// Data-Producer Agents (C5)
// =============================================================================
//
// Periodic pollers of external sources. `MarketDataProducerAgent` polls the
// exchange connector's ticker for one pair and enriches it with RSI/ATR/MOM
// once its rolling buffer is warm. `MoatDataProducerAgent` stands in for the
// out-of-scope auxiliary adapters (GitHub API, logistics feeds, government
// and corporate indicators): it generates the same fixed schema the real
// adapter would publish, synthetically, the way `PaperExchangeConnector`
// simulates fills in place of a real exchange.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use tracing::{debug, warn};

use crate::agent::{Agent, AgentId};
use crate::error::EngineError;
use crate::handles::EngineContext;
use crate::indicators::atr;
use crate::indicators::rsi::calculate_rsi;
use crate::messages::{FeatureFrame, FeatureValue, MarketSample};
use crate::types::ProductFocus;

const MOMENTUM_PERIOD: usize = 14;
const BUFFER_CAP: usize = MOMENTUM_PERIOD * 3;

/// Polls `ticker(pair)` every `fetch_interval` seconds and publishes enriched
/// feature frames on `market-data:{pair}`.
pub struct MarketDataProducerAgent {
    id: AgentId,
    name: String,
    pair: String,
    fetch_interval: f64,
    last_fetch: RwLock<f64>,
    history: RwLock<Vec<MarketSample>>,
    cache: RwLock<Option<FeatureFrame>>,
}

impl MarketDataProducerAgent {
    pub fn new(ctx: &EngineContext, pair: impl Into<String>, fetch_interval: f64) -> Self {
        let pair = pair.into();
        let id = ctx.ids.next_id();
        Self {
            id,
            name: format!("market_producer_{pair}_{id}"),
            pair,
            fetch_interval,
            last_fetch: RwLock::new(0.0),
            history: RwLock::new(Vec::new()),
            cache: RwLock::new(None),
        }
    }

    async fn fetch_and_publish(&self, ctx: &EngineContext) -> anyhow::Result<()> {
        let ticker = match ctx.exchange.ticker(&self.pair).await {
            Ok(t) => t,
            Err(e) => {
                warn!(pair = %self.pair, cause = %e, error = %EngineError::TransientExternal, "market data fetch failed, falling back to cache");
                if let Some(cached) = self.cache.read().clone() {
                    ctx.bus.publish(
                        format!("market-data:{}", self.pair),
                        crate::bus::Payload::Feature(cached),
                    );
                }
                return Ok(());
            }
        };

        let sample = MarketSample {
            close: ticker.close,
            high: ticker.high_24h,
            low: ticker.low_24h,
            timestamp: ctx.now_secs(),
        };

        let mut history = self.history.write();
        history.push(sample);
        if history.len() > BUFFER_CAP {
            let excess = history.len() - BUFFER_CAP;
            history.drain(0..excess);
        }
        let warm = history.len() >= MOMENTUM_PERIOD + 1;
        let closes: Vec<f64> = history.iter().map(|s| s.close).collect();
        let samples: Vec<MarketSample> = history.clone();
        drop(history);

        let mut features = HashMap::new();
        features.insert("close".to_string(), FeatureValue::Number(sample.close));
        features.insert("high".to_string(), FeatureValue::Number(sample.high));
        features.insert("low".to_string(), FeatureValue::Number(sample.low));

        if warm {
            let rsi = calculate_rsi(&closes, MOMENTUM_PERIOD);
            let atr_value = atr::calculate_atr(&samples, MOMENTUM_PERIOD).unwrap_or(0.0);
            let prior = closes[closes.len() - MOMENTUM_PERIOD - 1];
            let mom = if prior != 0.0 {
                (sample.close - prior) / prior * 100.0
            } else {
                0.0
            };
            features.insert("RSI".to_string(), FeatureValue::Number(rsi));
            features.insert("ATR".to_string(), FeatureValue::Number(atr_value));
            features.insert("MOM".to_string(), FeatureValue::Number(mom));
        }

        let frame = FeatureFrame {
            source: self.name.clone(),
            timestamp: ctx.now_secs(),
            target: self.pair.clone(),
            features,
        };

        *self.cache.write() = Some(frame.clone());
        ctx.bus.publish(
            format!("market-data:{}", self.pair),
            crate::bus::Payload::Feature(frame),
        );
        Ok(())
    }
}

#[async_trait]
impl Agent for MarketDataProducerAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn step(&self, ctx: &EngineContext) -> anyhow::Result<()> {
        let now = ctx.now_secs();
        let due = now - *self.last_fetch.read() >= self.fetch_interval;
        if !due {
            return Ok(());
        }
        *self.last_fetch.write() = now;
        self.fetch_and_publish(ctx).await
    }
}

/// Synthetic producer for one of the four "cross-moat" auxiliary channels.
/// Publishes on `{channel_prefix}-data:{target}` every `fetch_interval`
/// seconds, where `target` names the entity tracked (e.g. a language or
/// jurisdiction) rather than a trading pair.
pub struct MoatDataProducerAgent {
    id: AgentId,
    name: String,
    focus: ProductFocus,
    target: String,
    channel_prefix: &'static str,
    fetch_interval: f64,
    last_fetch: RwLock<f64>,
    cache: RwLock<Option<FeatureFrame>>,
}

impl MoatDataProducerAgent {
    pub fn new(ctx: &EngineContext, focus: ProductFocus, target: impl Into<String>, fetch_interval: f64) -> Self {
        let target = target.into();
        let id = ctx.ids.next_id();
        let channel_prefix = match focus {
            ProductFocus::Code => "code",
            ProductFocus::Logistics => "logistics",
            ProductFocus::Government => "government",
            ProductFocus::Corporations => "corporate",
            ProductFocus::Finance => "finance",
        };
        Self {
            id,
            name: format!("moat_producer_{channel_prefix}_{target}_{id}"),
            focus,
            target,
            channel_prefix,
            fetch_interval,
            last_fetch: RwLock::new(0.0),
            cache: RwLock::new(None),
        }
    }

    fn synthesize(&self) -> FeatureFrame {
        let mut rng = rand::thread_rng();
        let mut features = HashMap::new();

        match self.focus {
            ProductFocus::Code => {
                let commits_24h: f64 = rng.gen_range(0.0..200.0);
                let contributors: f64 = rng.gen_range(1.0..50.0);
                let open_issues: f64 = rng.gen_range(1.0..100.0);
                let novelty = (commits_24h / contributors.max(1.0) * 10.0).clamp(0.5, 9.5);
                let entropy = if open_issues > 0.0 {
                    contributors * (commits_24h + 1.0).ln() / open_issues.sqrt()
                } else {
                    0.0
                };
                features.insert("commits_24h".into(), FeatureValue::Number(commits_24h));
                features.insert("contributors".into(), FeatureValue::Number(contributors));
                features.insert("open_issues".into(), FeatureValue::Number(open_issues));
                features.insert("novelty_score".into(), FeatureValue::Number(novelty));
                features.insert("dependency_entropy".into(), FeatureValue::Number(entropy));
            }
            ProductFocus::Logistics => {
                features.insert("shipment_volume".into(), FeatureValue::Number(rng.gen_range(0.0..1.0)));
                features.insert("congestion_index".into(), FeatureValue::Number(rng.gen_range(0.0..1.0)));
            }
            ProductFocus::Government => {
                features.insert("policy_activity".into(), FeatureValue::Number(rng.gen_range(0.0..1.0)));
            }
            ProductFocus::Corporations => {
                features.insert("filing_activity".into(), FeatureValue::Number(rng.gen_range(0.0..1.0)));
            }
            ProductFocus::Finance => {
                features.insert("macro_signal".into(), FeatureValue::Number(rng.gen_range(-1.0..1.0)));
            }
        }

        FeatureFrame {
            source: self.name.clone(),
            timestamp: 0.0,
            target: self.target.clone(),
            features,
        }
    }
}

#[async_trait]
impl Agent for MoatDataProducerAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn step(&self, ctx: &EngineContext) -> anyhow::Result<()> {
        let now = ctx.now_secs();
        if now - *self.last_fetch.read() < self.fetch_interval {
            return Ok(());
        }
        *self.last_fetch.write() = now;

        let mut frame = self.synthesize();
        frame.timestamp = now;
        debug!(target = %self.target, channel = self.channel_prefix, "moat frame synthesized");
        *self.cache.write() = Some(frame.clone());
        ctx.shared_state
            .set(format!("moat:{}:{}", self.channel_prefix, self.target), &frame);
        ctx.bus.publish(
            format!("{}-data:{}", self.channel_prefix, self.target),
            crate::bus::Payload::Feature(frame),
        );
        Ok(())
    }
}
