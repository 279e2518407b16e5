// =============================================================================
// Technical-Analysis Agent — baseline signal producer (C6)
// =============================================================================
//
// Reactive: all work happens in the `market-data:{pair}` callback registered
// at construction. `step()` is a no-op — the scheduler still owns and steps
// this agent so it participates in the same lifecycle as every other agent,
// but its real driver is the bus.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use tracing::debug;

use crate::agent::{Agent, AgentId};
use crate::bus::{Message, Payload};
use crate::handles::EngineContext;
use crate::indicators::{bollinger, macd, rsi};
use crate::messages::TradeIdea;
use crate::types::{Direction, OrderType};

const WINDOW_CAP: usize = 100;
const MACD_SIGNAL_PERIOD: usize = 9;
const IDEA_AMOUNT: f64 = 0.001;

struct Candidate {
    direction: Direction,
    confidence: f64,
    signal_type: &'static str,
    indicator_value: f64,
}

pub struct TechnicalAnalysisAgent {
    id: AgentId,
    name: String,
    pair: String,
    rsi_period: usize,
    macd_fast: usize,
    macd_slow: usize,
    bb_period: usize,
    bb_std_dev: f64,
    closes: RwLock<VecDeque<f64>>,
    prev_macd: RwLock<Option<(f64, f64)>>,
    last_idea_ts: RwLock<f64>,
}

impl TechnicalAnalysisAgent {
    /// Construct and subscribe to `market-data:{pair}` in one step. The
    /// returned handle is what the scheduler registers.
    pub fn spawn(ctx: Arc<EngineContext>, pair: impl Into<String>) -> Arc<Self> {
        let pair = pair.into();
        let id = ctx.ids.next_id();
        let mut rng = rand::thread_rng();

        let agent = Arc::new(Self {
            id,
            name: format!("ta_{pair}_{id}"),
            pair: pair.clone(),
            rsi_period: (14_i64 + rng.gen_range(-2..=2)).max(2) as usize,
            macd_fast: (12_i64 + rng.gen_range(-1..=1)).max(2) as usize,
            macd_slow: (26_i64 + rng.gen_range(-2..=2)).max(3) as usize,
            bb_period: (20_i64 + rng.gen_range(-2..=2)).max(2) as usize,
            bb_std_dev: 2.0,
            closes: RwLock::new(VecDeque::with_capacity(WINDOW_CAP)),
            prev_macd: RwLock::new(None),
            last_idea_ts: RwLock::new(0.0),
        });

        let topic = format!("market-data:{pair}");
        let callback_agent = agent.clone();
        let callback_ctx = ctx.clone();
        let _ = ctx.bus.subscribe(topic, move |msg| {
            let agent = callback_agent.clone();
            let ctx = callback_ctx.clone();
            async move { agent.handle_frame(msg, &ctx).await }
        });

        agent
    }

    async fn handle_frame(&self, msg: Message, ctx: &EngineContext) {
        let frame = match msg.payload {
            Payload::Feature(f) => f,
            _ => return,
        };
        let Some(close) = frame.features.get("close").and_then(|v| v.as_f64()) else {
            return;
        };

        {
            let mut closes = self.closes.write();
            closes.push_back(close);
            if closes.len() > WINDOW_CAP {
                closes.pop_front();
            }
        }

        let warm_len = self.macd_slow.max(self.rsi_period);
        let closes: Vec<f64> = self.closes.read().iter().copied().collect();
        if closes.len() < warm_len {
            return;
        }

        let candidates = self.evaluate(&closes, close);
        let Some(best) = candidates
            .into_iter()
            .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap())
        else {
            return;
        };

        let now = ctx.now_secs();
        let signal_cooldown = ctx.config.read().signal_cooldown_secs;
        if now - *self.last_idea_ts.read() < signal_cooldown {
            return;
        }
        *self.last_idea_ts.write() = now;

        let idea = TradeIdea {
            source: self.name.clone(),
            pair: self.pair.clone(),
            direction: best.direction,
            order_type: OrderType::Market,
            amount: IDEA_AMOUNT,
            current_price: close,
            timestamp: now,
            confidence: best.confidence,
            signal_type: Some(best.signal_type.to_string()),
            indicator_value: Some(best.indicator_value),
            prediction_score: None,
            interestingness_score: None,
            simulated_pnl: None,
            total_pnl: None,
            win_rate: None,
            trade_count: None,
            product_focus: None,
        };

        debug!(pair = %self.pair, signal = best.signal_type, confidence = best.confidence, "baseline idea emitted");
        ctx.bus.publish(
            format!("baseline-trade-ideas:{}", self.pair),
            Payload::Idea(idea.clone()),
        );
        ctx.bus.publish("baseline-trade-ideas", Payload::Idea(idea));
    }

    fn evaluate(&self, closes: &[f64], close: f64) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        let rsi_value = rsi::calculate_rsi(closes, self.rsi_period);
        if rsi_value < 30.0 {
            candidates.push(Candidate {
                direction: Direction::Buy,
                confidence: ((30.0 - rsi_value) / 30.0).min(0.9),
                signal_type: "RSI Oversold",
                indicator_value: rsi_value,
            });
        }
        if rsi_value > 70.0 {
            candidates.push(Candidate {
                direction: Direction::Sell,
                confidence: ((rsi_value - 70.0) / 30.0).min(0.9),
                signal_type: "RSI Overbought",
                indicator_value: rsi_value,
            });
        }

        if let Some(m) = macd::calculate_macd(closes, self.macd_fast, self.macd_slow, MACD_SIGNAL_PERIOD) {
            let prev = self.prev_macd.write().replace((m.macd_line, m.signal_line));
            if let Some((prev_macd, prev_signal)) = prev {
                let prev_diff = prev_macd - prev_signal;
                let curr_diff = m.histogram;
                if prev_diff <= 0.0 && curr_diff > 0.0 {
                    candidates.push(Candidate {
                        direction: Direction::Buy,
                        confidence: (curr_diff.abs() * 10.0).clamp(0.55, 0.85),
                        signal_type: "MACD Bullish Cross",
                        indicator_value: curr_diff,
                    });
                } else if prev_diff >= 0.0 && curr_diff < 0.0 {
                    candidates.push(Candidate {
                        direction: Direction::Sell,
                        confidence: (curr_diff.abs() * 10.0).clamp(0.55, 0.85),
                        signal_type: "MACD Bearish Cross",
                        indicator_value: curr_diff,
                    });
                }
            }
        }

        if let Some(bb) = bollinger::calculate_bollinger(closes, self.bb_period, self.bb_std_dev) {
            if close <= bb.lower {
                let near = bb.lower != 0.0 && ((close - bb.lower).abs() / bb.lower) < 0.001;
                candidates.push(Candidate {
                    direction: Direction::Buy,
                    confidence: if near { 0.70 } else { 0.60 },
                    signal_type: "Bollinger Lower Band",
                    indicator_value: close,
                });
            }
            if close >= bb.upper {
                let near = bb.upper != 0.0 && ((close - bb.upper).abs() / bb.upper) < 0.001;
                candidates.push(Candidate {
                    direction: Direction::Sell,
                    confidence: if near { 0.70 } else { 0.60 },
                    signal_type: "Bollinger Upper Band",
                    indicator_value: close,
                });
            }
            if close > 1.02 * bb.middle {
                candidates.push(Candidate {
                    direction: Direction::Buy,
                    confidence: 0.65,
                    signal_type: "Price Extension Above Mid",
                    indicator_value: close,
                });
            }
            if close < 0.98 * bb.middle {
                candidates.push(Candidate {
                    direction: Direction::Sell,
                    confidence: 0.65,
                    signal_type: "Price Extension Below Mid",
                    indicator_value: close,
                });
            }
        }

        candidates
    }
}

#[async_trait]
impl Agent for TechnicalAnalysisAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn step(&self, _ctx: &EngineContext) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageBus;
    use crate::exchange::paper::PaperExchangeConnector;
    use crate::messages::{FeatureFrame, FeatureValue};
    use crate::runtime_config::RuntimeConfig;
    use crate::shared_state::SharedState;
    use crate::storage::Storage;
    use std::collections::HashMap;

    fn test_ctx() -> Arc<EngineContext> {
        Arc::new(EngineContext::new(
            Arc::new(MessageBus::new()),
            Arc::new(SharedState::new()),
            Arc::new(PaperExchangeConnector::new(vec![])),
            Arc::new(RwLock::new(RuntimeConfig::default())),
            Arc::new(Storage::in_memory().unwrap()),
        ))
    }

    fn frame(close: f64) -> Message {
        let mut features = HashMap::new();
        features.insert("close".to_string(), FeatureValue::Number(close));
        Message {
            topic: "market-data:XXBTZUSD".to_string(),
            payload: Payload::Feature(FeatureFrame {
                source: "test".into(),
                timestamp: 0.0,
                target: "XXBTZUSD".into(),
                features,
            }),
        }
    }

    #[tokio::test]
    async fn stays_silent_until_warm() {
        let ctx = test_ctx();
        let agent = TechnicalAnalysisAgent::spawn(ctx.clone(), "XXBTZUSD");
        agent.handle_frame(frame(100.0), &ctx).await;
        assert!(agent.closes.read().len() == 1);
    }

    #[tokio::test]
    async fn oversold_descending_series_emits_buy_candidate() {
        let ctx = test_ctx();
        let agent = TechnicalAnalysisAgent::spawn(ctx.clone(), "XXBTZUSD");
        for i in 0..40 {
            agent.handle_frame(frame(100.0 - i as f64), &ctx).await;
        }
        let closes: Vec<f64> = agent.closes.read().iter().copied().collect();
        let candidates = agent.evaluate(&closes, *closes.last().unwrap());
        assert!(candidates.iter().any(|c| c.direction == Direction::Buy));
    }

    #[tokio::test]
    async fn cooldown_suppresses_repeat_ideas() {
        let ctx = test_ctx();
        let agent = TechnicalAnalysisAgent::spawn(ctx.clone(), "XXBTZUSD");
        for i in 0..40 {
            agent.handle_frame(frame(100.0 - i as f64), &ctx).await;
        }
        let first_ts = *agent.last_idea_ts.read();
        agent.handle_frame(frame(50.0), &ctx).await;
        let second_ts = *agent.last_idea_ts.read();
        assert_eq!(first_ts, second_ts);
    }
}
