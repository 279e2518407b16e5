// =============================================================================
// Pattern-Learner Agent — swarm signal producer (C7)
// =============================================================================
//
// Reactive: subscribes to the market-data channel for its pair (or a moat
// channel, when `product_focus != Finance`) and to `system-control` for the
// halt signal. Writes a `PolicyRecord` belief-state snapshot into shared
// state on every frame regardless of whether it emits a trade idea.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use tracing::debug;

use crate::agent::{Agent, AgentId};
use crate::bus::{Message, Payload};
use crate::handles::EngineContext;
use crate::messages::{PolicyRecord, TradeIdea};
use crate::types::{Direction, OrderType, ProductFocus};

const HISTORY_CAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Flat,
    Long,
}

struct TradeBookkeeping {
    entry_price: Option<f64>,
    total_pnl: f64,
    trade_count: u32,
    win_count: u32,
    history: VecDeque<bool>,
}

impl TradeBookkeeping {
    fn new() -> Self {
        Self {
            entry_price: None,
            total_pnl: 0.0,
            trade_count: 0,
            win_count: 0,
            history: VecDeque::with_capacity(HISTORY_CAP),
        }
    }

    fn win_rate(&self) -> f64 {
        if self.history.is_empty() {
            0.0
        } else {
            self.win_count as f64 / self.history.len() as f64
        }
    }
}

pub struct PatternLearnerAgent {
    id: AgentId,
    name: String,
    pair: String,
    product_focus: ProductFocus,
    rsi_threshold: f64,
    atr_multiplier: f64,
    parent_id: Option<u64>,
    generation: u32,
    birth_timestamp: f64,

    position: RwLock<Position>,
    bookkeeping: RwLock<TradeBookkeeping>,
    trading_halted: AtomicBool,
}

impl PatternLearnerAgent {
    pub fn spawn(
        ctx: Arc<EngineContext>,
        pair: impl Into<String>,
        product_focus: ProductFocus,
        parent_id: Option<u64>,
        generation: u32,
    ) -> Arc<Self> {
        let pair = pair.into();
        let id = ctx.ids.next_id();
        let mut rng = rand::thread_rng();
        let birth_timestamp = ctx.now_secs();

        let agent = Arc::new(Self {
            id,
            name: format!("pattern_learner_{pair}_{id}"),
            pair: pair.clone(),
            product_focus,
            rsi_threshold: 70.0 + rng.gen_range(-5.0..=5.0),
            atr_multiplier: rng.gen_range(0.8..=1.2),
            parent_id,
            generation,
            birth_timestamp,
            position: RwLock::new(Position::Flat),
            bookkeeping: RwLock::new(TradeBookkeeping::new()),
            trading_halted: AtomicBool::new(false),
        });

        let channel_prefix = match product_focus {
            ProductFocus::Finance => "market".to_string(),
            ProductFocus::Code => "code".to_string(),
            ProductFocus::Logistics => "logistics".to_string(),
            ProductFocus::Government => "government".to_string(),
            ProductFocus::Corporations => "corporate".to_string(),
        };
        let data_topic = format!("{channel_prefix}-data:{pair}");

        let cb_agent = agent.clone();
        let cb_ctx = ctx.clone();
        let _ = ctx.bus.subscribe(data_topic, move |msg| {
            let agent = cb_agent.clone();
            let ctx = cb_ctx.clone();
            async move { agent.handle_frame(msg, &ctx).await }
        });

        let halt_agent = agent.clone();
        let _ = ctx.bus.subscribe("system-control", move |msg| {
            let agent = halt_agent.clone();
            async move { agent.handle_control(msg).await }
        });

        agent
    }

    async fn handle_control(&self, msg: Message) {
        if let Payload::Control(control) = msg.payload {
            if control.command == "HALT_TRADING" {
                self.trading_halted.store(true, Ordering::Release);
            }
        }
    }

    async fn handle_frame(&self, msg: Message, ctx: &EngineContext) {
        if self.trading_halted.load(Ordering::Acquire) {
            return;
        }
        let frame = match msg.payload {
            Payload::Feature(f) => f,
            _ => return,
        };

        let close = frame.features.get("close").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let rsi = frame.features.get("RSI").and_then(|v| v.as_f64()).unwrap_or(50.0);
        let atr = frame.features.get("ATR").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let mom = frame.features.get("MOM").and_then(|v| v.as_f64()).unwrap_or(0.0);

        let prediction_score = (0.5 + 2.0 * mom.abs() - 0.05 * atr).clamp(0.1, 0.9);
        let strategy_vector = [
            self.rsi_threshold,
            self.atr_multiplier,
            mom,
            100.0 - 2.0 * (50.0 - rsi).abs(),
        ];

        let now = ctx.now_secs();
        let age_minutes = (now - self.birth_timestamp) / 60.0;
        let decay_factor = PolicyRecord::decay_factor(age_minutes);
        let pattern_current_value = PolicyRecord::current_value(prediction_score, decay_factor);

        let record = PolicyRecord {
            prediction_score,
            strategy_vector,
            close_price: close,
            parent_id: self.parent_id,
            generation: self.generation,
            birth_timestamp: self.birth_timestamp,
            agent_id: self.id,
            product_focus: self.product_focus,
            pattern_age_minutes: age_minutes,
            pattern_decay_factor: decay_factor,
            pattern_current_value,
            raw_features: frame.features.clone(),
        };
        ctx.shared_state.set(format!("policy:{}", self.name), &record);

        if atr > 10.0 && rsi > 45.0 && rsi < 55.0 {
            ctx.bus.publish(
                "system-build-request",
                Payload::Build(crate::messages::BuildRequest {
                    tool_name: format!("{:?}-regime-classifier", self.product_focus),
                    requested_by: self.name.clone(),
                    timestamp: now,
                }),
            );
        }

        let position = *self.position.read();
        if position == Position::Flat && prediction_score > 0.8 && rsi < 30.0 && mom > 0.0 {
            self.open_long(ctx, close, now, prediction_score);
        } else if position == Position::Long && rsi > self.rsi_threshold {
            self.close_long(ctx, close, now, prediction_score);
        }
    }

    fn open_long(&self, ctx: &EngineContext, price: f64, now: f64, prediction_score: f64) {
        {
            let mut book = self.bookkeeping.write();
            book.entry_price = Some(price);
            book.trade_count += 1;
        }
        *self.position.write() = Position::Long;
        self.emit_idea(ctx, Direction::Buy, price, now, prediction_score);
    }

    fn close_long(&self, ctx: &EngineContext, price: f64, now: f64, prediction_score: f64) {
        let (total_pnl, win_rate, trade_count, suppressed) = {
            let mut book = self.bookkeeping.write();
            let Some(entry) = book.entry_price.take() else {
                return;
            };
            let realized = if entry != 0.0 { (price - entry) / entry * 100.0 } else { 0.0 };
            book.total_pnl += realized;
            let win = realized > 0.0;
            if win {
                book.win_count += 1;
            }
            book.history.push_back(win);
            if book.history.len() > HISTORY_CAP {
                book.history.pop_front();
            }
            let suppressed = book.total_pnl < -5.0 && book.trade_count > 5;
            (book.total_pnl, book.win_rate(), book.trade_count, suppressed)
        };
        *self.position.write() = Position::Flat;

        if suppressed {
            debug!(agent = %self.name, total_pnl, "suppressing losing strategy's idea");
            return;
        }

        let interestingness_score = 40.0 * prediction_score
            + total_pnl.clamp(-20.0, 20.0)
            + 20.0
            + (40.0 * (prediction_score - 0.5).abs()).min(20.0);

        let idea = TradeIdea {
            source: self.name.clone(),
            pair: self.pair.clone(),
            direction: Direction::Sell,
            order_type: OrderType::Market,
            amount: 0.001,
            current_price: price,
            timestamp: now,
            confidence: prediction_score,
            signal_type: None,
            indicator_value: None,
            prediction_score: Some(prediction_score),
            interestingness_score: Some(interestingness_score),
            simulated_pnl: Some(total_pnl),
            total_pnl: Some(total_pnl),
            win_rate: Some(win_rate),
            trade_count: Some(trade_count),
            product_focus: Some(self.product_focus),
        };
        ctx.bus.publish("mycelial-trade-ideas", Payload::Idea(idea));
    }

    fn emit_idea(&self, ctx: &EngineContext, direction: Direction, price: f64, now: f64, prediction_score: f64) {
        let book = self.bookkeeping.read();
        if book.total_pnl < -5.0 && book.trade_count > 5 {
            return;
        }
        let idea = TradeIdea {
            source: self.name.clone(),
            pair: self.pair.clone(),
            direction,
            order_type: OrderType::Market,
            amount: 0.001,
            current_price: price,
            timestamp: now,
            confidence: prediction_score,
            signal_type: None,
            indicator_value: None,
            prediction_score: Some(prediction_score),
            interestingness_score: None,
            simulated_pnl: Some(0.0),
            total_pnl: Some(book.total_pnl),
            win_rate: Some(book.win_rate()),
            trade_count: Some(book.trade_count),
            product_focus: Some(self.product_focus),
        };
        drop(book);
        ctx.bus.publish("mycelial-trade-ideas", Payload::Idea(idea));
    }
}

#[async_trait]
impl Agent for PatternLearnerAgent {
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
    use crate::messages::{FeatureFrame, FeatureValue, SystemControl};
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

    fn frame(close: f64, rsi: f64, atr: f64, mom: f64) -> Message {
        let mut features = HashMap::new();
        features.insert("close".to_string(), FeatureValue::Number(close));
        features.insert("RSI".to_string(), FeatureValue::Number(rsi));
        features.insert("ATR".to_string(), FeatureValue::Number(atr));
        features.insert("MOM".to_string(), FeatureValue::Number(mom));
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
    async fn writes_policy_record_on_every_frame() {
        let ctx = test_ctx();
        let agent = PatternLearnerAgent::spawn(ctx.clone(), "XXBTZUSD", ProductFocus::Finance, None, 0);
        agent.handle_frame(frame(100.0, 50.0, 1.0, 0.1), &ctx).await;
        let record: Option<PolicyRecord> = ctx.shared_state.get(&format!("policy:{}", agent.name));
        assert!(record.is_some());
    }

    #[tokio::test]
    async fn entry_rule_opens_long_on_high_confidence_oversold() {
        let ctx = test_ctx();
        let agent = PatternLearnerAgent::spawn(ctx.clone(), "XXBTZUSD", ProductFocus::Finance, None, 0);
        agent.handle_frame(frame(100.0, 20.0, 0.1, 5.0), &ctx).await;
        assert_eq!(*agent.position.read(), Position::Long);
    }

    #[tokio::test]
    async fn halt_control_stops_frame_processing() {
        let ctx = test_ctx();
        let agent = PatternLearnerAgent::spawn(ctx.clone(), "XXBTZUSD", ProductFocus::Finance, None, 0);
        agent
            .handle_control(Message {
                topic: "system-control".into(),
                payload: Payload::Control(SystemControl {
                    command: "HALT_TRADING".into(),
                    reason: None,
                    source: None,
                }),
            })
            .await;
        agent.handle_frame(frame(100.0, 20.0, 0.1, 5.0), &ctx).await;
        assert_eq!(*agent.position.read(), Position::Flat);
    }

    #[tokio::test]
    async fn exit_rule_closes_long_above_threshold() {
        let ctx = test_ctx();
        let agent = PatternLearnerAgent::spawn(ctx.clone(), "XXBTZUSD", ProductFocus::Finance, None, 0);
        agent.handle_frame(frame(100.0, 20.0, 0.1, 5.0), &ctx).await;
        assert_eq!(*agent.position.read(), Position::Long);
        agent.handle_frame(frame(110.0, 95.0, 0.1, 5.0), &ctx).await;
        assert_eq!(*agent.position.read(), Position::Flat);
    }
}
