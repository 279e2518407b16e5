// =============================================================================
// Signal-Collision Synthesizer / Trader (C8)
// =============================================================================
//
// Subscribes to both idea channels. Tracks one open position per pair per
// stream (baseline, mycelial, synthesized) so each stream's simulated P&L can
// be compared against the others. A synthesized (real) order is only placed
// when the two independently-derived signals agree within the collision
// window.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::{Agent, AgentId};
use crate::bus::{Message, Payload};
use crate::handles::EngineContext;
use crate::messages::{Trade, TradeConfirmation, TradeResult};
use crate::types::{Direction, OrderType, Stream};

const SYNTH_AMOUNT: f64 = 0.001;

struct IdeaSlot {
    direction: Direction,
    timestamp: f64,
    price: f64,
}

/// A closed position, enough to build a durable `Trade` row.
struct ClosedLeg {
    net_pct: f64,
    entry_price: f64,
    entry_ts: f64,
}

struct StreamBook {
    positions: RwLock<HashMap<String, (f64, f64, Direction)>>,
    cumulative_pnl: RwLock<f64>,
    trade_count: RwLock<u32>,
}

impl StreamBook {
    fn new() -> Self {
        Self {
            positions: RwLock::new(HashMap::new()),
            cumulative_pnl: RwLock::new(0.0),
            trade_count: RwLock::new(0),
        }
    }

    /// Apply an open/close transition for `direction` at `price`/`timestamp`,
    /// returning the closed leg's detail when a position was closed.
    fn apply(
        &self,
        pair: &str,
        direction: Direction,
        price: f64,
        timestamp: f64,
        round_trip_cost_pct: f64,
    ) -> Option<ClosedLeg> {
        match direction {
            Direction::Buy => {
                self.positions
                    .write()
                    .insert(pair.to_string(), (price, timestamp, Direction::Buy));
                None
            }
            Direction::Sell => {
                let existing = self.positions.write().remove(pair);
                let (entry_price, entry_ts, _) = existing?;
                if entry_price == 0.0 {
                    return None;
                }
                let raw_pct = (price - entry_price) / entry_price * 100.0;
                let net_pct = raw_pct - round_trip_cost_pct;
                *self.cumulative_pnl.write() += net_pct;
                *self.trade_count.write() += 1;
                Some(ClosedLeg {
                    net_pct,
                    entry_price,
                    entry_ts,
                })
            }
        }
    }
}

pub struct SynthesizerAgent {
    id: AgentId,
    name: String,
    recent_mycelial: RwLock<HashMap<String, IdeaSlot>>,
    recent_baseline: RwLock<HashMap<String, IdeaSlot>>,
    baseline_book: StreamBook,
    mycelial_book: StreamBook,
    synthesized_book: StreamBook,
}

impl SynthesizerAgent {
    pub fn spawn(ctx: Arc<EngineContext>) -> Arc<Self> {
        let id = ctx.ids.next_id();
        let agent = Arc::new(Self {
            id,
            name: format!("synthesizer_{id}"),
            recent_mycelial: RwLock::new(HashMap::new()),
            recent_baseline: RwLock::new(HashMap::new()),
            baseline_book: StreamBook::new(),
            mycelial_book: StreamBook::new(),
            synthesized_book: StreamBook::new(),
        });

        let cb1_agent = agent.clone();
        let cb1_ctx = ctx.clone();
        let _ = ctx.bus.subscribe("baseline-trade-ideas", move |msg| {
            let agent = cb1_agent.clone();
            let ctx = cb1_ctx.clone();
            async move { agent.handle_idea(msg, Stream::Baseline, &ctx).await }
        });

        let cb2_agent = agent.clone();
        let cb2_ctx = ctx.clone();
        let _ = ctx.bus.subscribe("mycelial-trade-ideas", move |msg| {
            let agent = cb2_agent.clone();
            let ctx = cb2_ctx.clone();
            async move { agent.handle_idea(msg, Stream::Mycelial, &ctx).await }
        });

        agent
    }

    async fn handle_idea(&self, msg: Message, stream: Stream, ctx: &EngineContext) {
        if ctx.is_halted() {
            return;
        }
        let idea = match msg.payload {
            Payload::Idea(i) => i,
            _ => return,
        };

        let round_trip_cost = ctx.config.read().round_trip_cost_pct();
        let book = match stream {
            Stream::Baseline => &self.baseline_book,
            Stream::Mycelial => &self.mycelial_book,
            Stream::Synthesized => unreachable!("synthesizer never receives its own stream"),
        };
        book.apply(
            &idea.pair,
            idea.direction,
            idea.current_price,
            idea.timestamp,
            round_trip_cost,
        );

        let slot = IdeaSlot {
            direction: idea.direction,
            timestamp: idea.timestamp,
            price: idea.current_price,
        };
        match stream {
            Stream::Baseline => {
                self.recent_baseline.write().insert(idea.pair.clone(), slot);
            }
            Stream::Mycelial => {
                self.recent_mycelial.write().insert(idea.pair.clone(), slot);
            }
            Stream::Synthesized => unreachable!(),
        }

        self.check_collision(&idea.pair, ctx).await;
    }

    async fn check_collision(&self, pair: &str, ctx: &EngineContext) {
        let collision_window = ctx.config.read().collision_window_secs;

        let (m_dir, m_ts, m_price) = {
            let guard = self.recent_mycelial.read();
            let Some(slot) = guard.get(pair) else { return };
            (slot.direction, slot.timestamp, slot.price)
        };
        let (b_dir, b_ts, b_price) = {
            let guard = self.recent_baseline.read();
            let Some(slot) = guard.get(pair) else { return };
            (slot.direction, slot.timestamp, slot.price)
        };

        if (m_ts - b_ts).abs() > collision_window {
            return;
        }

        if m_dir != b_dir {
            warn!(pair, "signal conflict: baseline/mycelial disagree on direction");
            return;
        }

        let direction = m_dir;
        let price = (m_price + b_price) / 2.0;
        let round_trip_cost = ctx.config.read().round_trip_cost_pct();
        let now = ctx.now_secs();
        let closed = self.synthesized_book.apply(pair, direction, price, now, round_trip_cost);

        let order_type = OrderType::Market;
        if let Err(e) = ctx
            .exchange
            .place_order(pair, order_type, direction, SYNTH_AMOUNT, None)
            .await
        {
            warn!(pair, error = %e, "synthesized order placement failed");
            return;
        }

        info!(pair, %direction, "collision detected — synthesized trade executed");

        self.recent_mycelial.write().remove(pair);
        self.recent_baseline.write().remove(pair);

        if let Some(leg) = closed {
            let pnl_pct = leg.net_pct;
            let pnl_absolute = pnl_pct / 100.0 * SYNTH_AMOUNT * price;

            ctx.bus.publish(
                "synthesized-trade-log",
                Payload::Confirmation(TradeConfirmation {
                    pair: pair.to_string(),
                    stream: Stream::Synthesized,
                    direction,
                    pnl_absolute,
                    pnl_pct,
                    timestamp: now,
                }),
            );
            ctx.bus.publish(
                "trade-confirmations",
                Payload::Confirmation(TradeConfirmation {
                    pair: pair.to_string(),
                    stream: Stream::Synthesized,
                    direction,
                    pnl_absolute,
                    pnl_pct,
                    timestamp: now,
                }),
            );

            let (fee_pct, slippage_pct) = {
                let cfg = ctx.config.read();
                (cfg.trading_fee_pct, cfg.slippage_pct)
            };
            let trade = Trade {
                trade_id: Uuid::new_v4().to_string(),
                pair: pair.to_string(),
                strategy_type: "synthesized_collision".to_string(),
                agent_id: self.id,
                pattern_id: None,
                entry_ts: leg.entry_ts,
                exit_ts: now,
                hold_seconds: (now - leg.entry_ts).max(0.0),
                entry_price: leg.entry_price,
                exit_price: price,
                price_change_pct: (price - leg.entry_price) / leg.entry_price * 100.0,
                pnl_pct,
                pnl_absolute,
                result: if pnl_pct >= 0.0 { TradeResult::Win } else { TradeResult::Loss },
                signal_source: "collision".to_string(),
                prediction_score: None,
                cross_moat_score: 0.0,
                collision_detected: true,
                position_size: SYNTH_AMOUNT,
                fees_paid: fee_pct / 100.0 * SYNTH_AMOUNT * price,
                slippage_pct,
            };
            if let Err(e) = ctx.storage.insert_trade(&trade) {
                warn!(pair, error = %e, "failed to persist closed trade");
            }
        }
    }
}

#[async_trait]
impl Agent for SynthesizerAgent {
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
