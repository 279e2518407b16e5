// =============================================================================
// P&L Tracker — per-asset probation / hibernation lifecycle (C10)
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::agent::{Agent, AgentId};
use crate::bus::{Message, Payload};
use crate::handles::EngineContext;
use crate::messages::HibernationNotice;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone)]
struct AssetRecord {
    cumulative_pnl: f64,
    trade_count: u32,
    win_count: u32,
    loss_count: u32,
    probation_level: u8,
    position_size_multiplier: f64,
    first_trade_ts: f64,
    last_trade_ts: f64,
    probation_start_ts: Option<f64>,
    worst_drawdown: f64,
}

impl AssetRecord {
    fn new(now: f64) -> Self {
        Self {
            cumulative_pnl: 0.0,
            trade_count: 0,
            win_count: 0,
            loss_count: 0,
            probation_level: 0,
            position_size_multiplier: 1.0,
            first_trade_ts: now,
            last_trade_ts: now,
            probation_start_ts: None,
            worst_drawdown: 0.0,
        }
    }
}

pub struct PnlTrackerAgent {
    id: AgentId,
    name: String,
    records: RwLock<HashMap<String, AssetRecord>>,
}

impl PnlTrackerAgent {
    pub fn spawn(ctx: Arc<EngineContext>) -> Arc<Self> {
        let id = ctx.ids.next_id();
        let agent = Arc::new(Self {
            id,
            name: format!("pnl_tracker_{id}"),
            records: RwLock::new(HashMap::new()),
        });

        let cb_agent = agent.clone();
        let cb_ctx = ctx.clone();
        let _ = ctx.bus.subscribe("trade-confirmations", move |msg| {
            let agent = cb_agent.clone();
            let ctx = cb_ctx.clone();
            async move { agent.handle_confirmation(msg, &ctx).await }
        });

        agent
    }

    async fn handle_confirmation(&self, msg: Message, ctx: &EngineContext) {
        let confirmation = match msg.payload {
            Payload::Confirmation(c) => c,
            _ => return,
        };
        let now = ctx.now_secs();
        let (probation_tier1, probation_tier2, hibernation_threshold, hibernation_days) = {
            let cfg = ctx.config.read();
            (
                cfg.probation_tier1_pct,
                cfg.probation_tier2_pct,
                cfg.hibernation_threshold_pct,
                cfg.hibernation_days,
            )
        };

        let mut records = self.records.write();
        let record = records
            .entry(confirmation.pair.clone())
            .or_insert_with(|| AssetRecord::new(now));

        record.cumulative_pnl += confirmation.pnl_pct;
        record.trade_count += 1;
        if confirmation.pnl_pct > 0.0 {
            record.win_count += 1;
        } else {
            record.loss_count += 1;
        }
        record.last_trade_ts = now;
        record.worst_drawdown = record.worst_drawdown.min(record.cumulative_pnl);

        let previous_level = record.probation_level;
        let new_level = if record.cumulative_pnl >= probation_tier1 {
            0
        } else if record.cumulative_pnl >= probation_tier2 {
            1
        } else {
            2
        };
        record.probation_level = new_level;
        record.position_size_multiplier = match new_level {
            0 => 1.0,
            1 => 0.5,
            _ => 0.25,
        };

        if previous_level == 0 && new_level >= 1 {
            record.probation_start_ts = Some(now);
            warn!(pair = %confirmation.pair, pnl = record.cumulative_pnl, "asset entered probation");
        } else if previous_level >= 1 && new_level == 0 {
            record.probation_start_ts = None;
            info!(pair = %confirmation.pair, "asset recovered from probation");
        }

        let should_hibernate = record.cumulative_pnl < hibernation_threshold
            && record
                .probation_start_ts
                .map(|start| (now - start) / SECONDS_PER_DAY >= hibernation_days)
                .unwrap_or(false);

        if should_hibernate {
            let probation_days = record
                .probation_start_ts
                .map(|start| (now - start) / SECONDS_PER_DAY)
                .unwrap_or(0.0);
            let final_pnl = record.cumulative_pnl;
            drop(records);

            ctx.active_assets.write().remove(&confirmation.pair);
            warn!(pair = %confirmation.pair, final_pnl, probation_days, "hibernating asset");
            ctx.bus.publish(
                "system-hibernation",
                Payload::Hibernation(HibernationNotice {
                    pair: confirmation.pair.clone(),
                    reason: "sustained loss beyond hibernation threshold".to_string(),
                    final_pnl,
                    probation_days,
                }),
            );
        }
    }
}

#[async_trait]
impl Agent for PnlTrackerAgent {
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
    use crate::messages::TradeConfirmation;
    use crate::runtime_config::RuntimeConfig;
    use crate::shared_state::SharedState;
    use crate::storage::Storage;
    use crate::types::{Direction, Stream};

    fn test_ctx() -> Arc<EngineContext> {
        Arc::new(EngineContext::new(
            Arc::new(MessageBus::new()),
            Arc::new(SharedState::new()),
            Arc::new(PaperExchangeConnector::new(vec![])),
            Arc::new(RwLock::new(RuntimeConfig::default())),
            Arc::new(Storage::in_memory().unwrap()),
        ))
    }

    fn confirmation(pair: &str, pnl_pct: f64) -> Message {
        Message {
            topic: "trade-confirmations".into(),
            payload: Payload::Confirmation(TradeConfirmation {
                pair: pair.to_string(),
                stream: Stream::Synthesized,
                direction: Direction::Buy,
                pnl_absolute: 0.0,
                pnl_pct,
                timestamp: 0.0,
            }),
        }
    }

    #[tokio::test]
    async fn healthy_pair_stays_at_level_zero() {
        let ctx = test_ctx();
        let agent = PnlTrackerAgent::spawn(ctx.clone());
        agent.handle_confirmation(confirmation("XXBTZUSD", 1.0), &ctx).await;
        let records = agent.records.read();
        assert_eq!(records["XXBTZUSD"].probation_level, 0);
        assert_eq!(records["XXBTZUSD"].position_size_multiplier, 1.0);
    }

    #[tokio::test]
    async fn loss_crossing_tier1_enters_probation() {
        let ctx = test_ctx();
        let agent = PnlTrackerAgent::spawn(ctx.clone());
        agent.handle_confirmation(confirmation("XXBTZUSD", -6.0), &ctx).await;
        let records = agent.records.read();
        assert_eq!(records["XXBTZUSD"].probation_level, 1);
        assert_eq!(records["XXBTZUSD"].position_size_multiplier, 0.5);
        assert!(records["XXBTZUSD"].probation_start_ts.is_some());
    }

    #[tokio::test]
    async fn deep_loss_enters_tier2() {
        let ctx = test_ctx();
        let agent = PnlTrackerAgent::spawn(ctx.clone());
        agent.handle_confirmation(confirmation("XXBTZUSD", -12.0), &ctx).await;
        let records = agent.records.read();
        assert_eq!(records["XXBTZUSD"].probation_level, 2);
        assert_eq!(records["XXBTZUSD"].position_size_multiplier, 0.25);
    }

    #[tokio::test]
    async fn recovery_clears_probation() {
        let ctx = test_ctx();
        let agent = PnlTrackerAgent::spawn(ctx.clone());
        agent.handle_confirmation(confirmation("XXBTZUSD", -6.0), &ctx).await;
        agent.handle_confirmation(confirmation("XXBTZUSD", 10.0), &ctx).await;
        let records = agent.records.read();
        assert_eq!(records["XXBTZUSD"].probation_level, 0);
        assert!(records["XXBTZUSD"].probation_start_ts.is_none());
    }
}
