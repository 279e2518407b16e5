// =============================================================================
// Risk Manager — portfolio drawdown circuit breaker (C9)
// =============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{error, info};

use crate::agent::{Agent, AgentId};
use crate::bus::{Message, Payload};
use crate::error::EngineError;
use crate::handles::EngineContext;
use crate::messages::SystemControl;

struct RiskState {
    current_portfolio_value: f64,
    peak_portfolio_value: f64,
}

pub struct RiskManagerAgent {
    id: AgentId,
    name: String,
    state: RwLock<RiskState>,
    is_halted: AtomicBool,
}

impl RiskManagerAgent {
    pub fn spawn(ctx: Arc<EngineContext>) -> Arc<Self> {
        let id = ctx.ids.next_id();
        let initial = ctx.config.read().initial_portfolio_value;
        let agent = Arc::new(Self {
            id,
            name: format!("risk_manager_{id}"),
            state: RwLock::new(RiskState {
                current_portfolio_value: initial,
                peak_portfolio_value: initial,
            }),
            is_halted: AtomicBool::new(false),
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

        if self.is_halted.load(Ordering::Acquire) {
            return;
        }

        let max_drawdown_pct = ctx.config.read().max_drawdown_pct;
        let drawdown = {
            let mut state = self.state.write();
            state.current_portfolio_value += confirmation.pnl_absolute;
            state.peak_portfolio_value = state.peak_portfolio_value.max(state.current_portfolio_value);
            if state.peak_portfolio_value == 0.0 {
                0.0
            } else {
                (state.peak_portfolio_value - state.current_portfolio_value) / state.peak_portfolio_value
            }
        };

        if drawdown > max_drawdown_pct {
            self.is_halted.store(true, Ordering::Release);
            ctx.halt();
            error!(drawdown, max_drawdown_pct, error = %EngineError::RiskBreach, "drawdown breach — halting trading");
            ctx.bus.publish(
                "system-control",
                Payload::Control(SystemControl {
                    command: "HALT_TRADING".to_string(),
                    reason: Some(format!("drawdown {drawdown:.4} exceeded max {max_drawdown_pct:.4}")),
                    source: Some(self.name.clone()),
                }),
            );
        } else {
            info!(pair = %confirmation.pair, drawdown, "trade confirmation processed");
        }
    }
}

#[async_trait]
impl Agent for RiskManagerAgent {
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
