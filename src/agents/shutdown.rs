// =============================================================================
// Shutdown Coordinator (C13)
// =============================================================================
//
// Subscribes to `system-control` for an `EMERGENCY_SHUTDOWN` command (sent
// either by an operator or by `main`'s `ctrl_c` handler). Broadcasts a halt,
// runs one last archive pass, closes the bus, and stops the scheduler loop.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::agent::{Agent, AgentId};
use crate::agents::archiver::run_archive_pass;
use crate::bus::{Message, Payload};
use crate::handles::EngineContext;
use crate::messages::SystemControl;

pub struct ShutdownAgent {
    id: AgentId,
    name: String,
}

impl ShutdownAgent {
    pub fn spawn(ctx: Arc<EngineContext>) -> Arc<Self> {
        let id = ctx.ids.next_id();
        let agent = Arc::new(Self {
            id,
            name: format!("shutdown_coordinator_{id}"),
        });

        let cb_agent = agent.clone();
        let cb_ctx = ctx.clone();
        let _ = ctx.bus.subscribe("system-control", move |msg| {
            let agent = cb_agent.clone();
            let ctx = cb_ctx.clone();
            async move { agent.handle_control(msg, &ctx).await }
        });

        agent
    }

    async fn handle_control(&self, msg: Message, ctx: &EngineContext) {
        let control = match msg.payload {
            Payload::Control(c) => c,
            _ => return,
        };
        if control.command != "EMERGENCY_SHUTDOWN" {
            return;
        }

        warn!(reason = ?control.reason, source = ?control.source, "emergency shutdown received");

        ctx.halt();
        ctx.bus.publish(
            "system-control",
            Payload::Control(SystemControl {
                command: "HALT_TRADING".to_string(),
                reason: Some("emergency shutdown in progress".to_string()),
                source: Some(self.name.clone()),
            }),
        );

        if let Err(e) = run_archive_pass(ctx) {
            warn!(error = %e, "final archive pass failed during shutdown");
        }

        ctx.bus.close();
        ctx.stop();
        info!("shutdown complete");
    }
}

#[async_trait]
impl Agent for ShutdownAgent {
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
