// =============================================================================
// Scheduler / Tick Loop
// =============================================================================
//
// Drives every registered agent's `step()` once per tick, in a freshly
// shuffled order each time (prevents positional bias — an agent registered
// first never gets a systematic head start). A panic-free error from one
// agent's `step()` is logged and the tick continues; it never aborts the
// loop. Every `archive_interval` ticks the archiver runs.
// =============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use tracing::error;

use crate::agent::Agent;
use crate::handles::EngineContext;

pub struct Scheduler {
    ctx: Arc<EngineContext>,
    agents: RwLock<Vec<Arc<dyn Agent>>>,
    step_counter: RwLock<u64>,
    archive_interval: u64,
    on_archive: Box<dyn Fn(&EngineContext) -> anyhow::Result<()> + Send + Sync>,
}

impl Scheduler {
    pub fn new(
        ctx: Arc<EngineContext>,
        archive_interval: u64,
        on_archive: impl Fn(&EngineContext) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            ctx,
            agents: RwLock::new(Vec::new()),
            step_counter: RwLock::new(0),
            archive_interval,
            on_archive: Box::new(on_archive),
        }
    }

    /// Register a new agent with the scheduler. Used both at startup and by
    /// the builder's runtime deployment loop.
    pub fn register(&self, agent: Arc<dyn Agent>) {
        self.agents.write().push(agent);
    }

    pub fn agent_count(&self) -> usize {
        self.agents.read().len()
    }

    pub fn step_counter(&self) -> u64 {
        *self.step_counter.read()
    }

    /// Run one tick: shuffle agents, step each, then maybe archive.
    pub async fn tick(&self) {
        if !self.ctx.is_running() {
            return;
        }

        let mut order: Vec<Arc<dyn Agent>> = self.agents.read().clone();
        order.shuffle(&mut rand::thread_rng());

        for agent in &order {
            if let Err(e) = agent.step(&self.ctx).await {
                error!(agent = %agent.name(), error = %e, "agent step failed");
            }
        }

        let mut counter = self.step_counter.write();
        *counter += 1;
        if self.archive_interval > 0 && *counter % self.archive_interval == 0 {
            if let Err(e) = (self.on_archive)(&self.ctx) {
                error!(error = %e, "scheduled archive pass failed");
            }
        }
    }

    /// Drive the tick loop until `ctx.running` is cleared, sleeping
    /// `tick_period` between ticks.
    pub async fn run(&self, tick_period: std::time::Duration) {
        let mut interval = tokio::time::interval(tick_period);
        while self.ctx.is_running() {
            interval.tick().await;
            self.tick().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::paper::PaperExchangeConnector;
    use crate::shared_state::SharedState;
    use crate::storage::Storage;
    use crate::bus::MessageBus;
    use crate::runtime_config::RuntimeConfig;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    struct CountingAgent {
        id: u64,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Agent for CountingAgent {
        fn id(&self) -> u64 {
            self.id
        }
        fn name(&self) -> &str {
            "counting_agent"
        }
        async fn step(&self, _ctx: &EngineContext) -> anyhow::Result<()> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        }
    }

    struct FailingAgent;

    #[async_trait::async_trait]
    impl Agent for FailingAgent {
        fn id(&self) -> u64 {
            999
        }
        fn name(&self) -> &str {
            "failing_agent"
        }
        async fn step(&self, _ctx: &EngineContext) -> anyhow::Result<()> {
            anyhow::bail!("intentional failure")
        }
    }

    fn test_ctx() -> Arc<EngineContext> {
        Arc::new(EngineContext::new(
            Arc::new(MessageBus::new()),
            Arc::new(SharedState::new()),
            Arc::new(PaperExchangeConnector::new(vec![])),
            Arc::new(RwLock::new(RuntimeConfig::default())),
            Arc::new(Storage::in_memory().unwrap()),
        ))
    }

    #[tokio::test]
    async fn tick_steps_every_registered_agent() {
        let ctx = test_ctx();
        let archived = Arc::new(AtomicUsize::new(0));
        let a2 = archived.clone();
        let sched = Scheduler::new(ctx.clone(), 0, move |_| {
            a2.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        });

        let calls = Arc::new(AtomicUsize::new(0));
        sched.register(Arc::new(CountingAgent { id: 1, calls: calls.clone() }));
        sched.register(Arc::new(CountingAgent { id: 2, calls: calls.clone() }));

        sched.tick().await;
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(sched.step_counter(), 1);
    }

    #[tokio::test]
    async fn failing_agent_does_not_abort_tick() {
        let ctx = test_ctx();
        let sched = Scheduler::new(ctx.clone(), 0, |_| Ok(()));
        let calls = Arc::new(AtomicUsize::new(0));
        sched.register(Arc::new(FailingAgent));
        sched.register(Arc::new(CountingAgent { id: 1, calls: calls.clone() }));

        sched.tick().await;
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn archive_runs_on_interval() {
        let ctx = test_ctx();
        let archived = Arc::new(AtomicUsize::new(0));
        let a2 = archived.clone();
        let sched = Scheduler::new(ctx.clone(), 3, move |_| {
            a2.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        });

        for _ in 0..6 {
            sched.tick().await;
        }
        assert_eq!(archived.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stopped_context_skips_tick() {
        let ctx = test_ctx();
        ctx.stop();
        let sched = Scheduler::new(ctx.clone(), 0, |_| Ok(()));
        let calls = Arc::new(AtomicUsize::new(0));
        sched.register(Arc::new(CountingAgent { id: 1, calls: calls.clone() }));
        sched.tick().await;
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 0);
    }
}
