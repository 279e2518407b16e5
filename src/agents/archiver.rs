// =============================================================================
// Archiver — decays belief-state policy records into durable storage (C12)
// =============================================================================
//
// `run_archive_pass` is a free function rather than a method exclusive to
// `ArchiverAgent` because the scheduler's own `archive_interval` tick also
// needs to invoke it directly (see `Scheduler::on_archive`), and so does the
// shutdown coordinator's final flush.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentId};
use crate::handles::EngineContext;
use crate::messages::{ArchivedPattern, PolicyRecord};

/// Scan every `policy:*` shared-state row, archive the ones whose decayed
/// value has crossed `archive_value_threshold`, and delete them from shared
/// state once archived.
pub fn run_archive_pass(ctx: &EngineContext) -> anyhow::Result<()> {
    let threshold = ctx.config.read().archive_value_threshold;
    let keys = ctx.shared_state.keys_with_prefix("policy:");

    let mut batch = Vec::new();
    let mut archived_keys = Vec::new();

    for key in keys {
        let Some(record) = ctx.shared_state.get::<PolicyRecord>(&key) else {
            continue;
        };
        if record.pattern_current_value < threshold {
            continue;
        }

        let raw_features = serde_json::to_string(&record.raw_features).unwrap_or_default();
        batch.push(ArchivedPattern {
            agent_id: record.agent_id,
            timestamp: record.birth_timestamp,
            pattern_value: record.pattern_current_value,
            raw_features,
            age_minutes: record.pattern_age_minutes,
            decay_factor: record.pattern_decay_factor,
        });
        archived_keys.push(key);
    }

    if batch.is_empty() {
        debug!("archive pass found nothing above threshold");
        return Ok(());
    }

    let inserted = ctx.storage.insert_pattern_batch(&batch)?;
    for key in &archived_keys {
        ctx.shared_state.delete(key);
    }
    info!(inserted, threshold, "archived policy records");
    Ok(())
}

/// Periodic wrapper around `run_archive_pass`, registered alongside the
/// scheduler's own interval-driven call so a standalone deployment (or a test
/// harness stepping agents directly rather than via `Scheduler::tick`) still
/// archives on schedule.
pub struct ArchiverAgent {
    id: AgentId,
    name: String,
    interval: u64,
    ticks: RwLock<u64>,
}

impl ArchiverAgent {
    pub fn new(ctx: &EngineContext, interval: u64) -> Self {
        let id = ctx.ids.next_id();
        Self {
            id,
            name: format!("archiver_{id}"),
            interval,
            ticks: RwLock::new(0),
        }
    }
}

#[async_trait]
impl Agent for ArchiverAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn step(&self, ctx: &EngineContext) -> anyhow::Result<()> {
        let mut ticks = self.ticks.write();
        *ticks += 1;
        let due = self.interval > 0 && *ticks % self.interval == 0;
        drop(ticks);
        if due {
            if let Err(e) = run_archive_pass(ctx) {
                warn!(error = %e, "archiver agent pass failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageBus;
    use crate::exchange::paper::PaperExchangeConnector;
    use crate::runtime_config::RuntimeConfig;
    use crate::shared_state::SharedState;
    use crate::storage::Storage;
    use crate::types::ProductFocus;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn test_ctx() -> EngineContext {
        EngineContext::new(
            Arc::new(MessageBus::new()),
            Arc::new(SharedState::new()),
            Arc::new(PaperExchangeConnector::new(vec![])),
            Arc::new(RwLock::new(RuntimeConfig::default())),
            Arc::new(Storage::in_memory().unwrap()),
        )
    }

    fn policy(value: f64) -> PolicyRecord {
        PolicyRecord {
            prediction_score: 0.9,
            strategy_vector: [0.1, 0.2, 0.3, 0.4],
            close_price: 100.0,
            parent_id: None,
            generation: 0,
            birth_timestamp: 0.0,
            agent_id: 1,
            product_focus: ProductFocus::Finance,
            pattern_age_minutes: 5.0,
            pattern_decay_factor: 0.975,
            pattern_current_value: value,
            raw_features: HashMap::new(),
        }
    }

    #[test]
    fn pass_archives_records_above_threshold() {
        let ctx = test_ctx();
        ctx.config.write().archive_value_threshold = 40.0;
        ctx.shared_state.set("policy:agent_1", &policy(55.0));
        ctx.shared_state.set("policy:agent_2", &policy(10.0));

        run_archive_pass(&ctx).unwrap();

        assert_eq!(ctx.storage.pattern_count().unwrap(), 1);
        assert!(ctx.shared_state.get::<PolicyRecord>("policy:agent_1").is_none());
        assert!(ctx.shared_state.get::<PolicyRecord>("policy:agent_2").is_some());
    }

    #[test]
    fn pass_is_noop_when_nothing_crosses_threshold() {
        let ctx = test_ctx();
        ctx.shared_state.set("policy:agent_1", &policy(5.0));
        run_archive_pass(&ctx).unwrap();
        assert_eq!(ctx.storage.pattern_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn agent_only_archives_on_interval() {
        let ctx = test_ctx();
        ctx.shared_state.set("policy:agent_1", &policy(55.0));
        let agent = ArchiverAgent::new(&ctx, 3);
        agent.step(&ctx).await.unwrap();
        agent.step(&ctx).await.unwrap();
        assert_eq!(ctx.storage.pattern_count().unwrap(), 0);
        agent.step(&ctx).await.unwrap();
        assert_eq!(ctx.storage.pattern_count().unwrap(), 1);
    }
}
