// =============================================================================
// Engine Context — the bundle of shared handles every agent is constructed with
// =============================================================================
//
// Analogous to the teacher's `AppState`: the single source of truth tying
// every subsystem together, held behind `Arc` so every agent and bus
// callback can share it cheaply. Thread safety follows the same convention
// the teacher establishes — atomics for lock-free flags/counters,
// `parking_lot::RwLock` for mutable collections, `Arc` for subsystem engines
// that manage their own interior mutability.
// =============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use crate::agent::AgentIdAllocator;
use crate::bus::MessageBus;
use crate::exchange::ExchangeConnector;
use crate::runtime_config::RuntimeConfig;
use crate::shared_state::SharedState;
use crate::storage::Storage;

/// Shared context passed to every agent's constructor and `step()` call.
pub struct EngineContext {
    pub bus: Arc<MessageBus>,
    pub shared_state: Arc<SharedState>,
    pub exchange: Arc<dyn ExchangeConnector>,
    pub config: Arc<RwLock<RuntimeConfig>>,
    pub storage: Arc<Storage>,
    pub ids: Arc<AgentIdAllocator>,

    /// Cleared by the shutdown coordinator; the scheduler stops ticking once
    /// this is false.
    pub running: Arc<AtomicBool>,
    /// Set by the risk manager on a drawdown breach; pattern-learners and the
    /// synthesizer check this before opening new positions.
    pub halted: Arc<AtomicBool>,

    /// Pairs the builder has already deployed agent teams for.
    pub active_assets: Arc<RwLock<HashSet<String>>>,
    /// Last deployment timestamp per pair, for the builder's cooldown check.
    pub deployment_timestamps: Arc<RwLock<HashMap<String, f64>>>,
}

impl EngineContext {
    pub fn new(
        bus: Arc<MessageBus>,
        shared_state: Arc<SharedState>,
        exchange: Arc<dyn ExchangeConnector>,
        config: Arc<RwLock<RuntimeConfig>>,
        storage: Arc<Storage>,
    ) -> Self {
        Self {
            bus,
            shared_state,
            exchange,
            config,
            storage,
            ids: Arc::new(AgentIdAllocator::new()),
            running: Arc::new(AtomicBool::new(true)),
            halted: Arc::new(AtomicBool::new(false)),
            active_assets: Arc::new(RwLock::new(HashSet::new())),
            deployment_timestamps: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
    }

    /// Wall-clock seconds since the UNIX epoch, used for collision windows,
    /// cooldowns, and pattern-age decay.
    pub fn now_secs(&self) -> f64 {
        Utc::now().timestamp_millis() as f64 / 1000.0
    }
}
