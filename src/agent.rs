// =============================================================================
// Agent Framework — the contract every agent implements
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::handles::EngineContext;

/// Process-unique agent identifier, assigned by [`AgentIdAllocator`].
pub type AgentId = u64;

/// Monotonic id allocator shared by the engine context. Agents constructed by
/// the builder at runtime draw from the same sequence as those constructed at
/// startup.
#[derive(Debug, Default)]
pub struct AgentIdAllocator {
    next: AtomicU64,
}

impl AgentIdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> AgentId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Every agent implements this contract. `step()` is called once per tick by
/// the scheduler, in randomized order; it may be a no-op for purely reactive
/// agents that act only from `handle_X` bus callbacks registered at
/// construction time.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> AgentId;
    fn name(&self) -> &str;
    async fn step(&self, ctx: &EngineContext) -> anyhow::Result<()>;
}
