// =============================================================================
// Builder — consensus aggregation + templated deployment (C11)
// =============================================================================
//
// Folds the consensus aggregator into the Builder itself: it subscribes
// directly to all three `prospecting-proposals:{team}` channels, tracks
// distinct proposing agents per (pair, team), and deploys a fixed agent
// template once 2-of-3 team members agree with confidence >= 70%.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use tracing::{info, warn};

use crate::agent::{Agent, AgentId};
use crate::agents::data_producer::MarketDataProducerAgent;
use crate::agents::pattern_learner::PatternLearnerAgent;
use crate::agents::technical_analysis::TechnicalAnalysisAgent;
use crate::bus::{Message, Payload};
use crate::error::EngineError;
use crate::handles::EngineContext;
use crate::messages::ProspectingConsensus;
use crate::scheduler::Scheduler;
use crate::types::{ProductFocus, Team};

const CONSENSUS_WINDOW_SECS: f64 = 300.0;
const CONSENSUS_MIN_CONFIDENCE: f64 = 0.70;
const CONSENSUS_MIN_AGENTS: usize = 2;
const PATTERN_LEARNERS_PER_TEAM: usize = 15;
const TA_AGENTS_PER_TEAM: usize = 3;
const BUILD_REQUEST_TTL_SECS: f64 = 60.0;

struct ProposalEntry {
    agent_id: u64,
    confidence: f64,
    timestamp: f64,
}

pub struct BuilderAgent {
    id: AgentId,
    name: String,
    proposals: RwLock<HashMap<(String, Team), Vec<ProposalEntry>>>,
    scheduler: RwLock<Option<Arc<Scheduler>>>,
    build_requests_seen: RwLock<HashMap<String, f64>>,
    rejections: RwLock<u64>,
}

impl BuilderAgent {
    pub fn spawn(ctx: Arc<EngineContext>) -> Arc<Self> {
        let id = ctx.ids.next_id();
        let agent = Arc::new(Self {
            id,
            name: format!("builder_{id}"),
            proposals: RwLock::new(HashMap::new()),
            scheduler: RwLock::new(None),
            build_requests_seen: RwLock::new(HashMap::new()),
            rejections: RwLock::new(0),
        });

        for team in [Team::Hft, Team::DayTrade, Team::Swing] {
            let cb_agent = agent.clone();
            let cb_ctx = ctx.clone();
            let _ = ctx.bus.subscribe(format!("prospecting-proposals:{team}"), move |msg| {
                let agent = cb_agent.clone();
                let ctx = cb_ctx.clone();
                async move { agent.handle_proposal(msg, ctx).await }
            });
        }

        let cb_agent = agent.clone();
        let _ = ctx.bus.subscribe("system-build-request", move |msg| {
            let agent = cb_agent.clone();
            async move { agent.handle_build_request(msg).await }
        });

        agent
    }

    /// Bound to the scheduler after both are constructed in `main`, breaking
    /// the circular `Arc` that would otherwise be needed.
    pub fn set_scheduler(&self, scheduler: Arc<Scheduler>) {
        *self.scheduler.write() = Some(scheduler);
    }

    pub fn rejection_count(&self) -> u64 {
        *self.rejections.read()
    }

    async fn handle_build_request(&self, msg: Message) {
        if let Payload::Build(req) = msg.payload {
            let mut seen = self.build_requests_seen.write();
            if let Some(&last) = seen.get(&req.tool_name) {
                if req.timestamp - last < BUILD_REQUEST_TTL_SECS {
                    return;
                }
            }
            seen.insert(req.tool_name.clone(), req.timestamp);
            info!(tool = %req.tool_name, requested_by = %req.requested_by, "build request logged (code generation not implemented)");
        }
    }

    async fn handle_proposal(&self, msg: Message, ctx: Arc<EngineContext>) {
        let proposal = match msg.payload {
            Payload::Proposal(p) => p,
            _ => return,
        };

        let key = (proposal.pair.clone(), proposal.team);
        let now = ctx.now_secs();

        let reached_consensus = {
            let mut proposals = self.proposals.write();
            let entries = proposals.entry(key.clone()).or_default();
            entries.retain(|e| now - e.timestamp <= CONSENSUS_WINDOW_SECS);
            entries.retain(|e| e.agent_id != proposal.agent_id);
            entries.push(ProposalEntry {
                agent_id: proposal.agent_id,
                confidence: proposal.confidence,
                timestamp: now,
            });

            let agreeing: Vec<&ProposalEntry> = entries
                .iter()
                .filter(|e| e.confidence >= CONSENSUS_MIN_CONFIDENCE)
                .collect();

            if agreeing.len() >= CONSENSUS_MIN_AGENTS {
                let average_confidence =
                    agreeing.iter().map(|e| e.confidence).sum::<f64>() / agreeing.len() as f64;
                Some((agreeing.len() as u32, average_confidence))
            } else {
                None
            }
        };

        let Some((agreeing_agents, average_confidence)) = reached_consensus else {
            return;
        };

        self.proposals.write().remove(&key);

        ctx.bus.publish(
            "prospecting-consensus",
            Payload::Consensus(ProspectingConsensus {
                pair: proposal.pair.clone(),
                team: proposal.team,
                agreeing_agents,
                average_confidence,
            }),
        );

        self.deploy(&proposal.pair, proposal.team, &ctx).await;
    }

    async fn deploy(&self, pair: &str, team: Team, ctx: &Arc<EngineContext>) {
        let max_active_assets = ctx.config.read().max_active_assets;
        let deployment_cooldown = ctx.config.read().deployment_cooldown_secs;
        let now = ctx.now_secs();

        if ctx.active_assets.read().len() >= max_active_assets {
            *self.rejections.write() += 1;
            warn!(pair, error = %EngineError::CapacityRejection, "builder rejected deployment: at capacity");
            return;
        }
        if ctx.active_assets.read().contains(pair) {
            *self.rejections.write() += 1;
            warn!(pair, error = %EngineError::CapacityRejection, "builder rejected deployment: already active");
            return;
        }
        if let Some(&last) = ctx.deployment_timestamps.read().get(pair) {
            if now - last < deployment_cooldown {
                *self.rejections.write() += 1;
                warn!(pair, error = %EngineError::CapacityRejection, "builder rejected deployment: cooldown active");
                return;
            }
        }

        let Some(scheduler) = self.scheduler.read().clone() else {
            warn!(pair, "builder has no scheduler bound, cannot deploy");
            return;
        };

        scheduler.register(Arc::new(MarketDataProducerAgent::new(ctx.as_ref(), pair, 60.0)));
        for _ in 0..TA_AGENTS_PER_TEAM {
            scheduler.register(TechnicalAnalysisAgent::spawn(ctx.clone(), pair));
        }
        let mut rng = rand::thread_rng();
        let focuses = [
            ProductFocus::Finance,
            ProductFocus::Code,
            ProductFocus::Logistics,
            ProductFocus::Government,
            ProductFocus::Corporations,
        ];
        for _ in 0..PATTERN_LEARNERS_PER_TEAM {
            let focus = focuses[rng.gen_range(0..focuses.len())];
            scheduler.register(PatternLearnerAgent::spawn(ctx.clone(), pair, focus, None, 0));
        }

        ctx.active_assets.write().insert(pair.to_string());
        ctx.deployment_timestamps.write().insert(pair.to_string(), now);
        info!(pair, %team, "deployed new agent team");
    }
}

#[async_trait]
impl Agent for BuilderAgent {
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
    use crate::messages::ProspectingProposal;
    use crate::runtime_config::RuntimeConfig;
    use crate::shared_state::SharedState;
    use crate::storage::Storage;

    fn test_ctx() -> Arc<EngineContext> {
        Arc::new(EngineContext::new(
            Arc::new(MessageBus::new()),
            Arc::new(SharedState::new()),
            Arc::new(PaperExchangeConnector::new(vec![])),
            Arc::new(RwLock::new(RuntimeConfig::default())),
            Arc::new(Storage::in_memory().unwrap()),
        ))
    }

    fn proposal(agent_id: u64, confidence: f64) -> Message {
        Message {
            topic: "prospecting-proposals:HFT".into(),
            payload: Payload::Proposal(ProspectingProposal {
                pair: "ADAUSD".into(),
                team: Team::Hft,
                agent_id,
                score: 6,
                confidence,
                breakdown: HashMap::new(),
            }),
        }
    }

    #[tokio::test]
    async fn single_proposal_does_not_reach_consensus() {
        let ctx = test_ctx();
        let agent = BuilderAgent::spawn(ctx.clone());
        agent.handle_proposal(proposal(1, 0.8), ctx.clone()).await;
        assert!(!ctx.active_assets.read().contains("ADAUSD"));
    }

    #[tokio::test]
    async fn two_of_three_reaches_consensus_but_has_no_scheduler() {
        let ctx = test_ctx();
        let agent = BuilderAgent::spawn(ctx.clone());
        agent.handle_proposal(proposal(1, 0.8), ctx.clone()).await;
        agent.handle_proposal(proposal(2, 0.75), ctx.clone()).await;
        // No scheduler bound: deployment is a no-op, but consensus math ran
        // without panicking and active_assets remains untouched.
        assert!(!ctx.active_assets.read().contains("ADAUSD"));
    }

    #[tokio::test]
    async fn low_confidence_proposals_never_reach_consensus() {
        let ctx = test_ctx();
        let agent = BuilderAgent::spawn(ctx.clone());
        agent.handle_proposal(proposal(1, 0.5), ctx.clone()).await;
        agent.handle_proposal(proposal(2, 0.5), ctx.clone()).await;
        assert!(!ctx.active_assets.read().contains("ADAUSD"));
    }

    #[tokio::test]
    async fn deploy_respects_capacity() {
        let ctx = test_ctx();
        ctx.config.write().max_active_assets = 0;
        let agent = BuilderAgent::spawn(ctx.clone());
        agent.deploy("ADAUSD", Team::Hft, &ctx).await;
        assert_eq!(agent.rejection_count(), 1);
    }
}
