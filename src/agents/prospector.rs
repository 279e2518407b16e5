// =============================================================================
// Prospector (MarketExplorer) — C11, scoring half
// =============================================================================
//
// Three agents per team scan the tradable-pairs universe every
// `prospector_scan_interval` ticks, scoring each untracked USD pair 0-8 and
// publishing a proposal for anything scoring >= 4. The Builder (in
// `builder.rs`) aggregates these into consensus and deploys agent teams.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::agent::{Agent, AgentId};
use crate::handles::EngineContext;
use crate::messages::{FeatureFrame, ProspectingProposal};
use crate::types::Team;

fn team_weights(team: Team) -> [(&'static str, f64); 4] {
    match team {
        Team::Hft => [("code", 0.5), ("corporate", 0.5), ("government", 0.0), ("logistics", 0.0)],
        Team::DayTrade => [("code", 0.7), ("corporate", 0.7), ("government", 0.3), ("logistics", 0.3)],
        Team::Swing => [("code", 0.3), ("corporate", 0.3), ("government", 1.0), ("logistics", 1.0)],
    }
}

fn moat_activity(ctx: &EngineContext, channel: &str, pair: &str) -> f64 {
    ctx.shared_state
        .get::<FeatureFrame>(&format!("moat:{channel}:{pair}"))
        .and_then(|frame| {
            let key = match channel {
                "code" => "novelty_score",
                "logistics" => "congestion_index",
                "government" => "policy_activity",
                "corporate" => "filing_activity",
                _ => return None,
            };
            frame.features.get(key).and_then(|v| v.as_f64())
        })
        .unwrap_or(0.0)
}

pub struct ProspectorAgent {
    id: AgentId,
    name: String,
    team: Team,
    ticks: RwLock<u64>,
}

impl ProspectorAgent {
    pub fn new(ctx: &EngineContext, team: Team) -> Self {
        let id = ctx.ids.next_id();
        Self {
            id,
            name: format!("prospector_{team}_{id}"),
            team,
            ticks: RwLock::new(0),
        }
    }

    async fn scan(&self, ctx: &EngineContext) -> anyhow::Result<()> {
        let pairs = ctx.exchange.tradable_pairs().await?;
        let active = ctx.active_assets.read().clone();
        let weights = team_weights(self.team);

        for pair_info in pairs {
            if !pair_info.is_online_usd() {
                continue;
            }
            if active.contains(&pair_info.pair) {
                continue;
            }

            let ticker = match ctx.exchange.ticker(&pair_info.pair).await {
                Ok(t) => t,
                Err(_) => continue,
            };

            let mut score = 0u32;
            let mut breakdown = std::collections::HashMap::new();

            let volatility = if ticker.close != 0.0 {
                (ticker.high_24h - ticker.low_24h) / ticker.close
            } else {
                0.0
            };
            if volatility > 0.02 {
                score += 1;
            }
            breakdown.insert("volatility".to_string(), volatility);

            let dollar_volume = ticker.volume_24h * ticker.close;
            if dollar_volume > 10_000_000.0 {
                score += 1;
            }
            breakdown.insert("dollar_volume".to_string(), dollar_volume);

            let spread = if ticker.bid != 0.0 {
                (ticker.ask - ticker.bid) / ticker.bid
            } else {
                1.0
            };
            if spread < 0.005 {
                score += 1;
            }
            breakdown.insert("spread".to_string(), spread);

            let momentum = if ticker.open != 0.0 {
                ((ticker.close - ticker.open) / ticker.open).abs()
            } else {
                0.0
            };
            if momentum > 0.15 {
                score += 1;
            }
            breakdown.insert("momentum".to_string(), momentum);

            // Novelty: always true here, since tracked pairs were filtered above.
            score += 1;

            let weighted_activity: f64 = weights
                .iter()
                .map(|(channel, weight)| weight * moat_activity(ctx, channel, &pair_info.pair))
                .sum();
            let cross_moat_score = if weighted_activity >= 1.5 {
                2
            } else if weighted_activity >= 0.5 {
                1
            } else {
                0
            };
            score += cross_moat_score;
            breakdown.insert("cross_moat".to_string(), cross_moat_score as f64);

            if score >= 4 {
                debug!(pair = %pair_info.pair, team = %self.team, score, "prospecting proposal");
                ctx.bus.publish(
                    format!("prospecting-proposals:{}", self.team),
                    crate::bus::Payload::Proposal(ProspectingProposal {
                        pair: pair_info.pair.clone(),
                        team: self.team,
                        agent_id: self.id,
                        score,
                        confidence: score as f64 / 8.0,
                        breakdown,
                    }),
                );
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Agent for ProspectorAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn step(&self, ctx: &EngineContext) -> anyhow::Result<()> {
        let mut ticks = self.ticks.write();
        *ticks += 1;
        let due = *ticks % ctx.config.read().prospector_scan_interval.max(1) == 0;
        drop(ticks);
        if due {
            self.scan(ctx).await?;
        }
        Ok(())
    }
}
