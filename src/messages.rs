// =============================================================================
// Wire-level data model — messages carried on the bus and shared-state rows
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{Direction, OrderType, ProductFocus, Stream, Team};

/// A single `{close, high, low, timestamp}` market observation. The rolling
/// window consumed by indicator math and the ATR calculation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketSample {
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub timestamp: f64,
}

/// A feature frame published by a data-producer agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFrame {
    pub source: String,
    pub timestamp: f64,
    pub target: String,
    pub features: HashMap<String, FeatureValue>,
}

/// A feature value: either a number or a short label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Text(String),
}

impl FeatureValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

/// A trade idea emitted by a signal producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeIdea {
    pub source: String,
    pub pair: String,
    pub direction: Direction,
    pub order_type: OrderType,
    pub amount: f64,
    pub current_price: f64,
    pub timestamp: f64,
    pub confidence: f64,

    // Baseline-producer fields.
    #[serde(default)]
    pub signal_type: Option<String>,
    #[serde(default)]
    pub indicator_value: Option<f64>,

    // Mycelial-producer fields.
    #[serde(default)]
    pub prediction_score: Option<f64>,
    #[serde(default)]
    pub interestingness_score: Option<f64>,
    #[serde(default)]
    pub simulated_pnl: Option<f64>,
    #[serde(default)]
    pub total_pnl: Option<f64>,
    #[serde(default)]
    pub win_rate: Option<f64>,
    #[serde(default)]
    pub trade_count: Option<u32>,
    #[serde(default)]
    pub product_focus: Option<ProductFocus>,
}

/// A belief-state record written into shared state at `policy:{agent_name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub prediction_score: f64,
    pub strategy_vector: [f64; 4],
    pub close_price: f64,
    #[serde(default)]
    pub parent_id: Option<u64>,
    pub generation: u32,
    pub birth_timestamp: f64,
    pub agent_id: u64,
    pub product_focus: ProductFocus,
    pub pattern_age_minutes: f64,
    pub pattern_decay_factor: f64,
    pub pattern_current_value: f64,
    pub raw_features: HashMap<String, FeatureValue>,
}

impl PolicyRecord {
    /// `decay_factor = max(0, 1 - 0.005 * age_minutes)`.
    pub fn decay_factor(age_minutes: f64) -> f64 {
        (1.0 - 0.005 * age_minutes).max(0.0)
    }

    /// `pattern_current_value = prediction_score * decay_factor * 100`.
    pub fn current_value(prediction_score: f64, decay_factor: f64) -> f64 {
        prediction_score * decay_factor * 100.0
    }
}

/// A row archived from a decayed, high-value policy record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedPattern {
    pub agent_id: u64,
    pub timestamp: f64,
    pub pattern_value: f64,
    pub raw_features: String,
    pub age_minutes: f64,
    pub decay_factor: f64,
}

/// A closed trade, durable record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: String,
    pub pair: String,
    pub strategy_type: String,
    pub agent_id: u64,
    #[serde(default)]
    pub pattern_id: Option<u64>,
    pub entry_ts: f64,
    pub exit_ts: f64,
    pub hold_seconds: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub price_change_pct: f64,
    pub pnl_pct: f64,
    pub pnl_absolute: f64,
    pub result: TradeResult,
    pub signal_source: String,
    #[serde(default)]
    pub prediction_score: Option<f64>,
    pub cross_moat_score: f64,
    pub collision_detected: bool,
    pub position_size: f64,
    pub fees_paid: f64,
    pub slippage_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeResult {
    Win,
    Loss,
}

/// A trade confirmation published on `trade-confirmations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeConfirmation {
    pub pair: String,
    pub stream: Stream,
    pub direction: Direction,
    pub pnl_absolute: f64,
    pub pnl_pct: f64,
    pub timestamp: f64,
}

/// A system-control command (halt / resume / emergency shutdown).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemControl {
    pub command: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// A prospecting proposal published by one prospector agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProspectingProposal {
    pub pair: String,
    pub team: Team,
    pub agent_id: u64,
    pub score: u32,
    pub confidence: f64,
    pub breakdown: HashMap<String, f64>,
}

/// A consensus deployment trigger published on `prospecting-consensus`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProspectingConsensus {
    pub pair: String,
    pub team: Team,
    pub agreeing_agents: u32,
    pub average_confidence: f64,
}

/// A request to hibernate an asset, published on `system-hibernation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HibernationNotice {
    pub pair: String,
    pub reason: String,
    pub final_pnl: f64,
    pub probation_days: f64,
}

/// A request naming a missing capability, published on `system-build-request`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRequest {
    pub tool_name: String,
    pub requested_by: String,
    pub timestamp: f64,
}
