// =============================================================================
// Engine error taxonomy
// =============================================================================
//
// Classifies *why* something went wrong so logging and supervision can react
// consistently without parsing message text. This sits alongside
// `anyhow::Result` rather than replacing it: call sites still use `?` and
// `.context(...)`, but attach one of these variants as a `%error` tracing
// field so aggregated logs can filter by class.

/// Taxonomy of failure classes an agent or subsystem can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    /// Connector timeout, disconnect, or rate-limit — retried or served from
    /// cache; never surfaced to the tick loop.
    TransientExternal,
    /// A received message did not match its expected schema.
    MalformedMessage,
    /// An operation violated a documented invariant (e.g. closing a position
    /// that was never opened) — treated as a no-op.
    InvariantViolation,
    /// The builder refused a deployment (capacity, cooldown, duplicate).
    CapacityRejection,
    /// Drawdown or other risk threshold breached — triggers a halt.
    RiskBreach,
    /// Unrecoverable — the scheduler should stop running.
    Fatal,
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransientExternal => write!(f, "transient_external"),
            Self::MalformedMessage => write!(f, "malformed_message"),
            Self::InvariantViolation => write!(f, "invariant_violation"),
            Self::CapacityRejection => write!(f, "capacity_rejection"),
            Self::RiskBreach => write!(f, "risk_breach"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

impl std::error::Error for EngineError {}
