// =============================================================================
// Agents Module
// =============================================================================
//
// One file per agent kind. Reactive agents (those driven entirely by bus
// callbacks) register their `handle_X` closures in a `spawn` constructor and
// implement a no-op `Agent::step`. Periodic agents do their work from
// `step()` directly.

pub mod archiver;
pub mod builder;
pub mod data_producer;
pub mod pattern_learner;
pub mod pnl_tracker;
pub mod prospector;
pub mod risk_manager;
pub mod shutdown;
pub mod technical_analysis;
pub mod trader;
