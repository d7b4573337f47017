//! Engine phase model.

/// Current and pending engine phase.
pub mod run_state;

pub use run_state::{EngineState, PhaseTracker};
