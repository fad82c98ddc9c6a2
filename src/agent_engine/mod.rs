pub mod engine;
pub mod history;

pub use engine::{AgentEngine, DecisionModel, StepPhase, StepReport};
pub use history::{HistoryEntry, TurnHistory};
