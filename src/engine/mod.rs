pub mod orchestrator;
pub mod scheduler;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use orchestrator::{Components, CycleFailure, CycleOrchestrator, CycleOutcome};
pub use scheduler::CycleScheduler;
pub use state::{CycleState, Lifecycle, StateHandle};
