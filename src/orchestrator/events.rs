use serde::{Deserialize, Serialize};

/// A completion signal written through the tool context by a terminal
/// tool, observed by the orchestrator between agent turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrchestratorEvent {
    UserTurnStarted,
    PlanningDone,
    TinkeringDone,
    TaskApproved,
    RevisionRequested,
    NoReadyTasks,
    SessionEnded,
    FatalError,
}
