use std::collections::HashMap;

use crate::orchestrator::events::OrchestratorEvent;
use crate::orchestrator::roles::Role;

pub type TransitionTable = HashMap<(Role, OrchestratorEvent), Role>;

/// Builds the default planner → tinkerer → judge transition table.
/// Any `(Role, OrchestratorEvent)` pair missing from this table is illegal
/// and surfaces as `AgentError::InvalidTransition`.
pub fn build_transition_table() -> TransitionTable {
    let mut t = HashMap::new();

    t.insert((Role::Planner, OrchestratorEvent::UserTurnStarted), Role::Planner);
    t.insert((Role::Planner, OrchestratorEvent::PlanningDone), Role::Tinkerer);
    t.insert((Role::Planner, OrchestratorEvent::NoReadyTasks), Role::Done);
    t.insert((Role::Planner, OrchestratorEvent::SessionEnded), Role::Done);
    t.insert((Role::Planner, OrchestratorEvent::FatalError), Role::Error);

    t.insert((Role::Tinkerer, OrchestratorEvent::TinkeringDone), Role::Judge);
    t.insert((Role::Tinkerer, OrchestratorEvent::SessionEnded), Role::Done);
    t.insert((Role::Tinkerer, OrchestratorEvent::FatalError), Role::Error);

    // Approval advances straight to the next ready task rather than
    // round-tripping through planning (§4.6).
    t.insert((Role::Judge, OrchestratorEvent::TaskApproved), Role::Tinkerer);
    t.insert((Role::Judge, OrchestratorEvent::RevisionRequested), Role::Tinkerer);
    t.insert((Role::Judge, OrchestratorEvent::SessionEnded), Role::Done);
    t.insert((Role::Judge, OrchestratorEvent::FatalError), Role::Error);

    // Done and Error are terminal — no outgoing transitions.
    t
}

pub fn is_valid_transition(table: &TransitionTable, role: Role, event: OrchestratorEvent) -> bool {
    table.contains_key(&(role, event))
}
