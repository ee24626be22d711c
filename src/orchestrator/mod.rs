//! The planner → tinkerer → judge pipeline: a small state machine over
//! agent roles, driven by completion signals the terminal tools write
//! through the shared `CompletionFlags`.

mod events;
mod roles;
mod transitions;

pub use events::OrchestratorEvent;
pub use roles::Role;
pub use transitions::{build_transition_table, is_valid_transition, TransitionTable};

use tracing::info;

use crate::error::AgentError;
use crate::tools::CompletionFlags;

/// Reads the flags a role's terminal tools may have set and turns them
/// into the one event that applies to the role currently running. Takes
/// the flags by value (the caller drains a fresh `CompletionFlags` each
/// turn) so a stale signal from a previous role can never leak forward.
pub fn event_from_flags(role: Role, flags: &CompletionFlags) -> Option<OrchestratorEvent> {
    if flags.session_ended {
        return Some(OrchestratorEvent::SessionEnded);
    }
    match role {
        Role::Planner => flags.planning_complete.then_some(OrchestratorEvent::PlanningDone),
        Role::Tinkerer => flags.tinkering_complete.then_some(OrchestratorEvent::TinkeringDone),
        Role::Judge => {
            if flags.task_approved.is_some() {
                Some(OrchestratorEvent::TaskApproved)
            } else if flags.revision_requested.is_some() {
                Some(OrchestratorEvent::RevisionRequested)
            } else {
                None
            }
        }
        Role::Done | Role::Error => None,
    }
}

/// Drives role transitions. Does not itself run agents — that is
/// `AgentRuntime`'s job; the orchestrator only decides which role runs
/// next given the event the previous turn produced.
pub struct Orchestrator {
    table: TransitionTable,
    current: Role,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            table: build_transition_table(),
            current: Role::Planner,
        }
    }

    pub fn current_role(&self) -> Role {
        self.current
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    /// Applies one event, returning the next role. Errors if the
    /// `(role, event)` pair is not in the transition table.
    pub fn advance(&mut self, event: OrchestratorEvent) -> Result<Role, AgentError> {
        let from = self.current;
        match self.table.get(&(from, event)).copied() {
            Some(to) => {
                info!(from = %from, event = ?event, to = %to, "orchestrator transition");
                self.current = to;
                Ok(to)
            }
            None => Err(AgentError::InvalidTransition { from, event }),
        }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planner_to_tinkerer_on_planning_done() {
        let mut orch = Orchestrator::new();
        assert_eq!(orch.current_role(), Role::Planner);
        let next = orch.advance(OrchestratorEvent::PlanningDone).unwrap();
        assert_eq!(next, Role::Tinkerer);
    }

    #[test]
    fn judge_approval_advances_to_tinkerer_for_the_next_task() {
        let mut orch = Orchestrator::new();
        orch.advance(OrchestratorEvent::PlanningDone).unwrap();
        orch.advance(OrchestratorEvent::TinkeringDone).unwrap();
        let next = orch.advance(OrchestratorEvent::TaskApproved).unwrap();
        assert_eq!(next, Role::Tinkerer);
    }

    #[test]
    fn revision_requested_returns_to_tinkerer() {
        let mut orch = Orchestrator::new();
        orch.advance(OrchestratorEvent::PlanningDone).unwrap();
        orch.advance(OrchestratorEvent::TinkeringDone).unwrap();
        let next = orch.advance(OrchestratorEvent::RevisionRequested).unwrap();
        assert_eq!(next, Role::Tinkerer);
    }

    #[test]
    fn illegal_transition_is_an_error() {
        let mut orch = Orchestrator::new();
        let result = orch.advance(OrchestratorEvent::TaskApproved);
        assert!(result.is_err());
    }

    #[test]
    fn event_from_flags_prefers_session_ended() {
        let mut flags = CompletionFlags::default();
        flags.planning_complete = true;
        flags.session_ended = true;
        assert_eq!(event_from_flags(Role::Planner, &flags), Some(OrchestratorEvent::SessionEnded));
    }
}
