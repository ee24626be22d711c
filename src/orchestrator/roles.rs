use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the three agent roles the orchestrator cycles through, plus the
/// two terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Planner,
    Tinkerer,
    Judge,
    Done,
    Error,
}

impl Role {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Role::Done | Role::Error)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Planner => "planner",
            Role::Tinkerer => "tinkerer",
            Role::Judge => "judge",
            Role::Done => "done",
            Role::Error => "error",
        };
        write!(f, "{s}")
    }
}
