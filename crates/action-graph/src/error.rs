//! Error types surfaced by the scheduler.
//!
//! Every rejected transition is reported, there is no build profile in which
//! an incoherent call is silently ignored. The only intentional no-op is
//! running an action whose scene has already been torn down.

use crate::action::ActionId;
use crate::status::{ActionState, Operation};

pub type Result<T> = std::result::Result<T, ActionError>;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    /// `run`, `cancel`, `try_skip`, `complete` or `attach` called from a state
    /// that forbids it.
    #[error("cannot {operation} action {action} ('{name}') while {state}")]
    InvalidTransition {
        action: ActionId,
        name: String,
        state: ActionState,
        operation: Operation,
    },

    /// A continuation or fan-in generator produced no action.
    #[error("factory for action {action} produced no action")]
    NullFactoryResult { action: ActionId },

    /// Fan-in completion limit outside `0..=slots`.
    #[error("fan-in limit {limit} out of range for {slots} slot(s)")]
    LimitOutOfRange { limit: usize, slots: usize },

    /// Fan-in built without children or generators.
    #[error("fan-in set has neither children nor generators")]
    MissingChildren,

    /// Handle does not refer to a live action (never issued or released).
    #[error("unknown action {0}")]
    UnknownAction(ActionId),

    /// Tried to release an action that has not reached a terminal state.
    #[error("action {action} is still {state}")]
    StillActive {
        action: ActionId,
        state: ActionState,
    },
}

impl ActionError {
    /// Returns a stable identifier for this error variant, suitable for logs.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::NullFactoryResult { .. } => "null_factory_result",
            Self::LimitOutOfRange { .. } => "limit_out_of_range",
            Self::MissingChildren => "missing_children",
            Self::UnknownAction(_) => "unknown_action",
            Self::StillActive { .. } => "still_active",
        }
    }

    /// Returns true if the error was caused by calling an operation in the
    /// wrong lifecycle state.
    pub const fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_message_names_the_action() {
        let error = ActionError::InvalidTransition {
            action: ActionId::new(3, 0),
            name: "fade".into(),
            state: ActionState::Finished,
            operation: Operation::Run,
        };

        assert_eq!(
            error.to_string(),
            "cannot run action #3.0 ('fade') while finished"
        );
        assert_eq!(error.code(), "invalid_transition");
        assert!(error.is_invalid_transition());
    }

    #[test]
    fn range_error_message() {
        let error = ActionError::LimitOutOfRange { limit: 4, slots: 3 };
        assert_eq!(error.to_string(), "fan-in limit 4 out of range for 3 slot(s)");
        assert!(!error.is_invalid_transition());
    }
}
