//! Session state machine

use launchpad_core::{AuthState, OrchestratorError};

/// Validates a session state transition.
///
/// # Errors
/// `OrchestratorError::InvalidTransition` when `to` is not reachable from `from`
pub fn validate_transition(from: AuthState, to: AuthState) -> Result<(), OrchestratorError> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(OrchestratorError::InvalidTransition { from, to })
    }
}

/// States reachable in one step.
///
/// `Pending -> Pending` is a restarted or still-waiting flow. The edges back
/// to `Unauthenticated` are only taken by an explicit reset.
#[must_use]
pub fn allowed_transitions(from: AuthState) -> Vec<AuthState> {
    use AuthState::{Authenticated, Failed, Pending, Unauthenticated};
    match from {
        Unauthenticated => vec![Pending],
        Pending => vec![Pending, Authenticated, Failed, Unauthenticated],
        Failed => vec![Unauthenticated],
        Authenticated => vec![],
    }
}

fn allowed(from: AuthState, to: AuthState) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}
