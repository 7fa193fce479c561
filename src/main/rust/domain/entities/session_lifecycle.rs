use std::collections::VecDeque;
use std::time::Instant;

use crate::domain::errors::{DomainError, FailureReason, Result};
use crate::domain::value_objects::SessionState;

/// Transitions kept for inspection
const HISTORY_LIMIT: usize = 64;

/// State transition record
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: SessionState,
    pub to: SessionState,
    pub timestamp: Instant,
    pub reason: Option<String>,
}

/// State machine of the session manager; rejects edges the lifecycle does not allow
#[derive(Debug)]
pub struct SessionLifecycle {
    current_state: SessionState,
    state_history: VecDeque<StateTransition>,
    total_transitions: u64,
}

impl SessionLifecycle {
    pub fn new() -> Self {
        Self {
            current_state: SessionState::Idle,
            state_history: VecDeque::new(),
            total_transitions: 0,
        }
    }

    pub fn current_state(&self) -> &SessionState {
        &self.current_state
    }

    pub fn transition_count(&self) -> u64 {
        self.total_transitions
    }

    pub fn last_transition(&self) -> Option<&StateTransition> {
        self.state_history.back()
    }

    pub fn history(&self) -> impl Iterator<Item = &StateTransition> {
        self.state_history.iter()
    }

    pub fn transition(&mut self, next: SessionState, reason: Option<String>) -> Result<()> {
        if !self.current_state.can_transition_to(&next) {
            return Err(DomainError::IllegalTransition {
                from: self.current_state,
                to: next,
            });
        }
        self.record_transition(next, reason);
        Ok(())
    }

    /// Move to `Failed{Internal}` from wherever the machine is
    pub fn force_internal_failure(&mut self, reason: String) {
        self.record_transition(
            SessionState::Failed {
                reason: FailureReason::Internal,
            },
            Some(reason),
        );
    }

    fn record_transition(&mut self, new_state: SessionState, reason: Option<String>) {
        let transition = StateTransition {
            from: self.current_state,
            to: new_state,
            timestamp: Instant::now(),
            reason,
        };

        if self.state_history.len() == HISTORY_LIMIT {
            self.state_history.pop_front();
        }
        self.state_history.push_back(transition);
        self.total_transitions += 1;
        self.current_state = new_state;
    }
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_idle() {
        let lifecycle = SessionLifecycle::new();
        assert_eq!(*lifecycle.current_state(), SessionState::Idle);
        assert_eq!(lifecycle.transition_count(), 0);
        assert!(lifecycle.last_transition().is_none());
    }

    #[test]
    fn test_happy_path_is_tracked() {
        let mut lifecycle = SessionLifecycle::new();

        lifecycle.transition(SessionState::Validating, None).unwrap();
        lifecycle.transition(SessionState::Connecting, None).unwrap();
        lifecycle.transition(SessionState::Active, None).unwrap();
        lifecycle.transition(SessionState::Stopping, None).unwrap();
        lifecycle.transition(SessionState::Idle, None).unwrap();

        assert_eq!(lifecycle.transition_count(), 5);
        let last = lifecycle.last_transition().unwrap();
        assert_eq!(last.from, SessionState::Stopping);
        assert_eq!(last.to, SessionState::Idle);
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let mut lifecycle = SessionLifecycle::new();
        let result = lifecycle.transition(SessionState::Active, None);

        assert!(matches!(
            result,
            Err(DomainError::IllegalTransition {
                from: SessionState::Idle,
                to: SessionState::Active
            })
        ));
        assert_eq!(*lifecycle.current_state(), SessionState::Idle);
        assert_eq!(lifecycle.transition_count(), 0);
    }

    #[test]
    fn test_failure_keeps_reason() {
        let mut lifecycle = SessionLifecycle::new();
        lifecycle.transition(SessionState::Validating, None).unwrap();
        lifecycle
            .transition(
                SessionState::Failed {
                    reason: FailureReason::DeviceUnavailable,
                },
                Some("permission denied".to_string()),
            )
            .unwrap();

        let last = lifecycle.last_transition().unwrap();
        assert_eq!(last.reason.as_deref(), Some("permission denied"));
        assert_eq!(
            lifecycle.current_state().failure_reason(),
            Some(FailureReason::DeviceUnavailable)
        );
    }

    #[test]
    fn test_forced_failure_bypasses_edges() {
        let mut lifecycle = SessionLifecycle::new();
        lifecycle.force_internal_failure("boom".to_string());
        assert_eq!(
            lifecycle.current_state().failure_reason(),
            Some(FailureReason::Internal)
        );
    }

    #[test]
    fn test_history_is_bounded() {
        let mut lifecycle = SessionLifecycle::new();
        for _ in 0..100 {
            lifecycle.transition(SessionState::Validating, None).unwrap();
            lifecycle.transition(SessionState::Idle, None).unwrap();
        }
        assert_eq!(lifecycle.history().count(), HISTORY_LIMIT);
        assert_eq!(lifecycle.transition_count(), 200);
    }
}
