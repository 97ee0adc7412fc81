//! Pool lifecycle state machine.

use serde::{Deserialize, Serialize};

/// Pool state.
///
/// State transitions:
/// - Running -> Draining -> Stopped (graceful: queued tasks still run)
/// - Running -> Cancelling -> Stopped (forced: queued tasks are cancelled)
/// - Draining -> Cancelling (escalation while a drain is in progress)
///
/// Stopped is only reached once every worker has exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    /// Accepting submissions.
    Running,

    /// No new submissions; workers finish what is queued.
    Draining,

    /// No new submissions; queued tasks were cancelled, claimed tasks finish.
    Cancelling,

    /// All workers have exited.
    Stopped,
}

impl PoolState {
    /// Is `submit` legal in this state?
    pub fn accepts_submissions(self) -> bool {
        matches!(self, PoolState::Running)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PoolState::Stopped)
    }

    /// Is `self -> next` an edge of the state machine?
    pub fn can_transition_to(self, next: PoolState) -> bool {
        use PoolState::*;
        matches!(
            (self, next),
            (Running, Draining)
                | (Running, Cancelling)
                | (Draining, Cancelling)
                | (Draining, Stopped)
                | (Cancelling, Stopped)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::drain(PoolState::Running, PoolState::Draining)]
    #[case::cancel(PoolState::Running, PoolState::Cancelling)]
    #[case::escalate(PoolState::Draining, PoolState::Cancelling)]
    #[case::drained(PoolState::Draining, PoolState::Stopped)]
    #[case::cancelled(PoolState::Cancelling, PoolState::Stopped)]
    fn legal_transitions(#[case] from: PoolState, #[case] to: PoolState) {
        assert!(from.can_transition_to(to));
    }

    #[rstest]
    #[case::skip_to_stopped(PoolState::Running, PoolState::Stopped)]
    #[case::back_to_running(PoolState::Draining, PoolState::Running)]
    #[case::cancel_to_drain(PoolState::Cancelling, PoolState::Draining)]
    #[case::restart(PoolState::Stopped, PoolState::Running)]
    #[case::self_loop(PoolState::Running, PoolState::Running)]
    fn illegal_transitions(#[case] from: PoolState, #[case] to: PoolState) {
        assert!(!from.can_transition_to(to));
    }

    #[test]
    fn only_running_accepts_submissions() {
        assert!(PoolState::Running.accepts_submissions());
        assert!(!PoolState::Draining.accepts_submissions());
        assert!(!PoolState::Cancelling.accepts_submissions());
        assert!(!PoolState::Stopped.accepts_submissions());
    }

    #[test]
    fn serializes_as_snake_case() {
        let s = serde_json::to_string(&PoolState::Cancelling).unwrap();
        assert_eq!(s, "\"cancelling\"");
    }
}
