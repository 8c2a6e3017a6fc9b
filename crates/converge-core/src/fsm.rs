//! Reconciliation state machine
//!
//! States are plain tags and [`transition`] is the whole table; everything a
//! state *does* lives in the controller. Keeping the table pure makes the
//! reachability properties checkable without running anything.

use std::fmt;

use serde::Serialize;

/// Controller states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum State {
    Start,
    /// Resting state: the only one that accepts new events
    Waiting,
    /// Compare current desired state against the new one
    Diff1,
    Resolve1,
    /// Retrieve actual state for the subtrees just resolved
    Discover1,
    /// Compare discovered state against the new desired state
    Diff2,
    Resolve2,
    /// Compare discovered state against the current desired state
    Diff3,
    Resolve3,
    /// Trivial discovery: assume the system matches current desired state
    Discover2,
    Retry,
    Revert,
    /// Terminal: requires operator intervention
    Help,
}

impl State {
    /// States in which the controller waits for the next event
    pub fn is_resting(&self) -> bool {
        matches!(self, State::Waiting | State::Help)
    }

    pub fn all() -> &'static [State] {
        &[
            State::Start,
            State::Waiting,
            State::Diff1,
            State::Resolve1,
            State::Discover1,
            State::Diff2,
            State::Resolve2,
            State::Diff3,
            State::Resolve3,
            State::Discover2,
            State::Retry,
            State::Revert,
            State::Help,
        ]
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What happened in the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Trigger {
    Enter,
    NewDesiredState,
    SystemState,
    Poll,
    /// A diff found changes
    Difference,
    NoDifference,
    Success,
    Failure,
    DiscoveryComplete,
}

impl Trigger {
    pub fn all() -> &'static [Trigger] {
        &[
            Trigger::Enter,
            Trigger::NewDesiredState,
            Trigger::SystemState,
            Trigger::Poll,
            Trigger::Difference,
            Trigger::NoDifference,
            Trigger::Success,
            Trigger::Failure,
            Trigger::DiscoveryComplete,
        ]
    }
}

/// The transition table. `None` means the trigger is not accepted in `state`.
pub fn transition(state: State, trigger: Trigger) -> Option<State> {
    use State::*;
    use Trigger::*;

    let next = match (state, trigger) {
        (Start, Enter) => Waiting,

        (Waiting, NewDesiredState) => Diff1,
        (Waiting, SystemState) => Diff3,
        (Waiting, Poll) => Discover2,

        (Diff1, Difference) => Resolve1,
        (Diff1, NoDifference) => Waiting,
        (Resolve1, Success) => Discover1,
        (Resolve1, Failure) => Retry,

        (Discover1, DiscoveryComplete) => Diff2,
        (Diff2, Difference) => Resolve2,
        (Diff2, NoDifference) => Waiting,
        (Resolve2, Success) => Discover1,
        (Resolve2, Failure) => Retry,

        (Discover2, DiscoveryComplete) => Diff3,
        (Diff3, Difference) => Resolve3,
        (Diff3, NoDifference) => Waiting,
        (Resolve3, Success) => Discover2,
        (Resolve3, Failure) => Retry,

        (Retry, Success) => Discover1,
        (Retry, Failure) => Revert,
        (Revert, Success) => Discover1,
        (Revert, Failure) => Help,

        _ => return None,
    };
    Some(next)
}
