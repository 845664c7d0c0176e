use crate::models::{RelationshipState, Signals, Transition};

pub const CLOSE_THRESHOLD: f64 = 65.0;
pub const WARMING_THRESHOLD: f64 = 35.0;
/// A fall from close to distant only raises neglect below this score.
pub const NEGLECT_SCORE_FLOOR: f64 = 30.0;

pub fn classify(score: f64) -> RelationshipState {
    if score >= CLOSE_THRESHOLD {
        RelationshipState::Close
    } else if score >= WARMING_THRESHOLD {
        RelationshipState::Warming
    } else {
        RelationshipState::Distant
    }
}

/// Decides the state and neglected flag to persist after a scoring pass.
///
/// Neglect is only raised on a steep collapse from close straight to
/// distant under [`NEGLECT_SCORE_FLOOR`]; a gradual warming to distant
/// slide leaves the flag alone. Any move to a state other than distant
/// clears a previously raised flag.
pub fn apply_transition(
    signals: &Signals,
    computed_state: RelationshipState,
    computed_score: f64,
) -> Transition {
    let previous = signals.previous_state;
    let was_neglected = signals.was_neglected;

    if computed_state == previous {
        return Transition {
            state: previous,
            neglected: was_neglected,
        };
    }

    let neglected = if computed_state != RelationshipState::Distant && was_neglected {
        false
    } else if computed_state == RelationshipState::Distant
        && previous == RelationshipState::Close
        && computed_score < NEGLECT_SCORE_FLOOR
    {
        true
    } else {
        was_neglected
    };

    Transition {
        state: computed_state,
        neglected,
    }
}
