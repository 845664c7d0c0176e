use chrono::{DateTime, Duration, Utc};

use crate::models::{ActionSignal, Signals, Subject};

pub const INTERACTION_WINDOW_DAYS: i64 = 30;

/// Earliest timestamp counted as part of the trailing interaction window.
pub fn window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(INTERACTION_WINDOW_DAYS)
}

pub fn collect(subject: &Subject, now: DateTime<Utc>) -> Signals {
    let since = window_start(now);
    let recent_events = subject
        .events
        .iter()
        .filter(|event| event.occurred_at >= since && event.occurred_at <= now)
        .count();

    Signals {
        last_contact_at: subject.last_contact_at,
        last_meal_at: subject.last_meal_at,
        last_mentoring_at: subject.last_mentoring_at,
        relationship_start_at: subject.started_at,
        actions: subject
            .actions
            .iter()
            .map(|action| ActionSignal {
                is_completed: action.is_completed,
                is_critical: action.is_critical,
            })
            .collect(),
        interaction_events_last_30_days: u32::try_from(recent_events).unwrap_or(u32::MAX),
        unresolved_conversation_count: subject.unresolved_conversation_count,
        previous_state: subject.state,
        was_neglected: subject.neglected,
    }
}
