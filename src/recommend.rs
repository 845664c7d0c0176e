use chrono::{DateTime, Utc};

use crate::models::Signals;
use crate::score::{days_between, days_since_last_interaction};

pub const URGENT_REACH_OUT: &str = "urgent: reach out, no contact in two weeks";
pub const LIGHT_CHECK_IN: &str = "send a light check-in";
pub const RESOLVE_CONVERSATIONS: &str = "resolve pending conversation items";
pub const NO_SHARED_MEAL: &str = "no shared meal recorded yet";
pub const STALE_SHARED_MEAL: &str = "it has been over a month since a shared meal";

pub fn recommend(signals: &Signals, now: DateTime<Utc>) -> Vec<String> {
    let mut recommendations = Vec::new();

    let days_since = days_since_last_interaction(signals, now);
    if days_since > 14 {
        recommendations.push(URGENT_REACH_OUT.to_string());
    } else if days_since > 7 {
        recommendations.push(LIGHT_CHECK_IN.to_string());
    }

    let pending_critical = signals
        .actions
        .iter()
        .filter(|action| action.is_critical && !action.is_completed)
        .count();
    if pending_critical > 0 {
        recommendations.push(format!("{pending_critical} critical action(s) pending"));
    }

    if signals.unresolved_conversation_count > 2 {
        recommendations.push(RESOLVE_CONVERSATIONS.to_string());
    }

    match signals.last_meal_at {
        None => recommendations.push(NO_SHARED_MEAL.to_string()),
        Some(at) if days_between(at, now) > 30 => {
            recommendations.push(STALE_SHARED_MEAL.to_string())
        }
        Some(_) => {}
    }

    recommendations
}
