use chrono::{DateTime, Duration, Utc};

use crate::models::{ActionSignal, Signals};

pub const BASE_SCORE: f64 = 40.0;
pub const MAX_SCORE: f64 = 100.0;
pub const NEGLECTED_PENALTY: f64 = 8.0;
pub const RECENT_WINDOW_DAYS: i64 = 3;

/// Whole days elapsed from `then` to `now`, never negative.
pub fn days_between(then: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - then).num_days().max(0)
}

/// The latest of the contact, meal and mentoring timestamps, falling back to
/// the start of the relationship when none has been recorded.
pub fn last_interaction_at(signals: &Signals) -> DateTime<Utc> {
    [
        signals.last_contact_at,
        signals.last_meal_at,
        signals.last_mentoring_at,
    ]
    .into_iter()
    .flatten()
    .max()
    .unwrap_or(signals.relationship_start_at)
}

pub fn days_since_last_interaction(signals: &Signals, now: DateTime<Utc>) -> i64 {
    days_between(last_interaction_at(signals), now)
}

pub fn compute_score(signals: &Signals, now: DateTime<Utc>) -> f64 {
    let total = BASE_SCORE
        + time_decay_points(days_since_last_interaction(signals, now))
        + action_points(signals)
        + frequency_points(signals.interaction_events_last_30_days)
        - unresolved_penalty(signals.unresolved_conversation_count)
        - neglect_penalty(signals.was_neglected)
        + duration_bonus(days_between(signals.relationship_start_at, now))
        + recent_interaction_bonus(signals, now);

    total.clamp(0.0, MAX_SCORE)
}

pub fn time_decay_points(days_since: i64) -> f64 {
    match days_since {
        0..=1 => 20.0,
        2..=3 => 15.0,
        4..=7 => 10.0,
        8..=14 => 5.0,
        15..=21 => 0.0,
        22..=35 => -8.0,
        36..=60 => -15.0,
        _ => -25.0,
    }
}

/// Completion share of all actions (up to 15) plus completion share of the
/// critical ones (up to 10). No actions, or no critical actions, adds nothing.
pub fn action_points(signals: &Signals) -> f64 {
    let (completed, total) = completion_counts(signals, |_| true);
    if total == 0 {
        return 0.0;
    }

    let mut points = ratio(completed, total) * 15.0;
    let (completed_critical, total_critical) = completion_counts(signals, |a| a.is_critical);
    if total_critical > 0 {
        points += ratio(completed_critical, total_critical) * 10.0;
    }
    points
}

pub fn frequency_points(events_last_30_days: u32) -> f64 {
    match events_last_30_days {
        0 => 0.0,
        1..=2 => 5.0,
        3..=4 => 10.0,
        5..=7 => 15.0,
        _ => 20.0,
    }
}

pub fn unresolved_penalty(unresolved: u32) -> f64 {
    (f64::from(unresolved) * 2.5).min(12.0)
}

pub fn neglect_penalty(was_neglected: bool) -> f64 {
    if was_neglected {
        NEGLECTED_PENALTY
    } else {
        0.0
    }
}

pub fn duration_bonus(relationship_days: i64) -> f64 {
    (relationship_days as f64 / 20.0 * 15.0).min(15.0)
}

/// Contact +3, meal +3, mentoring +4 for anything in the last three days,
/// capped at 10.
pub fn recent_interaction_bonus(signals: &Signals, now: DateTime<Utc>) -> f64 {
    let since = now - Duration::days(RECENT_WINDOW_DAYS);
    let is_recent = |at: Option<DateTime<Utc>>| at.is_some_and(|at| at >= since && at <= now);

    let mut bonus = 0.0;
    if is_recent(signals.last_contact_at) {
        bonus += 3.0;
    }
    if is_recent(signals.last_meal_at) {
        bonus += 3.0;
    }
    if is_recent(signals.last_mentoring_at) {
        bonus += 4.0;
    }
    f64::min(bonus, 10.0)
}

/// `(completed, total)` over the actions matching `filter`.
pub(crate) fn completion_counts(
    signals: &Signals,
    filter: impl Fn(&ActionSignal) -> bool,
) -> (usize, usize) {
    signals
        .actions
        .iter()
        .filter(|&action| filter(action))
        .fold((0, 0), |(completed, total), action| {
            (completed + usize::from(action.is_completed), total + 1)
        })
}

pub(crate) fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RelationshipState;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn days_ago(days: i64) -> DateTime<Utc> {
        now() - Duration::days(days)
    }

    fn baseline() -> Signals {
        Signals {
            last_contact_at: None,
            last_meal_at: None,
            last_mentoring_at: None,
            relationship_start_at: now(),
            actions: Vec::new(),
            interaction_events_last_30_days: 0,
            unresolved_conversation_count: 0,
            previous_state: RelationshipState::Warming,
            was_neglected: false,
        }
    }

    fn action(is_completed: bool, is_critical: bool) -> ActionSignal {
        ActionSignal {
            is_completed,
            is_critical,
        }
    }

    #[test]
    fn time_decay_follows_expected_tiers() {
        let expected = [
            (0, 20.0),
            (1, 20.0),
            (2, 15.0),
            (3, 15.0),
            (4, 10.0),
            (7, 10.0),
            (8, 5.0),
            (14, 5.0),
            (15, 0.0),
            (21, 0.0),
            (22, -8.0),
            (35, -8.0),
            (36, -15.0),
            (60, -15.0),
            (61, -25.0),
            (400, -25.0),
        ];
        for (days, points) in expected {
            assert_eq!(time_decay_points(days), points, "days = {days}");
        }
    }

    #[test]
    fn frequency_follows_expected_tiers() {
        assert_eq!(frequency_points(0), 0.0);
        assert_eq!(frequency_points(2), 5.0);
        assert_eq!(frequency_points(3), 10.0);
        assert_eq!(frequency_points(5), 15.0);
        assert_eq!(frequency_points(7), 15.0);
        assert_eq!(frequency_points(8), 20.0);
    }

    #[test]
    fn unresolved_penalty_is_capped() {
        assert_eq!(unresolved_penalty(0), 0.0);
        assert_eq!(unresolved_penalty(2), 5.0);
        assert_eq!(unresolved_penalty(4), 10.0);
        assert_eq!(unresolved_penalty(5), 12.0);
        assert_eq!(unresolved_penalty(500), 12.0);
    }

    #[test]
    fn duration_bonus_grows_then_caps() {
        assert_eq!(duration_bonus(0), 0.0);
        assert_eq!(duration_bonus(10), 7.5);
        assert_eq!(duration_bonus(20), 15.0);
        assert_eq!(duration_bonus(365), 15.0);
    }

    #[test]
    fn last_interaction_prefers_most_recent_timestamp() {
        let signals = Signals {
            last_contact_at: Some(days_ago(9)),
            last_meal_at: Some(days_ago(2)),
            last_mentoring_at: None,
            relationship_start_at: days_ago(50),
            ..baseline()
        };
        assert_eq!(last_interaction_at(&signals), days_ago(2));
        assert_eq!(days_since_last_interaction(&signals, now()), 2);
    }

    #[test]
    fn last_interaction_falls_back_to_start() {
        let signals = Signals {
            relationship_start_at: days_ago(12),
            ..baseline()
        };
        assert_eq!(days_since_last_interaction(&signals, now()), 12);
    }

    #[test]
    fn future_timestamps_clamp_to_zero_days() {
        assert_eq!(days_between(now() + Duration::days(5), now()), 0);
    }

    #[test]
    fn action_points_without_critical_actions_use_completion_only() {
        let signals = Signals {
            actions: vec![action(true, false), action(false, false)],
            ..baseline()
        };
        assert_eq!(action_points(&signals), 7.5);
    }

    #[test]
    fn action_points_add_critical_bonus() {
        let signals = Signals {
            actions: vec![action(true, true), action(false, true), action(true, false), action(true, false)],
            ..baseline()
        };
        // 3/4 * 15 + 1/2 * 10
        assert_eq!(action_points(&signals), 16.25);
    }

    #[test]
    fn no_actions_contribute_nothing() {
        assert_eq!(action_points(&baseline()), 0.0);
    }

    #[test]
    fn recent_bonus_sums_each_channel() {
        let signals = Signals {
            last_contact_at: Some(days_ago(1)),
            last_meal_at: Some(days_ago(3)),
            last_mentoring_at: Some(now()),
            relationship_start_at: days_ago(30),
            ..baseline()
        };
        assert_eq!(recent_interaction_bonus(&signals, now()), 10.0);

        let stale_meal = Signals {
            last_meal_at: Some(days_ago(4)),
            ..signals
        };
        assert_eq!(recent_interaction_bonus(&stale_meal, now()), 7.0);
    }

    #[test]
    fn neglect_penalty_uses_prior_flag() {
        let neglected = Signals {
            was_neglected: true,
            ..baseline()
        };
        assert_eq!(compute_score(&baseline(), now()) - compute_score(&neglected, now()), 8.0);
    }

    #[test]
    fn score_clamps_at_ceiling() {
        let signals = Signals {
            last_contact_at: Some(now()),
            last_meal_at: Some(now()),
            last_mentoring_at: Some(now()),
            relationship_start_at: days_ago(400),
            actions: vec![action(true, true)],
            interaction_events_last_30_days: 12,
            ..baseline()
        };
        // 40 + 20 + 25 + 20 + 15 + 10 = 130 before clamping
        assert_eq!(compute_score(&signals, now()), 100.0);
    }

    #[test]
    fn score_clamps_at_floor() {
        let signals = Signals {
            last_contact_at: Some(days_ago(500)),
            actions: vec![action(false, true)],
            unresolved_conversation_count: 10,
            was_neglected: true,
            ..baseline()
        };
        // 40 - 25 - 12 - 8 = -5 before clamping
        assert_eq!(compute_score(&signals, now()), 0.0);
    }

    fn arb_offset() -> impl Strategy<Value = Option<i64>> {
        proptest::option::of(0i64..400)
    }

    prop_compose! {
        fn arb_signals()(
            contact in arb_offset(),
            meal in arb_offset(),
            mentoring in arb_offset(),
            start in 0i64..2000,
            actions in proptest::collection::vec((any::<bool>(), any::<bool>()), 0..12),
            events in 0u32..40,
            unresolved in 0u32..20,
            was_neglected in any::<bool>(),
        ) -> Signals {
            Signals {
                last_contact_at: contact.map(days_ago),
                last_meal_at: meal.map(days_ago),
                last_mentoring_at: mentoring.map(days_ago),
                relationship_start_at: days_ago(start),
                actions: actions
                    .into_iter()
                    .map(|(is_completed, is_critical)| action(is_completed, is_critical))
                    .collect(),
                interaction_events_last_30_days: events,
                unresolved_conversation_count: unresolved,
                previous_state: RelationshipState::Warming,
                was_neglected,
            }
        }
    }

    proptest! {
        #[test]
        fn score_always_in_bounds(signals in arb_signals()) {
            let score = compute_score(&signals, now());
            prop_assert!((0.0..=100.0).contains(&score));
        }

        #[test]
        fn score_is_deterministic(signals in arb_signals()) {
            prop_assert_eq!(compute_score(&signals, now()), compute_score(&signals, now()));
        }

        #[test]
        fn completing_an_action_never_lowers_score(signals in arb_signals(), critical in any::<bool>()) {
            let pending = signals
                .actions
                .iter()
                .position(|a| !a.is_completed && a.is_critical == critical);
            prop_assume!(pending.is_some());

            let mut improved = signals.clone();
            if let Some(index) = pending {
                improved.actions[index].is_completed = true;
            }
            prop_assert!(compute_score(&improved, now()) >= compute_score(&signals, now()));
        }
    }
}
