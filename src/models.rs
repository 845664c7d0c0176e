use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse classification of a relationship, ordered by engagement depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipState {
    Distant,
    Warming,
    Close,
}

impl RelationshipState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipState::Distant => "distant",
            RelationshipState::Warming => "warming",
            RelationshipState::Close => "close",
        }
    }
}

impl fmt::Display for RelationshipState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown relationship state: {0}")]
pub struct ParseStateError(pub String);

impl FromStr for RelationshipState {
    type Err = ParseStateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "distant" => Ok(RelationshipState::Distant),
            "warming" => Ok(RelationshipState::Warming),
            "close" => Ok(RelationshipState::Close),
            _ => Err(ParseStateError(value.to_string())),
        }
    }
}

/// What kind of interaction an event records. Contact, meal and mentoring
/// events also advance the matching `last_*_at` timestamp on the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Contact,
    Meal,
    Mentoring,
    Meeting,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Contact => "contact",
            InteractionKind::Meal => "meal",
            InteractionKind::Mentoring => "mentoring",
            InteractionKind::Meeting => "meeting",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown interaction kind: {0}")]
pub struct ParseInteractionKindError(pub String);

impl FromStr for InteractionKind {
    type Err = ParseInteractionKindError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "contact" => Ok(InteractionKind::Contact),
            "meal" => Ok(InteractionKind::Meal),
            "mentoring" => Ok(InteractionKind::Mentoring),
            "meeting" => Ok(InteractionKind::Meeting),
            _ => Err(ParseInteractionKindError(value.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActionItem {
    pub title: String,
    pub is_completed: bool,
    pub is_critical: bool,
}

#[derive(Debug, Clone)]
pub struct InteractionEvent {
    pub kind: InteractionKind,
    pub occurred_at: DateTime<Utc>,
}

/// A tracked relationship as loaded from storage.
#[derive(Debug, Clone)]
pub struct Subject {
    pub id: Uuid,
    pub full_name: String,
    pub started_at: DateTime<Utc>,
    pub last_contact_at: Option<DateTime<Utc>>,
    pub last_meal_at: Option<DateTime<Utc>>,
    pub last_mentoring_at: Option<DateTime<Utc>>,
    pub state: RelationshipState,
    pub neglected: bool,
    pub unresolved_conversation_count: u32,
    pub actions: Vec<ActionItem>,
    pub events: Vec<InteractionEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionSignal {
    pub is_completed: bool,
    pub is_critical: bool,
}

/// Snapshot of every raw input the scoring engine reads for one subject.
#[derive(Debug, Clone, PartialEq)]
pub struct Signals {
    pub last_contact_at: Option<DateTime<Utc>>,
    pub last_meal_at: Option<DateTime<Utc>>,
    pub last_mentoring_at: Option<DateTime<Utc>>,
    pub relationship_start_at: DateTime<Utc>,
    pub actions: Vec<ActionSignal>,
    pub interaction_events_last_30_days: u32,
    pub unresolved_conversation_count: u32,
    pub previous_state: RelationshipState,
    pub was_neglected: bool,
}

/// The state and neglected flag to write back onto the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub state: RelationshipState,
    pub neglected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub score: f64,
    pub state: RelationshipState,
    pub days_since_last_interaction: i64,
    pub action_completion_rate: f64,
    pub critical_action_completion_rate: f64,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StateSummary {
    pub state: RelationshipState,
    pub count: usize,
    pub avg_score: f64,
}

/// One subject's report alongside the persisted values it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectAnalysis {
    pub subject_id: Uuid,
    pub full_name: String,
    pub previous_state: RelationshipState,
    pub was_neglected: bool,
    pub report: AnalysisReport,
    pub transition: Transition,
}

impl SubjectAnalysis {
    pub fn state_changed(&self) -> bool {
        self.transition.state != self.previous_state
    }

    pub fn newly_neglected(&self) -> bool {
        self.transition.neglected && !self.was_neglected
    }

    pub fn needs_write_back(&self) -> bool {
        self.state_changed() || self.transition.neglected != self.was_neglected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_order_by_engagement() {
        assert!(RelationshipState::Distant < RelationshipState::Warming);
        assert!(RelationshipState::Warming < RelationshipState::Close);
    }

    #[test]
    fn state_text_round_trips_through_storage_form() {
        for state in [
            RelationshipState::Distant,
            RelationshipState::Warming,
            RelationshipState::Close,
        ] {
            assert_eq!(state.as_str().parse::<RelationshipState>(), Ok(state));
        }
        assert_eq!(" Close ".parse::<RelationshipState>(), Ok(RelationshipState::Close));
    }

    #[test]
    fn unknown_state_is_rejected() {
        let err = "estranged".parse::<RelationshipState>().unwrap_err();
        assert_eq!(err.to_string(), "unknown relationship state: estranged");
    }

    #[test]
    fn interaction_kind_parses_case_insensitively() {
        assert_eq!("MEAL".parse::<InteractionKind>(), Ok(InteractionKind::Meal));
        assert!("call".parse::<InteractionKind>().is_err());
    }

    #[test]
    fn state_serializes_lowercase() {
        let json = serde_json::to_string(&RelationshipState::Warming).unwrap();
        assert_eq!(json, "\"warming\"");
    }
}
