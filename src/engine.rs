use chrono::{DateTime, Utc};

use crate::models::{AnalysisReport, Signals, Subject, SubjectAnalysis, Transition};
use crate::recommend::recommend;
use crate::report::assemble;
use crate::score::compute_score;
use crate::signals::collect;
use crate::state::{apply_transition, classify};

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub report: AnalysisReport,
    pub transition: Transition,
}

/// Score, classify, transition and assemble in one pass over a snapshot.
pub fn evaluate(signals: &Signals, now: DateTime<Utc>) -> Evaluation {
    let score = compute_score(signals, now);
    let state = classify(score);
    let transition = apply_transition(signals, state, score);
    let recommendations = recommend(signals, now);

    Evaluation {
        report: assemble(signals, score, state, recommendations, now),
        transition,
    }
}

pub fn analyze_subject(subject: &Subject, now: DateTime<Utc>) -> SubjectAnalysis {
    let signals = collect(subject, now);
    let Evaluation { report, transition } = evaluate(&signals, now);

    SubjectAnalysis {
        subject_id: subject.id,
        full_name: subject.full_name.clone(),
        previous_state: signals.previous_state,
        was_neglected: signals.was_neglected,
        report,
        transition,
    }
}

/// Analyses ordered from the most at-risk (lowest score) upward.
pub fn analyze_roster(subjects: &[Subject], now: DateTime<Utc>) -> Vec<SubjectAnalysis> {
    let mut analyses: Vec<SubjectAnalysis> = subjects
        .iter()
        .map(|subject| analyze_subject(subject, now))
        .collect();
    analyses.sort_by(|a, b| a.report.score.total_cmp(&b.report.score));
    analyses
}
