use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{AnalysisReport, RelationshipState, Signals, StateSummary, SubjectAnalysis};
use crate::score::{completion_counts, days_since_last_interaction, ratio};

pub fn assemble(
    signals: &Signals,
    score: f64,
    state: RelationshipState,
    recommendations: Vec<String>,
    now: DateTime<Utc>,
) -> AnalysisReport {
    let (completed, total) = completion_counts(signals, |_| true);
    let (completed_critical, total_critical) = completion_counts(signals, |a| a.is_critical);

    AnalysisReport {
        score,
        state,
        days_since_last_interaction: days_since_last_interaction(signals, now),
        action_completion_rate: ratio(completed, total),
        critical_action_completion_rate: ratio(completed_critical, total_critical),
        recommendations,
    }
}

/// Per-state counts and mean scores, closest relationships first.
pub fn summarize_by_state(analyses: &[SubjectAnalysis]) -> Vec<StateSummary> {
    let mut map: BTreeMap<RelationshipState, (usize, f64)> = BTreeMap::new();

    for analysis in analyses {
        let entry = map.entry(analysis.transition.state).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += analysis.report.score;
    }

    map.into_iter()
        .rev()
        .map(|(state, (count, total_score))| StateSummary {
            state,
            count,
            avg_score: if count == 0 {
                0.0
            } else {
                total_score / count as f64
            },
        })
        .collect()
}

/// Markdown overview of a scored roster. `analyses` is expected lowest score
/// first, as returned by `engine::analyze_roster`.
pub fn build_report(as_of: DateTime<Utc>, analyses: &[SubjectAnalysis]) -> String {
    let summaries = summarize_by_state(analyses);

    let mut output = String::new();

    let _ = writeln!(output, "# Relationship Health Report");
    let _ = writeln!(
        output,
        "Generated for {} relationships as of {}",
        analyses.len(),
        as_of.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## State Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No relationships tracked yet.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} relationships (avg score {:.1})",
                summary.state, summary.count, summary.avg_score
            );
        }
    }

    let neglected: Vec<&SubjectAnalysis> = analyses
        .iter()
        .filter(|analysis| analysis.transition.neglected)
        .collect();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Neglected");

    if neglected.is_empty() {
        let _ = writeln!(output, "No relationships are flagged as neglected.");
    } else {
        for analysis in neglected {
            let marker = if analysis.newly_neglected() { " (new)" } else { "" };
            let _ = writeln!(
                output,
                "- {}{}: score {:.2}, {} days since last interaction",
                analysis.full_name,
                marker,
                analysis.report.score,
                analysis.report.days_since_last_interaction
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Needs Attention");

    let attention: Vec<&SubjectAnalysis> = analyses
        .iter()
        .filter(|analysis| !analysis.report.recommendations.is_empty())
        .take(10)
        .collect();

    if attention.is_empty() {
        let _ = writeln!(output, "Every relationship is in good shape.");
    } else {
        for analysis in attention {
            let _ = writeln!(
                output,
                "- {} ({}, score {:.2}): {}",
                analysis.full_name,
                analysis.transition.state,
                analysis.report.score,
                analysis.report.recommendations.join("; ")
            );
        }
    }

    output
}
