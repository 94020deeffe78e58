use std::fmt::Write;

use chrono::NaiveDate;

use crate::duration::{format_duration_value, DurationUnit};
use crate::models::{CollectionTypeSummary, DataCollectionType, GoalProgress};
use crate::progress::TrendDirection;

pub fn summarize_by_type(progress: &[GoalProgress]) -> Vec<CollectionTypeSummary> {
    let mut map: std::collections::HashMap<DataCollectionType, (usize, usize)> =
        std::collections::HashMap::new();

    for entry in progress {
        let counts = map.entry(entry.goal.data_collection_type).or_insert((0, 0));
        counts.0 += 1;
        counts.1 += entry.summary.data_points_count;
    }

    let mut summaries: Vec<CollectionTypeSummary> = map
        .into_iter()
        .map(|(kind, (goal_count, data_point_count))| CollectionTypeSummary {
            kind,
            goal_count,
            data_point_count,
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.goal_count
            .cmp(&a.goal_count)
            .then_with(|| a.kind.as_str().cmp(b.kind.as_str()))
    });
    summaries
}

/// Renders a single stored value the way teachers read it.
pub fn format_value(kind: DataCollectionType, unit: Option<DurationUnit>, value: f64) -> String {
    match (kind, unit) {
        (DataCollectionType::Percentage, _) => format!("{:.1}%", value),
        (DataCollectionType::Frequency, _) if value.fract() == 0.0 => format!("{:.0}", value),
        (DataCollectionType::Frequency, _) => format!("{:.1}", value),
        (DataCollectionType::Duration, Some(unit)) => format_duration_value(value, unit),
        (DataCollectionType::Duration, None) => format!("{:.2}", value),
    }
}

/// Averages of packed durations are not themselves valid `M:SS` values, so they stay numeric.
pub fn format_average(kind: DataCollectionType, unit: Option<DurationUnit>, value: f64) -> String {
    match (kind, unit) {
        (DataCollectionType::Duration, Some(DurationUnit::Minutes)) => format!("{:.2} min", value),
        (DataCollectionType::Duration, Some(DurationUnit::Seconds)) => format!("{:.1} sec", value),
        _ => format_value(kind, unit, value),
    }
}

pub fn build_report(
    student: Option<&str>,
    generated_on: NaiveDate,
    progress: &[GoalProgress],
) -> String {
    let summaries = summarize_by_type(progress);

    let mut output = String::new();
    let student_label = student.unwrap_or("all students");

    let _ = writeln!(output, "# IEP Progress Report");
    let _ = writeln!(
        output,
        "Generated for {} on {}",
        student_label, generated_on
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Goal Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No goals recorded.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} goals ({} data points)",
                summary.kind, summary.goal_count, summary.data_point_count
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Goal Progress");

    if progress.is_empty() {
        let _ = writeln!(output, "No goals recorded.");
    } else {
        let _ = writeln!(
            output,
            "| Student | Goal | Type | Current | Average | Trend | Direction | Points |"
        );
        let _ = writeln!(output, "|---|---|---|---|---|---|---|---|");
        for entry in progress {
            let kind = entry.goal.data_collection_type;
            let direction = entry.goal.trend_direction(&entry.summary);
            let current = if entry.summary.data_points_count == 0 {
                "-".to_string()
            } else {
                format_value(kind, entry.duration_unit, entry.summary.current_progress)
            };
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} | {:+.1} | {} | {} |",
                entry.student_name,
                entry.goal.title,
                kind,
                current,
                format_average(kind, entry.duration_unit, entry.summary.average_score),
                entry.summary.trend,
                direction.label(),
                entry.summary.data_points_count
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Needs Attention");

    let worsening: Vec<&GoalProgress> = progress
        .iter()
        .filter(|entry| entry.goal.trend_direction(&entry.summary) == TrendDirection::Worsening)
        .collect();

    if worsening.is_empty() {
        let _ = writeln!(output, "No goals are trending the wrong way.");
    } else {
        for entry in worsening {
            let _ = writeln!(
                output,
                "- {}: {} (trend {:+.1})",
                entry.student_name, entry.goal.title, entry.summary.trend
            );
        }
    }

    output
}
