//! Progress summaries computed on demand from a goal's data points.
//!
//! Nothing here is cached or stored: every summary is rebuilt from the live list, so edits and
//! deletions are reflected on the next read.

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::models::{DataCollectionType, DataPoint, FrequencyDirection, Goal};

/// Points on each side of the trend comparison.
pub const TREND_WINDOW: usize = 3;

/// Trends smaller than this are reported as flat.
const FLAT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub current_progress: f64,
    pub average_score: f64,
    pub last_score: f64,
    /// Mean of the three most recent values minus the mean of the three before them.
    pub trend: f64,
    pub data_points_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Worsening,
    Flat,
}

impl TrendDirection {
    pub fn label(&self) -> &'static str {
        match self {
            TrendDirection::Improving => "improving",
            TrendDirection::Worsening => "worsening",
            TrendDirection::Flat => "flat",
        }
    }
}

impl Goal {
    pub fn summarize(&self, points: &[DataPoint]) -> ProgressSummary {
        aggregate(self.data_collection_type, points)
    }

    pub fn trend_direction(&self, summary: &ProgressSummary) -> TrendDirection {
        interpret_trend(summary.trend, self.frequency_direction)
    }
}

/// Most recent first. Same-day points keep their input order.
fn by_recency<'a>(points: impl IntoIterator<Item = &'a DataPoint>) -> Vec<&'a DataPoint> {
    let mut sorted: Vec<&DataPoint> = points.into_iter().collect();
    sorted.sort_by(|a, b| b.date.cmp(&a.date));
    sorted
}

fn mean(points: &[&DataPoint]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    points.iter().map(|point| point.progress_value).sum::<f64>() / points.len() as f64
}

fn summarize(kind: DataCollectionType, sorted: &[&DataPoint]) -> ProgressSummary {
    let Some(latest) = sorted.first() else {
        return ProgressSummary::default();
    };

    let trend = if sorted.len() < TREND_WINDOW * 2 {
        0.0
    } else {
        let recent = &sorted[..TREND_WINDOW];
        let previous = &sorted[TREND_WINDOW..TREND_WINDOW * 2];
        mean(recent) - mean(previous)
    };

    let summary = ProgressSummary {
        current_progress: latest.progress_value,
        average_score: mean(sorted),
        last_score: latest.progress_value,
        trend,
        data_points_count: sorted.len(),
    };

    debug!(
        kind = kind.as_str(),
        points = summary.data_points_count,
        trend = summary.trend,
        "computed progress summary"
    );
    summary
}

/// Summarizes every point handed in. Callers filter to the right goal first; duration values
/// are averaged in their packed form and should all share one unit.
pub fn aggregate(kind: DataCollectionType, points: &[DataPoint]) -> ProgressSummary {
    summarize(kind, &by_recency(points))
}

/// Summary restricted to points tagged with one objective.
pub fn aggregate_objective(
    kind: DataCollectionType,
    points: &[DataPoint],
    objective_id: Uuid,
) -> ProgressSummary {
    let tagged = by_recency(
        points
            .iter()
            .filter(|point| point.objective_id == Some(objective_id)),
    );
    summarize(kind, &tagged)
}

/// Summary over points not tagged with any objective.
pub fn aggregate_general(kind: DataCollectionType, points: &[DataPoint]) -> ProgressSummary {
    let general = by_recency(points.iter().filter(|point| point.objective_id.is_none()));
    summarize(kind, &general)
}

pub fn recent_values(points: &[DataPoint], count: usize) -> Vec<f64> {
    by_recency(points)
        .into_iter()
        .take(count)
        .map(|point| point.progress_value)
        .collect()
}

/// Reads a direction-agnostic trend as good or bad news. A falling count is an improvement for
/// goals that aim to decrease a behavior.
pub fn interpret_trend(trend: f64, direction: Option<FrequencyDirection>) -> TrendDirection {
    if !trend.is_finite() || trend.abs() < FLAT_TOLERANCE {
        return TrendDirection::Flat;
    }
    let signed = match direction {
        Some(FrequencyDirection::Decrease) => -trend,
        _ => trend,
    };
    if signed > 0.0 {
        TrendDirection::Improving
    } else {
        TrendDirection::Worsening
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration::{decode_to_minutes_seconds, validate_duration_value, DurationUnit};
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn points(values: &[(u32, f64)]) -> Vec<DataPoint> {
        let goal_id = Uuid::new_v4();
        values
            .iter()
            .map(|(d, value)| DataPoint::new(goal_id, day(*d), *value))
            .collect()
    }

    #[test]
    fn empty_input_yields_zero_summary() {
        let summary = aggregate(DataCollectionType::Percentage, &[]);
        assert_eq!(summary, ProgressSummary::default());
        assert_eq!(summary.current_progress, 0.0);
        assert_eq!(summary.average_score, 0.0);
        assert_eq!(summary.trend, 0.0);
        assert_eq!(summary.last_score, 0.0);
        assert_eq!(summary.data_points_count, 0);
    }

    #[test]
    fn percentage_scenario() {
        let data = points(&[
            (1, 50.0),
            (2, 70.0),
            (3, 90.0),
            (4, 60.0),
            (5, 80.0),
            (6, 100.0),
        ]);
        let summary = aggregate(DataCollectionType::Percentage, &data);
        assert_eq!(summary.current_progress, 100.0);
        assert_eq!(summary.last_score, 100.0);
        assert!((summary.average_score - 75.0).abs() < 1e-9);
        assert!((summary.trend - 10.0).abs() < 1e-9);
        assert_eq!(summary.data_points_count, 6);
    }

    #[test]
    fn trend_needs_six_points() {
        let five = points(&[(1, 10.0), (2, 20.0), (3, 30.0), (4, 40.0), (5, 50.0)]);
        assert_eq!(aggregate(DataCollectionType::Frequency, &five).trend, 0.0);

        let six = points(&[
            (1, 10.0),
            (2, 20.0),
            (3, 30.0),
            (4, 40.0),
            (5, 50.0),
            (6, 60.0),
        ]);
        // recent [60, 50, 40] vs previous [30, 20, 10]
        assert!((aggregate(DataCollectionType::Frequency, &six).trend - 30.0).abs() < 1e-9);
    }

    #[test]
    fn points_beyond_the_sixth_do_not_move_the_trend() {
        let mut data = points(&[
            (2, 10.0),
            (3, 10.0),
            (4, 10.0),
            (5, 20.0),
            (6, 20.0),
            (7, 20.0),
        ]);
        let base = aggregate(DataCollectionType::Frequency, &data).trend;
        data.extend(points(&[(1, 500.0)]));
        let extended = aggregate(DataCollectionType::Frequency, &data);
        assert!((extended.trend - base).abs() < 1e-9);
        assert_eq!(extended.data_points_count, 7);
    }

    #[test]
    fn input_order_does_not_matter_across_dates() {
        let data = points(&[(4, 60.0), (1, 50.0), (6, 100.0), (2, 70.0)]);
        let summary = aggregate(DataCollectionType::Percentage, &data);
        assert_eq!(summary.current_progress, 100.0);
        assert_eq!(summary.current_progress, summary.last_score);
    }

    #[test]
    fn same_day_ties_keep_input_order() {
        let data = points(&[(3, 40.0), (5, 80.0), (5, 20.0), (1, 10.0)]);
        let summary = aggregate(DataCollectionType::Percentage, &data);
        assert_eq!(summary.current_progress, 80.0);
        assert_eq!(summary.last_score, 80.0);
        assert_eq!(recent_values(&data, 3), vec![80.0, 20.0, 40.0]);
    }

    #[test]
    fn duration_scenario_values_are_valid_and_averaged_packed() {
        let goal_id = Uuid::new_v4();
        let data: Vec<DataPoint> = [(1, 5.45), (2, 3.00), (3, 0.00)]
            .iter()
            .map(|(d, v)| DataPoint::new(goal_id, day(*d), *v).with_unit(DurationUnit::Minutes))
            .collect();
        for point in &data {
            assert!(validate_duration_value(point.progress_value, DurationUnit::Minutes));
        }
        assert_eq!(decode_to_minutes_seconds(5.45).minutes, 5);
        assert_eq!(decode_to_minutes_seconds(5.45).seconds, 45);

        let summary = aggregate(DataCollectionType::Duration, &data);
        assert_eq!(summary.current_progress, 0.0);
        assert!((summary.average_score - 8.45 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn objective_and_general_views_partition_points() {
        let objective = Uuid::new_v4();
        let goal_id = Uuid::new_v4();
        let data = vec![
            DataPoint::new(goal_id, day(1), 40.0).with_objective(objective),
            DataPoint::new(goal_id, day(2), 60.0),
            DataPoint::new(goal_id, day(3), 80.0).with_objective(objective),
        ];

        let tagged = aggregate_objective(DataCollectionType::Percentage, &data, objective);
        assert_eq!(tagged.data_points_count, 2);
        assert_eq!(tagged.current_progress, 80.0);
        assert!((tagged.average_score - 60.0).abs() < 1e-9);

        let general = aggregate_general(DataCollectionType::Percentage, &data);
        assert_eq!(general.data_points_count, 1);
        assert_eq!(general.current_progress, 60.0);

        let other = aggregate_objective(DataCollectionType::Percentage, &data, Uuid::new_v4());
        assert_eq!(other, ProgressSummary::default());
    }

    #[test]
    fn trend_interpretation_respects_direction() {
        assert_eq!(interpret_trend(10.0, None), TrendDirection::Improving);
        assert_eq!(interpret_trend(-2.5, None), TrendDirection::Worsening);
        assert_eq!(
            interpret_trend(-2.5, Some(FrequencyDirection::Decrease)),
            TrendDirection::Improving
        );
        assert_eq!(
            interpret_trend(3.0, Some(FrequencyDirection::Decrease)),
            TrendDirection::Worsening
        );
        assert_eq!(
            interpret_trend(3.0, Some(FrequencyDirection::Increase)),
            TrendDirection::Improving
        );
        assert_eq!(interpret_trend(0.0, None), TrendDirection::Flat);
    }

    #[test]
    fn summary_serializes_for_presentation() {
        let data = points(&[(1, 50.0)]);
        let json = serde_json::to_value(aggregate(DataCollectionType::Percentage, &data)).unwrap();
        assert_eq!(json["currentProgress"], 50.0);
        assert_eq!(json["dataPointsCount"], 1);
        assert_eq!(json["trend"], 0.0);
    }
}
