use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::duration::DurationUnit;
use crate::progress::ProgressSummary;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// How the progress value on each of a goal's data points is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataCollectionType {
    Percentage,
    Frequency,
    Duration,
}

impl DataCollectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataCollectionType::Percentage => "percentage",
            DataCollectionType::Frequency => "frequency",
            DataCollectionType::Duration => "duration",
        }
    }
}

impl fmt::Display for DataCollectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataCollectionType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "percentage" => Ok(DataCollectionType::Percentage),
            "frequency" => Ok(DataCollectionType::Frequency),
            "duration" => Ok(DataCollectionType::Duration),
            other => Err(UnknownVariant {
                kind: "data collection type",
                value: other.to_string(),
            }),
        }
    }
}

/// Whether a rising count is good for a frequency goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyDirection {
    Increase,
    Decrease,
}

impl FrequencyDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrequencyDirection::Increase => "increase",
            FrequencyDirection::Decrease => "decrease",
        }
    }
}

impl fmt::Display for FrequencyDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrequencyDirection {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "increase" => Ok(FrequencyDirection::Increase),
            "decrease" => Ok(FrequencyDirection::Decrease),
            other => Err(UnknownVariant {
                kind: "frequency direction",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: Uuid,
    pub student_id: Uuid,
    pub title: String,
    pub data_collection_type: DataCollectionType,
    /// Only meaningful for frequency goals.
    pub frequency_direction: Option<FrequencyDirection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Objective {
    pub id: Uuid,
    pub goal_id: Uuid,
    pub description: String,
}

/// One dated observation for a goal. `progress_value` has no meaning without the owning goal's
/// collection type (and `duration_unit` for duration goals).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    pub id: Uuid,
    pub goal_id: Uuid,
    pub objective_id: Option<Uuid>,
    pub date: NaiveDate,
    pub progress_value: f64,
    pub numerator: Option<u32>,
    pub denominator: Option<u32>,
    pub duration_unit: Option<DurationUnit>,
    pub level_of_support: Vec<String>,
    pub notes: Option<String>,
}

impl DataPoint {
    pub fn new(goal_id: Uuid, date: NaiveDate, progress_value: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            goal_id,
            objective_id: None,
            date,
            progress_value,
            numerator: None,
            denominator: None,
            duration_unit: None,
            level_of_support: Vec::new(),
            notes: None,
        }
    }

    pub fn with_unit(mut self, unit: DurationUnit) -> Self {
        self.duration_unit = Some(unit);
        self
    }

    pub fn with_objective(mut self, objective_id: Uuid) -> Self {
        self.objective_id = Some(objective_id);
        self
    }
}

/// A goal with its freshly computed summary, as handed to reports and the CLI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalProgress {
    pub student_name: String,
    pub goal: Goal,
    pub duration_unit: Option<DurationUnit>,
    pub summary: ProgressSummary,
}

/// Goal and data point counts for one collection type.
#[derive(Debug, Clone)]
pub struct CollectionTypeSummary {
    pub kind: DataCollectionType,
    pub goal_count: usize,
    pub data_point_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_parse_their_wire_names() {
        assert_eq!(
            "Duration".parse::<DataCollectionType>(),
            Ok(DataCollectionType::Duration)
        );
        assert_eq!(
            "decrease".parse::<FrequencyDirection>(),
            Ok(FrequencyDirection::Decrease)
        );
        let err = "rate".parse::<DataCollectionType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown data collection type 'rate'");
    }

    #[test]
    fn data_point_serializes_camel_case() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        let point = DataPoint::new(Uuid::new_v4(), date, 5.45).with_unit(DurationUnit::Minutes);
        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["progressValue"], 5.45);
        assert_eq!(json["durationUnit"], "minutes");
        assert_eq!(json["date"], "2025-01-06");
    }
}
