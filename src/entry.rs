//! Checks applied to a submitted data point before it is stored.

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::duration::{validate_duration_value, DurationUnit};
use crate::models::{DataCollectionType, DataPoint, Goal, Objective};

#[derive(Debug, Error, PartialEq)]
pub enum EntryError {
    #[error("a progress value is required")]
    MissingValue,

    #[error("progress value must be a number")]
    NotANumber,

    #[error("progress value cannot be negative (got {0})")]
    Negative(f64),

    #[error("percentage must be between 0 and 100 (got {0})")]
    PercentageOutOfRange(f64),

    #[error("trials need both a correct count and an attempted count")]
    IncompleteTrials,

    #[error("attempted trials must be greater than zero")]
    ZeroDenominator,

    #[error("frequency must be a whole count (got {0})")]
    FractionalCount(f64),

    #[error("duration goals need a unit (seconds or minutes)")]
    MissingDurationUnit,

    #[error("{value} is not a valid duration in {unit}: {}", unit_hint(.unit))]
    InvalidDuration { value: f64, unit: DurationUnit },

    #[error("this goal already records durations in {expected}; cannot add a value in {found}")]
    MixedDurationUnits {
        expected: DurationUnit,
        found: DurationUnit,
    },

    #[error("this goal collects {stored} data; cannot add a {submitted} value")]
    CollectionTypeMismatch {
        stored: DataCollectionType,
        submitted: DataCollectionType,
    },

    #[error("objective {0} does not belong to this goal")]
    UnknownObjective(Uuid),
}

fn unit_hint(unit: &DurationUnit) -> &'static str {
    match unit {
        DurationUnit::Seconds => "use a whole number of seconds from 0 to 59",
        DurationUnit::Minutes => "use minutes.seconds with seconds from .00 to .59, e.g. 5.45",
    }
}

/// A data point as submitted, before any goal-specific checks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataPointInput {
    pub date: Option<NaiveDate>,
    pub progress_value: Option<f64>,
    pub numerator: Option<u32>,
    pub denominator: Option<u32>,
    pub duration_unit: Option<DurationUnit>,
    pub objective_id: Option<Uuid>,
    #[serde(default)]
    pub level_of_support: Vec<String>,
    pub notes: Option<String>,
}

/// Correct over attempted trials as a percentage, clamped to `[0, 100]`.
pub fn percentage_from_trials(numerator: u32, denominator: u32) -> Option<f64> {
    if denominator == 0 {
        return None;
    }
    let percentage = numerator as f64 * 100.0 / denominator as f64;
    Some(percentage.clamp(0.0, 100.0))
}

fn required_value(value: Option<f64>) -> Result<f64, EntryError> {
    let value = value.ok_or(EntryError::MissingValue)?;
    if !value.is_finite() {
        return Err(EntryError::NotANumber);
    }
    if value < 0.0 {
        return Err(EntryError::Negative(value));
    }
    Ok(value)
}

/// Turns a submission into a storable data point for `goal`, or says why it cannot be stored.
/// Entries dated in the future are accepted; the date defaults to `today`.
pub fn validate_entry(
    goal: &Goal,
    input: DataPointInput,
    today: NaiveDate,
) -> Result<DataPoint, EntryError> {
    let mut numerator = None;
    let mut denominator = None;
    let mut duration_unit = None;

    let progress_value = match goal.data_collection_type {
        DataCollectionType::Percentage => match (input.numerator, input.denominator) {
            (Some(correct), Some(attempted)) => {
                numerator = Some(correct);
                denominator = Some(attempted);
                percentage_from_trials(correct, attempted).ok_or(EntryError::ZeroDenominator)?
            }
            (Some(_), None) | (None, Some(_)) => return Err(EntryError::IncompleteTrials),
            (None, None) => {
                let value = required_value(input.progress_value)?;
                if value > 100.0 {
                    return Err(EntryError::PercentageOutOfRange(value));
                }
                value
            }
        },
        DataCollectionType::Frequency => {
            let value = required_value(input.progress_value)?;
            if value.fract() != 0.0 {
                return Err(EntryError::FractionalCount(value));
            }
            value
        }
        DataCollectionType::Duration => {
            let unit = input.duration_unit.ok_or(EntryError::MissingDurationUnit)?;
            let value = required_value(input.progress_value)?;
            if !validate_duration_value(value, unit) {
                return Err(EntryError::InvalidDuration { value, unit });
            }
            duration_unit = Some(unit);
            value
        }
    };

    Ok(DataPoint {
        id: Uuid::new_v4(),
        goal_id: goal.id,
        objective_id: input.objective_id,
        date: input.date.unwrap_or(today),
        progress_value,
        numerator,
        denominator,
        duration_unit,
        level_of_support: input.level_of_support,
        notes: input.notes.filter(|note| !note.trim().is_empty()),
    })
}

/// A duration goal keeps one unit for all of its points so that averages stay in one scale.
pub fn check_unit_consistency(
    existing: &[DataPoint],
    unit: DurationUnit,
) -> Result<(), EntryError> {
    match existing
        .iter()
        .filter_map(|point| point.duration_unit)
        .find(|stored| *stored != unit)
    {
        Some(expected) => Err(EntryError::MixedDurationUnits {
            expected,
            found: unit,
        }),
        None => Ok(()),
    }
}

/// A goal's collection type is fixed once it has been created; values submitted under another
/// type would be read on the wrong scale.
pub fn check_collection_type(
    goal: &Goal,
    submitted: DataCollectionType,
) -> Result<(), EntryError> {
    if goal.data_collection_type != submitted {
        return Err(EntryError::CollectionTypeMismatch {
            stored: goal.data_collection_type,
            submitted,
        });
    }
    Ok(())
}

/// `objectives` are the goal's stored objectives.
pub fn check_objective(
    goal: &Goal,
    objectives: &[Objective],
    objective_id: Uuid,
) -> Result<(), EntryError> {
    if objectives
        .iter()
        .any(|objective| objective.id == objective_id && objective.goal_id == goal.id)
    {
        Ok(())
    } else {
        Err(EntryError::UnknownObjective(objective_id))
    }
}

/// Full gate for a new point: goal-specific checks, then the single-unit rule against the points
/// the goal already has.
pub fn accept_entry(
    goal: &Goal,
    existing: &[DataPoint],
    input: DataPointInput,
    today: NaiveDate,
) -> Result<DataPoint, EntryError> {
    let point = validate_entry(goal, input, today)?;
    if let Some(unit) = point.duration_unit {
        check_unit_consistency(existing, unit)?;
    }
    Ok(point)
}
