//! # IEP progress tracker
//!
//! Turns the dated data points teachers record against students' goals into progress summaries.
//!
//! ## Architecture
//!
//! - **duration**: packed `minutes.seconds` values and their validation
//! - **progress**: on-demand summaries (current, average, trend) and trend interpretation
//! - **entry**: checks a submission must pass before it is stored
//! - **models**: goals, objectives, and data points
//! - **db**: Postgres store
//! - **report**: markdown progress report

pub mod db;
pub mod duration;
pub mod entry;
pub mod models;
pub mod progress;
pub mod report;

pub use duration::{
    decode_to_minutes_seconds, encode_minutes_seconds, format_duration, validate_duration_value,
    DurationStyle, DurationUnit, MinutesSeconds,
};
pub use progress::{aggregate, interpret_trend, ProgressSummary, TrendDirection};
