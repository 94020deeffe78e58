use anyhow::Context;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::duration::DurationUnit;
use crate::entry::{accept_entry, check_collection_type, DataPointInput};
use crate::models::{
    DataCollectionType, DataPoint, FrequencyDirection, Goal, GoalProgress, Objective,
    UnknownVariant,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn goal_from_row(row: &PgRow) -> anyhow::Result<Goal> {
    let kind: String = row.get("data_collection_type");
    let direction: Option<String> = row.get("frequency_direction");
    Ok(Goal {
        id: row.get("id"),
        student_id: row.get("student_id"),
        title: row.get("title"),
        data_collection_type: kind.parse()?,
        frequency_direction: direction
            .as_deref()
            .map(str::parse::<FrequencyDirection>)
            .transpose()?,
    })
}

fn data_point_from_row(row: &PgRow) -> anyhow::Result<DataPoint> {
    let id: Uuid = row.get("id");
    let raw_value: String = row.get("progress_value");
    let progress_value: f64 = raw_value
        .trim()
        .parse()
        .with_context(|| format!("data point {id} has non-numeric progress value '{raw_value}'"))?;
    let numerator: Option<i32> = row.get("numerator");
    let denominator: Option<i32> = row.get("denominator");
    let unit: Option<String> = row.get("duration_unit");

    Ok(DataPoint {
        id,
        goal_id: row.get("goal_id"),
        objective_id: row.get("objective_id"),
        date: row.get("date"),
        progress_value,
        numerator: numerator.map(u32::try_from).transpose()?,
        denominator: denominator.map(u32::try_from).transpose()?,
        duration_unit: unit
            .as_deref()
            .map(str::parse::<DurationUnit>)
            .transpose()?,
        level_of_support: row.get("level_of_support"),
        notes: row.get("notes"),
    })
}

pub async fn upsert_student(pool: &PgPool, full_name: &str) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO progress_tracker.students (id, full_name)
        VALUES ($1, $2)
        ON CONFLICT (full_name) DO UPDATE SET full_name = EXCLUDED.full_name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(full_name)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

/// Direction stored when a frequency goal is first created without one.
fn initial_direction(
    kind: DataCollectionType,
    direction: Option<FrequencyDirection>,
) -> Option<FrequencyDirection> {
    match kind {
        DataCollectionType::Frequency => Some(direction.unwrap_or(FrequencyDirection::Increase)),
        _ => None,
    }
}

/// Creates the goal on first sight and otherwise returns it as stored. An existing goal never
/// changes its collection type here; a frequency goal's direction changes only when `direction`
/// is given. Callers compare the returned type with the one they submitted.
pub async fn upsert_goal(
    pool: &PgPool,
    student_id: Uuid,
    title: &str,
    kind: DataCollectionType,
    direction: Option<FrequencyDirection>,
) -> anyhow::Result<Goal> {
    let submitted = match kind {
        DataCollectionType::Frequency => direction,
        _ => None,
    };

    let row = sqlx::query(
        r#"
        INSERT INTO progress_tracker.goals
        (id, student_id, title, data_collection_type, frequency_direction)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (student_id, title) DO UPDATE
        SET frequency_direction = CASE
            WHEN progress_tracker.goals.data_collection_type = EXCLUDED.data_collection_type
            THEN COALESCE($6, progress_tracker.goals.frequency_direction)
            ELSE progress_tracker.goals.frequency_direction
        END
        RETURNING id, student_id, title, data_collection_type, frequency_direction
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(title)
    .bind(kind.as_str())
    .bind(initial_direction(kind, direction).map(|d| d.as_str()))
    .bind(submitted.map(|d| d.as_str()))
    .fetch_one(pool)
    .await?;

    goal_from_row(&row)
}

pub async fn upsert_objective(
    pool: &PgPool,
    goal_id: Uuid,
    description: &str,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO progress_tracker.objectives (id, goal_id, description)
        VALUES ($1, $2, $3)
        ON CONFLICT (goal_id, description) DO UPDATE SET description = EXCLUDED.description
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(goal_id)
    .bind(description)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

/// Goals with their student's name, optionally limited to one student.
pub async fn fetch_goals(
    pool: &PgPool,
    student: Option<&str>,
) -> anyhow::Result<Vec<(String, Goal)>> {
    let mut query = String::from(
        "SELECT g.id, g.student_id, g.title, g.data_collection_type, g.frequency_direction, \
         s.full_name \
         FROM progress_tracker.goals g \
         JOIN progress_tracker.students s ON s.id = g.student_id",
    );

    if student.is_some() {
        query.push_str(" WHERE s.full_name = $1");
    }
    query.push_str(" ORDER BY s.full_name, g.created_at");

    let mut rows = sqlx::query(&query);
    if let Some(value) = student {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut goals = Vec::with_capacity(records.len());
    for row in records {
        goals.push((row.get("full_name"), goal_from_row(&row)?));
    }
    Ok(goals)
}

pub async fn fetch_goal(pool: &PgPool, goal_id: Uuid) -> anyhow::Result<Option<(String, Goal)>> {
    let row = sqlx::query(
        r#"
        SELECT g.id, g.student_id, g.title, g.data_collection_type, g.frequency_direction,
               s.full_name
        FROM progress_tracker.goals g
        JOIN progress_tracker.students s ON s.id = g.student_id
        WHERE g.id = $1
        "#,
    )
    .bind(goal_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some((row.get("full_name"), goal_from_row(&row)?))),
        None => Ok(None),
    }
}

pub async fn fetch_objectives(pool: &PgPool, goal_id: Uuid) -> anyhow::Result<Vec<Objective>> {
    let rows = sqlx::query(
        "SELECT id, goal_id, description FROM progress_tracker.objectives \
         WHERE goal_id = $1 ORDER BY description",
    )
    .bind(goal_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Objective {
            id: row.get("id"),
            goal_id: row.get("goal_id"),
            description: row.get("description"),
        })
        .collect())
}

/// Newest date first; within a date the latest write comes first, which is the order the
/// aggregator's same-day tie-break expects.
pub async fn fetch_data_points(pool: &PgPool, goal_id: Uuid) -> anyhow::Result<Vec<DataPoint>> {
    let rows = sqlx::query(
        r#"
        SELECT id, goal_id, objective_id, date, progress_value, numerator, denominator,
               duration_unit, level_of_support, notes
        FROM progress_tracker.data_points
        WHERE goal_id = $1
        ORDER BY date DESC, created_at DESC
        "#,
    )
    .bind(goal_id)
    .fetch_all(pool)
    .await?;

    let mut points = Vec::with_capacity(rows.len());
    for row in rows {
        points.push(data_point_from_row(&row)?);
    }
    debug!(%goal_id, count = points.len(), "loaded data points");
    Ok(points)
}

/// Stores a point that has already passed [`accept_entry`]. Returns `false` when `source_key`
/// was seen before.
pub async fn insert_data_point(
    pool: &PgPool,
    point: &DataPoint,
    source_key: Option<&str>,
) -> anyhow::Result<bool> {
    let numerator = point.numerator.map(i32::try_from).transpose()?;
    let denominator = point.denominator.map(i32::try_from).transpose()?;

    let result = sqlx::query(
        r#"
        INSERT INTO progress_tracker.data_points
        (id, goal_id, objective_id, date, progress_value, numerator, denominator,
         duration_unit, level_of_support, notes, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(point.id)
    .bind(point.goal_id)
    .bind(point.objective_id)
    .bind(point.date)
    .bind(point.progress_value.to_string())
    .bind(numerator)
    .bind(denominator)
    .bind(point.duration_unit.map(|unit| unit.as_str()))
    .bind(point.level_of_support.clone())
    .bind(point.notes.as_deref())
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Recomputes every summary from the stored points; nothing is cached between calls.
pub async fn goal_progress(
    pool: &PgPool,
    student: Option<&str>,
) -> anyhow::Result<Vec<GoalProgress>> {
    let goals = fetch_goals(pool, student).await?;
    let mut progress = Vec::with_capacity(goals.len());

    for (student_name, goal) in goals {
        let points = fetch_data_points(pool, goal.id).await?;
        progress.push(GoalProgress {
            student_name,
            duration_unit: points.iter().find_map(|point| point.duration_unit),
            summary: goal.summarize(&points),
            goal,
        });
    }

    Ok(progress)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let today = chrono::Utc::now().date_naive();

    let maya = upsert_student(pool, "Maya Chen").await?;
    let jordan = upsert_student(pool, "Jordan Reyes").await?;

    let reading = upsert_goal(
        pool,
        maya,
        "Reads CVC words with 80% accuracy",
        DataCollectionType::Percentage,
        None,
    )
    .await?;
    let short_a = upsert_objective(pool, reading.id, "Short-a word families").await?;
    let calling_out = upsert_goal(
        pool,
        maya,
        "Reduces calling out during group instruction",
        DataCollectionType::Frequency,
        Some(FrequencyDirection::Decrease),
    )
    .await?;
    let work_time = upsert_goal(
        pool,
        jordan,
        "Sustains independent work",
        DataCollectionType::Duration,
        None,
    )
    .await?;

    let date = |month: u32, day: u32| {
        NaiveDate::from_ymd_opt(2026, month, day).context("invalid seed date")
    };

    let trials: [(&str, NaiveDate, u32, u32, Option<Uuid>); 6] = [
        ("seed-001", date(1, 12)?, 5, 10, Some(short_a)),
        ("seed-002", date(1, 19)?, 6, 10, Some(short_a)),
        ("seed-003", date(1, 26)?, 6, 10, None),
        ("seed-004", date(2, 2)?, 7, 10, Some(short_a)),
        ("seed-005", date(2, 9)?, 8, 10, None),
        ("seed-006", date(2, 16)?, 9, 10, Some(short_a)),
    ];
    let mut existing = fetch_data_points(pool, reading.id).await?;
    for (source_key, day, correct, attempted, objective_id) in trials {
        let input = DataPointInput {
            date: Some(day),
            numerator: Some(correct),
            denominator: Some(attempted),
            objective_id,
            level_of_support: vec!["gestural".to_string()],
            ..DataPointInput::default()
        };
        let point = accept_entry(&reading, &existing, input, today)
            .with_context(|| format!("seed point {source_key} failed validation"))?;
        insert_data_point(pool, &point, Some(source_key)).await?;
        existing.push(point);
    }

    let counts: [(&str, NaiveDate, f64); 6] = [
        ("seed-101", date(1, 13)?, 9.0),
        ("seed-102", date(1, 20)?, 8.0),
        ("seed-103", date(1, 27)?, 8.0),
        ("seed-104", date(2, 3)?, 5.0),
        ("seed-105", date(2, 10)?, 4.0),
        ("seed-106", date(2, 17)?, 2.0),
    ];
    let mut existing = fetch_data_points(pool, calling_out.id).await?;
    for (source_key, day, count) in counts {
        let input = DataPointInput {
            date: Some(day),
            progress_value: Some(count),
            ..DataPointInput::default()
        };
        let point = accept_entry(&calling_out, &existing, input, today)
            .with_context(|| format!("seed point {source_key} failed validation"))?;
        insert_data_point(pool, &point, Some(source_key)).await?;
        existing.push(point);
    }

    let durations: [(&str, NaiveDate, f64); 6] = [
        ("seed-201", date(1, 14)?, 3.15),
        ("seed-202", date(1, 21)?, 4.00),
        ("seed-203", date(1, 28)?, 4.30),
        ("seed-204", date(2, 4)?, 5.05),
        ("seed-205", date(2, 11)?, 5.45),
        ("seed-206", date(2, 18)?, 6.10),
    ];
    let mut existing = fetch_data_points(pool, work_time.id).await?;
    for (source_key, day, minutes) in durations {
        let input = DataPointInput {
            date: Some(day),
            progress_value: Some(minutes),
            duration_unit: Some(DurationUnit::Minutes),
            level_of_support: vec!["independent".to_string()],
            ..DataPointInput::default()
        };
        let point = accept_entry(&work_time, &existing, input, today)
            .with_context(|| format!("seed point {source_key} failed validation"))?;
        insert_data_point(pool, &point, Some(source_key)).await?;
        existing.push(point);
    }

    info!("seeded 2 students, 3 goals, 18 data points");
    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportOutcome {
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

#[derive(serde::Deserialize)]
struct CsvRow {
    student_name: String,
    goal_title: String,
    data_collection_type: String,
    frequency_direction: Option<String>,
    objective: Option<String>,
    date: NaiveDate,
    progress_value: Option<f64>,
    numerator: Option<u32>,
    denominator: Option<u32>,
    duration_unit: Option<String>,
    /// Semicolon separated.
    level_of_support: Option<String>,
    notes: Option<String>,
    source_key: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum RowError {
    #[error("malformed row: {0}")]
    Malformed(#[from] csv::Error),
    #[error(transparent)]
    Unknown(#[from] UnknownVariant),
    #[error(transparent)]
    Unit(#[from] crate::duration::DurationError),
}

/// A CSV row with its names parsed, ready to be matched against the store.
#[derive(Debug)]
struct ImportRow {
    student_name: String,
    goal_title: String,
    kind: DataCollectionType,
    direction: Option<FrequencyDirection>,
    objective: Option<String>,
    input: DataPointInput,
    source_key: Option<String>,
}

fn split_support(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_blank(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn import_row(row: CsvRow) -> Result<ImportRow, RowError> {
    let kind = row.data_collection_type.parse::<DataCollectionType>()?;
    let direction = non_blank(row.frequency_direction)
        .as_deref()
        .map(str::parse::<FrequencyDirection>)
        .transpose()?;
    let duration_unit = non_blank(row.duration_unit)
        .as_deref()
        .map(str::parse::<DurationUnit>)
        .transpose()?;

    Ok(ImportRow {
        student_name: row.student_name.trim().to_string(),
        goal_title: row.goal_title.trim().to_string(),
        kind,
        direction,
        objective: non_blank(row.objective),
        input: DataPointInput {
            date: Some(row.date),
            progress_value: row.progress_value,
            numerator: row.numerator,
            denominator: row.denominator,
            duration_unit,
            objective_id: None,
            level_of_support: split_support(row.level_of_support.as_deref()),
            notes: row.notes,
        },
        source_key: non_blank(row.source_key),
    })
}

/// Every record with its line number. A record that does not parse is an error for that line
/// only; reading carries on with the next one.
fn read_rows<R: std::io::Read>(
    reader: &mut csv::Reader<R>,
) -> Vec<(usize, Result<ImportRow, RowError>)> {
    reader
        .deserialize::<CsvRow>()
        .enumerate()
        .map(|(index, result)| {
            let line = index + 2;
            (line, result.map_err(RowError::from).and_then(import_row))
        })
        .collect()
}

/// Imports data points from a CSV file. See [`import_records`].
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<ImportOutcome> {
    let reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    import_records(pool, reader).await
}

/// Imports data points from CSV records. Rows that do not parse, that name a different
/// collection type than their existing goal, or that fail entry validation are logged, counted
/// and skipped; they are never written. Rows whose `source_key` is already stored count as
/// duplicates.
pub async fn import_records<R: std::io::Read>(
    pool: &PgPool,
    mut reader: csv::Reader<R>,
) -> anyhow::Result<ImportOutcome> {
    let today = chrono::Utc::now().date_naive();
    let mut outcome = ImportOutcome::default();

    for (line, row) in read_rows(&mut reader) {
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                warn!(line, error = %err, "rejected row");
                outcome.rejected += 1;
                continue;
            }
        };

        let student_id = upsert_student(pool, &row.student_name).await?;
        let goal = upsert_goal(pool, student_id, &row.goal_title, row.kind, row.direction).await?;
        if let Err(err) = check_collection_type(&goal, row.kind) {
            warn!(line, goal = %goal.title, error = %err, "rejected row");
            outcome.rejected += 1;
            continue;
        }

        let existing = fetch_data_points(pool, goal.id).await?;
        let mut point = match accept_entry(&goal, &existing, row.input, today) {
            Ok(point) => point,
            Err(err) => {
                warn!(line, goal = %goal.title, error = %err, "rejected row");
                outcome.rejected += 1;
                continue;
            }
        };
        if let Some(description) = row.objective.as_deref() {
            point.objective_id = Some(upsert_objective(pool, goal.id, description).await?);
        }

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        if insert_data_point(pool, &point, Some(&source_key)).await? {
            outcome.inserted += 1;
        } else {
            debug!(line, %source_key, "duplicate row");
            outcome.duplicates += 1;
        }
    }

    info!(
        inserted = outcome.inserted,
        duplicates = outcome.duplicates,
        rejected = outcome.rejected,
        "import finished"
    );
    Ok(outcome)
}
