use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::errors::AppError;
use crate::workflow::{Actor, StepState, WorkflowStep};

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();

    // Try RFC3339 first (e.g. 2025-11-19T12:34:56Z)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Space separated with offset, as written by some SQLite tooling
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(dt.with_timezone(&Utc));
    }

    // Try SQLite default timestamp format: "YYYY-MM-DD HH:MM:SS" (with optional fractional seconds)
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    // Try date-only format: "YYYY-MM-DD"
    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = naive_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::internal("invalid datetime: date out of range".to_string()))?;
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(AppError::internal(format!("invalid datetime: {}", s)))
}

pub(crate) fn parse_opt_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, AppError> {
    match s {
        Some(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(parse_datetime(trimmed)?))
            }
        }
        None => Ok(None),
    }
}

fn parse_opt_actor(s: Option<String>) -> Result<Option<Actor>, AppError> {
    match s {
        Some(s) if !s.trim().is_empty() => serde_json::from_str(&s)
            .map(Some)
            .map_err(|e| AppError::internal(format!("invalid completed_by: {}", e))),
        _ => Ok(None),
    }
}

/// Blank link columns mean "no link".
fn non_blank(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}

pub fn workflow_step_from_row(row: &SqliteRow) -> Result<WorkflowStep, AppError> {
    let id: String = row.try_get("step_id").map_err(|e| AppError::internal(format!("missing step_id: {}", e)))?;
    let name: String = row.try_get("name").map_err(|e| AppError::internal(format!("missing name: {}", e)))?;
    let state_s: String = row.try_get("state").map_err(|e| AppError::internal(format!("missing state: {}", e)))?;
    let started_s: Option<String> = row.try_get("started").map_err(|e| AppError::internal(format!("missing started: {}", e)))?;
    let completed_s: Option<String> = row.try_get("completed").map_err(|e| AppError::internal(format!("missing completed: {}", e)))?;
    let due_date_s: Option<String> = row.try_get("due_date").map_err(|e| AppError::internal(format!("missing due_date: {}", e)))?;
    let completed_by_s: Option<String> = row.try_get("completed_by").map_err(|e| AppError::internal(format!("missing completed_by: {}", e)))?;
    let description: Option<String> = row.try_get("description").map_err(|e| AppError::internal(format!("missing description: {}", e)))?;
    let reason: Option<String> = row.try_get("reason").map_err(|e| AppError::internal(format!("missing reason: {}", e)))?;
    let previous_step: Option<String> = row.try_get("previous_step").map_err(|e| AppError::internal(format!("missing previous_step: {}", e)))?;
    let next_step: Option<String> = row.try_get("next_step").map_err(|e| AppError::internal(format!("missing next_step: {}", e)))?;

    let state = StepState::parse(&state_s);
    if state == StepState::Unknown {
        tracing::warn!(step_id = %id, state = %state_s, "unrecognized persisted step state");
    }

    Ok(WorkflowStep {
        id,
        name,
        state,
        started: parse_opt_datetime(started_s)?,
        completed: parse_opt_datetime(completed_s)?,
        due_date: parse_opt_datetime(due_date_s)?,
        completed_by: parse_opt_actor(completed_by_s)?,
        description,
        reason,
        previous_step: non_blank(previous_step),
        next_step: non_blank(next_step),
    })
}
