use sqlx::SqlitePool;
use uuid::Uuid;

use super::row_parsers::workflow_step_from_row;
use crate::errors::{AppError, AppResult};
use crate::workflow::Workflow;

/// Replaces the persisted steps of `request_id` with `workflow`.
pub async fn save_workflow(pool: &SqlitePool, request_id: Uuid, workflow: &Workflow) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM workflow_steps WHERE request_id = ?")
        .bind(request_id.to_string())
        .execute(&mut *tx)
        .await?;

    for (position, step) in workflow.steps().enumerate() {
        let completed_by = step
            .completed_by
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AppError::internal(format!("failed to encode completed_by: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO workflow_steps (
                request_id, step_id, position, name, state, started, completed, due_date,
                completed_by, description, reason, previous_step, next_step
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request_id.to_string())
        .bind(&step.id)
        .bind(position as i64)
        .bind(&step.name)
        .bind(step.state.as_str())
        .bind(step.started.map(|d| d.to_rfc3339()))
        .bind(step.completed.map(|d| d.to_rfc3339()))
        .bind(step.due_date.map(|d| d.to_rfc3339()))
        .bind(completed_by)
        .bind(&step.description)
        .bind(&step.reason)
        .bind(&step.previous_step)
        .bind(&step.next_step)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::debug!(%request_id, steps = workflow.len(), "workflow saved");
    Ok(())
}

/// Loads and re-validates the chain of `request_id`.
pub async fn load_workflow(pool: &SqlitePool, request_id: Uuid) -> AppResult<Workflow> {
    let rows = sqlx::query(
        r#"
        SELECT step_id, name, state, started, completed, due_date, completed_by,
               description, reason, previous_step, next_step
        FROM workflow_steps
        WHERE request_id = ?
        ORDER BY position ASC
        "#,
    )
    .bind(request_id.to_string())
    .fetch_all(pool)
    .await?;

    if rows.is_empty() {
        return Err(AppError::not_found(format!("workflow for request {}", request_id)));
    }

    let steps = rows
        .iter()
        .map(workflow_step_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Workflow::from_steps(steps)
}

pub async fn delete_workflow(pool: &SqlitePool, request_id: Uuid) -> AppResult<bool> {
    let result = sqlx::query("DELETE FROM workflow_steps WHERE request_id = ?")
        .bind(request_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
