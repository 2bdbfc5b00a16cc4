//! Audit events for workflow decisions.
//!
//! Commands publish events on a broadcast bus; [`start_audit_listener`] appends them to
//! the `event_store` table, chaining each row to the previous one with SHA-256.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::authz::UnmetRequirement;
use crate::errors::AppResult;
use crate::workflow::{Actor, WorkflowStep};

pub mod loggable;
pub use loggable::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent<T> {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor: Option<Actor>,
    pub subject_id: Uuid,
    pub severity: Severity,
    pub payload: T,
}

impl<T> DomainEvent<T> {
    pub fn new(name: impl Into<String>, actor: Option<Actor>, subject_id: Uuid, severity: Severity, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            occurred_at: Utc::now(),
            actor,
            subject_id,
            severity,
            payload,
        }
    }
}

pub type EventBus = broadcast::Sender<DomainEvent<Value>>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<DomainEvent<Value>>) {
    broadcast::channel(1024)
}

impl Loggable for WorkflowStep {
    fn entity_type() -> &'static str {
        "workflow_step"
    }
}

/// A denied attempt to act on a workflow step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessDenial {
    pub person_id: Uuid,
    pub subtype: String,
    pub step: String,
    pub unmet: Vec<UnmetRequirement>,
}

impl Loggable for AccessDenial {
    fn entity_type() -> &'static str {
        "authz"
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }
}

/// Publishes `<entity_type>.<action>` for `entity` on the bus.
///
/// Nobody listening is not an error; audit publishing never fails the command.
pub fn log_activity<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor: Option<&Actor>,
    subject_id: Uuid,
    entity: &T,
) {
    let name = format!("{}.{}", T::entity_type(), action);
    let payload = match serde_json::to_value(entity) {
        Ok(value) => value,
        Err(err) => {
            tracing::error!(event = %name, error = %err, "failed to serialize audit payload");
            return;
        }
    };

    let event = DomainEvent::new(name, actor.cloned(), subject_id, entity.severity_for_action(action), payload);
    if event_bus.send(event).is_err() {
        tracing::debug!("no audit listener attached");
    }
}

fn chain_hash(prev_hash: Option<&str>, payload: &str) -> String {
    let mut hasher = Sha256::new();
    if let Some(prev) = prev_hash {
        hasher.update(prev.as_bytes());
    }
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

async fn last_hash(pool: &SqlitePool) -> AppResult<Option<String>> {
    let hash = sqlx::query_scalar::<_, String>("SELECT hash FROM event_store ORDER BY seq DESC LIMIT 1")
        .fetch_optional(pool)
        .await?;
    Ok(hash)
}

async fn append_event(pool: &SqlitePool, prev_hash: Option<&str>, event: &DomainEvent<Value>) -> AppResult<String> {
    let payload = serde_json::to_string(event).map_err(|err| crate::errors::AppError::internal(err.to_string()))?;
    let hash = chain_hash(prev_hash, &payload);
    let actor = event.actor.as_ref().map(|a| a.to_string());

    sqlx::query(
        r#"
        INSERT INTO event_store (id, event_name, occurred_at, actor, subject_id, payload, severity, prev_hash, hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.id.to_string())
    .bind(&event.name)
    .bind(event.occurred_at)
    .bind(actor)
    .bind(event.subject_id.to_string())
    .bind(&payload)
    .bind(event.severity.as_str())
    .bind(prev_hash)
    .bind(&hash)
    .execute(pool)
    .await?;

    Ok(hash)
}

/// Drains the bus into `event_store` until every sender is dropped.
pub async fn start_audit_listener(mut rx: broadcast::Receiver<DomainEvent<Value>>, pool: SqlitePool) {
    tracing::info!("Audit listener started");

    let mut prev_hash = match last_hash(&pool).await {
        Ok(hash) => hash,
        Err(e) => {
            tracing::error!("Failed to read audit chain head: {}", e);
            None
        }
    };

    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "audit listener lagged, events dropped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match append_event(&pool, prev_hash.as_deref(), &event).await {
            Ok(hash) => prev_hash = Some(hash),
            Err(e) => tracing::error!(event = %event.name, "Failed to save to event store: {}", e),
        }
    }

    tracing::info!("Audit listener stopped");
}

/// Recomputes the hash chain; false when any row was altered or removed.
pub async fn verify_audit_chain(pool: &SqlitePool) -> AppResult<bool> {
    let rows = sqlx::query("SELECT payload, prev_hash, hash FROM event_store ORDER BY seq ASC")
        .fetch_all(pool)
        .await?;

    let mut expected_prev: Option<String> = None;
    for row in rows {
        let payload: String = row.try_get("payload")?;
        let prev_hash: Option<String> = row.try_get("prev_hash")?;
        let hash: String = row.try_get("hash")?;

        if prev_hash != expected_prev || chain_hash(prev_hash.as_deref(), &payload) != hash {
            return Ok(false);
        }
        expected_prev = Some(hash);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_and_denials_are_critical() {
        let step = WorkflowStep::new("approval", "Approval");
        assert_eq!(step.severity_for_action("approved"), Severity::Important);
        assert_eq!(step.severity_for_action("rejected"), Severity::Critical);

        let denial = AccessDenial {
            person_id: Uuid::new_v4(),
            subtype: "normal".to_string(),
            step: "proposal".to_string(),
            unmet: vec![],
        };
        assert_eq!(denial.severity_for_action("denied"), Severity::Critical);
    }

    #[tokio::test]
    async fn published_events_reach_subscribers() {
        let (bus, mut rx) = init_event_bus();
        let request_id = Uuid::new_v4();
        let step = WorkflowStep::new("approval", "Approval");

        log_activity(&bus, "approved", Some(&Actor::System), request_id, &step);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, "workflow_step.approved");
        assert_eq!(event.subject_id, request_id);
        assert_eq!(event.payload["id"], "approval");
    }

    #[test]
    fn publishing_without_listener_does_not_panic() {
        let (bus, rx) = init_event_bus();
        drop(rx);
        log_activity(&bus, "approved", None, Uuid::new_v4(), &WorkflowStep::new("a", "a"));
    }

    #[test]
    fn chain_hash_depends_on_previous() {
        assert_ne!(chain_hash(None, "x"), chain_hash(Some("abc"), "x"));
    }
}
