//! SQLite-backed stores
//!
//! Workflows are stored as one JSON document per row keyed by workflow id.
//! Events go to an append-only table; `created_at` is kept in microseconds
//! and the autoincrement `seq` breaks ties so history order is stable.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};

use super::{
    apply_task_input, apply_task_update, apply_workflow_status, AgentEvent, EventStore, EventType,
    StoreError, WorkflowStore,
};
use crate::workflow::types::{DataMap, TaskStatus, WorkflowState, WorkflowStatus};

/// How long a writer waits for another connection's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS workflow_state (
        id TEXT PRIMARY KEY,
        project_name TEXT NOT NULL,
        status TEXT NOT NULL,
        document TEXT NOT NULL,
        started_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS agent_events (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        event_type TEXT NOT NULL,
        source_agent TEXT NOT NULL,
        workflow_id TEXT NOT NULL,
        task_id TEXT,
        payload TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_agent_events_workflow
        ON agent_events (workflow_id, created_at, seq);
    "#,
];

/// Open (creating if missing) a database and bootstrap the schema.
///
/// In-memory databases are pinned to a single connection so every query sees
/// the same database.
pub async fn connect(database_url: &str) -> Result<SqlitePool, StoreError> {
    let in_memory = database_url.contains(":memory:");
    let mut options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .busy_timeout(BUSY_TIMEOUT);
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }
    let max_connections = if in_memory { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    bootstrap_schema(&pool).await?;
    tracing::debug!("[STORE] Connected to {}", database_url);
    Ok(pool)
}

pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {}", micros)))
}

#[derive(Debug, FromRow)]
struct WorkflowRow {
    document: String,
}

impl WorkflowRow {
    fn decode(&self) -> Result<WorkflowState, StoreError> {
        Ok(serde_json::from_str(&self.document)?)
    }
}

#[derive(Clone)]
pub struct SqliteWorkflowStore {
    pool: SqlitePool,
}

impl SqliteWorkflowStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Load, mutate and write back one document inside a transaction.
    /// Returns false when the workflow does not exist.
    ///
    /// The transaction takes the write lock up front; a deferred one would
    /// hold a read lock and fail with SQLITE_BUSY on upgrade instead of
    /// waiting out the busy timeout.
    async fn modify<F>(&self, workflow_id: &str, apply: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut WorkflowState) + Send,
    {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let row = sqlx::query_as::<_, WorkflowRow>(
            r#"SELECT document FROM workflow_state WHERE id = ?1"#,
        )
        .bind(workflow_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(false);
        };

        let mut state = row.decode()?;
        apply(&mut state);

        sqlx::query(
            r#"
            UPDATE workflow_state
            SET status = ?2, document = ?3, updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(workflow_id)
        .bind(state.status.as_str())
        .bind(serde_json::to_string(&state)?)
        .bind(state.updated_at.timestamp_micros())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl WorkflowStore for SqliteWorkflowStore {
    async fn create(&self, state: WorkflowState) -> Result<(), StoreError> {
        let document = serde_json::to_string(&state)?;
        let result = sqlx::query(
            r#"
            INSERT INTO workflow_state (id, project_name, status, document, started_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&state.id)
        .bind(&state.project_name)
        .bind(state.status.as_str())
        .bind(document)
        .bind(state.started_at.timestamp_micros())
        .bind(state.updated_at.timestamp_micros())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(state.id));
        }
        tracing::debug!("[STORE] Created workflow {}", state.id);
        Ok(())
    }

    async fn get(&self, workflow_id: &str) -> Result<Option<WorkflowState>, StoreError> {
        let row = sqlx::query_as::<_, WorkflowRow>(
            r#"SELECT document FROM workflow_state WHERE id = ?1"#,
        )
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.decode()).transpose()
    }

    async fn update_task_status(
        &self,
        workflow_id: &str,
        task_id: &str,
        status: TaskStatus,
        output: Option<DataMap>,
    ) -> Result<(), StoreError> {
        let mut task_found = true;
        let found = self
            .modify(workflow_id, |state| {
                task_found = apply_task_update(state, task_id, status, output);
            })
            .await?;

        if !found {
            tracing::warn!("[STORE] Status update for unknown workflow {}", workflow_id);
        } else if !task_found {
            tracing::warn!("[STORE] Status update for unknown task {} in {}", task_id, workflow_id);
        }
        Ok(())
    }

    async fn set_task_input(
        &self,
        workflow_id: &str,
        task_id: &str,
        input_data: DataMap,
    ) -> Result<(), StoreError> {
        let mut task_found = true;
        let found = self
            .modify(workflow_id, |state| {
                task_found = apply_task_input(state, task_id, input_data);
            })
            .await?;

        if !found {
            tracing::warn!("[STORE] Input update for unknown workflow {}", workflow_id);
        } else if !task_found {
            tracing::warn!("[STORE] Input update for unknown task {} in {}", task_id, workflow_id);
        }
        Ok(())
    }

    async fn set_workflow_status(
        &self,
        workflow_id: &str,
        status: WorkflowStatus,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let found = self
            .modify(workflow_id, |state| apply_workflow_status(state, status, error))
            .await?;
        if !found {
            tracing::warn!("[STORE] Status update for unknown workflow {}", workflow_id);
        }
        Ok(())
    }

    async fn list_workflows(&self) -> Result<Vec<WorkflowState>, StoreError> {
        let rows = sqlx::query_as::<_, WorkflowRow>(
            r#"SELECT document FROM workflow_state ORDER BY started_at DESC, rowid DESC"#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(WorkflowRow::decode).collect()
    }
}

#[derive(Debug, FromRow)]
struct EventRow {
    id: String,
    event_type: String,
    source_agent: String,
    workflow_id: String,
    task_id: Option<String>,
    payload: String,
    created_at: i64,
}

impl TryFrom<EventRow> for AgentEvent {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(AgentEvent {
            event_type: EventType::from_str(&row.event_type).map_err(StoreError::Corrupt)?,
            payload: serde_json::from_str(&row.payload)?,
            created_at: from_micros(row.created_at)?,
            id: row.id,
            source_agent: row.source_agent,
            workflow_id: row.workflow_id,
            task_id: row.task_id,
        })
    }
}

#[derive(Clone)]
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn publish(&self, event: AgentEvent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO agent_events
                (id, event_type, source_agent, workflow_id, task_id, payload, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&event.id)
        .bind(event.event_type.as_str())
        .bind(&event.source_agent)
        .bind(&event.workflow_id)
        .bind(&event.task_id)
        .bind(serde_json::to_string(&event.payload)?)
        .bind(event.created_at.timestamp_micros())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_history(
        &self,
        workflow_id: &str,
        event_type: Option<EventType>,
    ) -> Result<Vec<AgentEvent>, StoreError> {
        let rows = match event_type {
            Some(ty) => {
                sqlx::query_as::<_, EventRow>(
                    r#"
                    SELECT id, event_type, source_agent, workflow_id, task_id, payload, created_at
                    FROM agent_events
                    WHERE workflow_id = ?1 AND event_type = ?2
                    ORDER BY created_at ASC, seq ASC
                    "#,
                )
                .bind(workflow_id)
                .bind(ty.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, EventRow>(
                    r#"
                    SELECT id, event_type, source_agent, workflow_id, task_id, payload, created_at
                    FROM agent_events
                    WHERE workflow_id = ?1
                    ORDER BY created_at ASC, seq ASC
                    "#,
                )
                .bind(workflow_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(AgentEvent::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::{Plan, Task};
    use chrono::Duration;
    use serde_json::json;

    async fn memory_pool() -> SqlitePool {
        connect("sqlite::memory:").await.unwrap()
    }

    fn sample_state(id: &str) -> WorkflowState {
        let plan = Plan::new(
            "P",
            vec![
                Task::new("Research", "find X").with_id("t1"),
                Task::new("Data", "store X").with_id("t2").with_input("node_type", "CONCEPT"),
            ],
        );
        WorkflowState::from_plan(id, &plan)
    }

    #[tokio::test]
    async fn test_workflow_document_round_trip() {
        let store = SqliteWorkflowStore::new(memory_pool().await);
        let state = sample_state("w1");
        store.create(state.clone()).await.unwrap();

        let loaded = store.get("w1").await.unwrap().unwrap();
        assert_eq!(loaded.project_name, "P");
        assert_eq!(loaded.tasks.len(), 2);
        assert_eq!(loaded.tasks[1].input_data.get("node_type"), Some(&json!("CONCEPT")));
        assert!(store.get("missing").await.unwrap().is_none());
        assert!(matches!(store.create(state).await, Err(StoreError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_task_updates_persist() {
        let store = SqliteWorkflowStore::new(memory_pool().await);
        store.create(sample_state("w1")).await.unwrap();

        let mut input = DataMap::new();
        input.insert("content".into(), json!("X found"));
        store.set_task_input("w1", "t2", input).await.unwrap();

        let mut output = DataMap::new();
        output.insert("message".into(), json!("stored"));
        store
            .update_task_status("w1", "t2", TaskStatus::Completed, Some(output))
            .await
            .unwrap();
        store
            .set_workflow_status("w1", WorkflowStatus::Completed, None)
            .await
            .unwrap();

        let state = store.get("w1").await.unwrap().unwrap();
        let task = state.task("t2").unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.input_data.get("content"), Some(&json!("X found")));
        assert_eq!(task.output_data.get("message"), Some(&json!("stored")));
        assert!(task.started_at.is_some() && task.completed_at.is_some());
        assert_eq!(state.status, WorkflowStatus::Completed);

        // Missing targets are silent no-ops
        store
            .update_task_status("ghost", "t1", TaskStatus::Failed, None)
            .await
            .unwrap();
        store
            .update_task_status("w1", "ghost", TaskStatus::Failed, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_workflows_newest_first() {
        let store = SqliteWorkflowStore::new(memory_pool().await);
        let mut older = sample_state("old");
        older.started_at = Utc::now() - Duration::minutes(5);
        store.create(older).await.unwrap();
        store.create(sample_state("new")).await.unwrap();

        let ids: Vec<String> = store
            .list_workflows()
            .await
            .unwrap()
            .into_iter()
            .map(|w| w.id)
            .collect();
        assert_eq!(ids, vec!["new".to_string(), "old".to_string()]);
    }

    #[tokio::test]
    async fn test_event_history_order_and_filter() {
        let store = SqliteEventStore::new(memory_pool().await);
        // Stored at microsecond precision
        let base = DateTime::from_timestamp_micros(Utc::now().timestamp_micros()).unwrap();

        let mut started = AgentEvent::new(
            EventType::AgentStarted,
            "Research",
            "w1",
            Some("t1".into()),
            json!({"department": "Research"}),
        );
        started.created_at = base;
        let mut done_late = AgentEvent::new(EventType::AgentCompleted, "Data", "w1", Some("t2".into()), json!({}));
        done_late.created_at = base + Duration::milliseconds(30);
        let mut done_early = AgentEvent::new(
            EventType::AgentCompleted,
            "Research",
            "w1",
            Some("t1".into()),
            json!({"message": "ok"}),
        );
        done_early.created_at = base + Duration::milliseconds(10);
        let mut tied = AgentEvent::progress("Research", "w1", "t1", "info", "same instant");
        tied.created_at = done_early.created_at;
        let unrelated = AgentEvent::new(EventType::AgentStarted, "Data", "w2", None, json!({}));

        for event in [done_late.clone(), started.clone(), done_early.clone(), tied.clone(), unrelated] {
            store.publish(event).await.unwrap();
        }

        let history = store.get_history("w1", None).await.unwrap();
        let ids: Vec<&str> = history.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                started.id.as_str(),
                done_early.id.as_str(),
                tied.id.as_str(),
                done_late.id.as_str()
            ]
        );
        assert!(history.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        assert_eq!(history[1].payload, json!({"message": "ok"}));
        assert_eq!(history[0].task_id.as_deref(), Some("t1"));

        let completed = store
            .get_history("w1", Some(EventType::AgentCompleted))
            .await
            .unwrap();
        assert_eq!(completed, vec![done_early, done_late]);
    }
}
