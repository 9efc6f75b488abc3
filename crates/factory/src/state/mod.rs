//! Durable workflow state and the append-only event log
//!
//! Both stores are read-through: they hold no cache of their own, so every
//! engine or wrapper instance sharing a backing store sees the same documents.

pub mod events;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::workflow::types::{DataMap, TaskStatus, WorkflowState, WorkflowStatus};

pub use events::{AgentEvent, EventBus, EventType};
pub use memory::{InMemoryEventStore, InMemoryWorkflowStore};
pub use sqlite::{SqliteEventStore, SqliteWorkflowStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("Failed to encode document: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Workflow already exists: {0}")]
    AlreadyExists(String),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Keyed workflow documents, one per plan execution
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn create(&self, state: WorkflowState) -> Result<(), StoreError>;

    async fn get(&self, workflow_id: &str) -> Result<Option<WorkflowState>, StoreError>;

    /// Set a task's status and merge `output` into its `output_data`.
    /// A missing workflow or task is a logged no-op.
    async fn update_task_status(
        &self,
        workflow_id: &str,
        task_id: &str,
        status: TaskStatus,
        output: Option<DataMap>,
    ) -> Result<(), StoreError>;

    /// Replace a task's `input_data`
    async fn set_task_input(
        &self,
        workflow_id: &str,
        task_id: &str,
        input_data: DataMap,
    ) -> Result<(), StoreError>;

    async fn set_workflow_status(
        &self,
        workflow_id: &str,
        status: WorkflowStatus,
        error: Option<String>,
    ) -> Result<(), StoreError>;

    /// All workflows, newest first
    async fn list_workflows(&self) -> Result<Vec<WorkflowState>, StoreError>;
}

/// Append-only audit log
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn publish(&self, event: AgentEvent) -> Result<(), StoreError>;

    /// Events for a workflow ordered by `created_at` ascending, optionally
    /// narrowed to one event type
    async fn get_history(
        &self,
        workflow_id: &str,
        event_type: Option<EventType>,
    ) -> Result<Vec<AgentEvent>, StoreError>;
}

/// Apply a task status update to a loaded document. Returns false when the
/// task is absent. Shared by every store implementation.
pub(crate) fn apply_task_update(
    state: &mut WorkflowState,
    task_id: &str,
    status: TaskStatus,
    output: Option<DataMap>,
) -> bool {
    let now = chrono::Utc::now();
    let Some(task) = state.task_mut(task_id) else {
        return false;
    };
    task.apply_status(status, now);
    if let Some(output) = output {
        task.merge_output(output);
    }
    state.updated_at = now;
    true
}

pub(crate) fn apply_task_input(state: &mut WorkflowState, task_id: &str, input: DataMap) -> bool {
    let Some(task) = state.task_mut(task_id) else {
        return false;
    };
    task.input_data = input;
    state.touch();
    true
}

pub(crate) fn apply_workflow_status(
    state: &mut WorkflowState,
    status: WorkflowStatus,
    error: Option<String>,
) {
    state.status = status;
    if error.is_some() {
        state.error = error;
    }
    state.touch();
}
