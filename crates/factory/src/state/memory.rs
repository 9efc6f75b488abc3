//! In-memory reference stores
//!
//! Same contract as the SQLite stores; used by tests and lightweight runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    apply_task_input, apply_task_update, apply_workflow_status, AgentEvent, EventStore, EventType,
    StoreError, WorkflowStore,
};
use crate::workflow::types::{DataMap, TaskStatus, WorkflowState, WorkflowStatus};

#[derive(Default)]
pub struct InMemoryWorkflowStore {
    documents: RwLock<HashMap<String, WorkflowState>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn create(&self, state: WorkflowState) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        if documents.contains_key(&state.id) {
            return Err(StoreError::AlreadyExists(state.id));
        }
        tracing::debug!("[STORE] Created workflow {}", state.id);
        documents.insert(state.id.clone(), state);
        Ok(())
    }

    async fn get(&self, workflow_id: &str) -> Result<Option<WorkflowState>, StoreError> {
        Ok(self.documents.read().await.get(workflow_id).cloned())
    }

    async fn update_task_status(
        &self,
        workflow_id: &str,
        task_id: &str,
        status: TaskStatus,
        output: Option<DataMap>,
    ) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        let Some(state) = documents.get_mut(workflow_id) else {
            tracing::warn!("[STORE] Status update for unknown workflow {}", workflow_id);
            return Ok(());
        };
        if !apply_task_update(state, task_id, status, output) {
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
        let mut documents = self.documents.write().await;
        let Some(state) = documents.get_mut(workflow_id) else {
            tracing::warn!("[STORE] Input update for unknown workflow {}", workflow_id);
            return Ok(());
        };
        if !apply_task_input(state, task_id, input_data) {
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
        let mut documents = self.documents.write().await;
        match documents.get_mut(workflow_id) {
            Some(state) => apply_workflow_status(state, status, error),
            None => tracing::warn!("[STORE] Status update for unknown workflow {}", workflow_id),
        }
        Ok(())
    }

    async fn list_workflows(&self) -> Result<Vec<WorkflowState>, StoreError> {
        let mut all: Vec<WorkflowState> = self.documents.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(all)
    }
}

#[derive(Default)]
pub struct InMemoryEventStore {
    events: RwLock<Vec<AgentEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn publish(&self, event: AgentEvent) -> Result<(), StoreError> {
        self.events.write().await.push(event);
        Ok(())
    }

    async fn get_history(
        &self,
        workflow_id: &str,
        event_type: Option<EventType>,
    ) -> Result<Vec<AgentEvent>, StoreError> {
        let mut history: Vec<AgentEvent> = self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.workflow_id == workflow_id)
            .filter(|e| event_type.map_or(true, |ty| e.event_type == ty))
            .cloned()
            .collect();
        // Stable: equal timestamps keep publish order
        history.sort_by_key(|e| e.created_at);
        Ok(history)
    }
}
