//! Agent events and the bus that persists and fans them out

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{EventStore, StoreError};

/// Wire-stable event vocabulary
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AgentStarted,
    TaskProgress,
    AgentCompleted,
    WorkflowCompleted,
    WorkflowFailed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::AgentStarted => "agent_started",
            EventType::TaskProgress => "task_progress",
            EventType::AgentCompleted => "agent_completed",
            EventType::WorkflowCompleted => "workflow_completed",
            EventType::WorkflowFailed => "workflow_failed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent_started" => Ok(EventType::AgentStarted),
            "task_progress" => Ok(EventType::TaskProgress),
            "agent_completed" => Ok(EventType::AgentCompleted),
            "workflow_completed" => Ok(EventType::WorkflowCompleted),
            "workflow_failed" => Ok(EventType::WorkflowFailed),
            other => Err(format!("Unknown event type: {}", other)),
        }
    }
}

/// Immutable audit record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentEvent {
    #[serde(alias = "event_id")]
    pub id: String,
    pub event_type: EventType,
    pub source_agent: String,
    pub workflow_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl AgentEvent {
    pub fn new(
        event_type: EventType,
        source_agent: impl Into<String>,
        workflow_id: impl Into<String>,
        task_id: Option<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            source_agent: source_agent.into(),
            workflow_id: workflow_id.into(),
            task_id,
            payload,
            created_at: Utc::now(),
        }
    }

    /// A `task_progress` line with a severity level
    pub fn progress(
        source_agent: impl Into<String>,
        workflow_id: impl Into<String>,
        task_id: impl Into<String>,
        level: &str,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            EventType::TaskProgress,
            source_agent,
            workflow_id,
            Some(task_id.into()),
            json!({ "level": level, "message": message.into() }),
        )
    }

    /// Payload field as a string, when present
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// Persists every event, then broadcasts it to live subscribers
#[derive(Clone)]
pub struct EventBus {
    store: Arc<dyn EventStore>,
    sender: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    pub fn new(store: Arc<dyn EventStore>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { store, sender }
    }

    pub async fn publish(&self, event: AgentEvent) -> Result<(), StoreError> {
        self.store.publish(event.clone()).await?;
        // No subscribers is fine
        let _ = self.sender.send(event);
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.sender.subscribe()
    }

    pub async fn get_history(
        &self,
        workflow_id: &str,
        event_type: Option<EventType>,
    ) -> Result<Vec<AgentEvent>, StoreError> {
        self.store.get_history(workflow_id, event_type).await
    }
}
