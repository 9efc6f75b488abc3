//! Uniform lifecycle around an agent run
//!
//! Turns any [`Agent`] into an observable unit: status transitions go through
//! the [`WorkflowStore`], every step is mirrored as an [`AgentEvent`], and agent
//! failures (including panics) become a `failed` task instead of an error.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::{json, Value};

use super::{message_payload, Agent, AgentContext};
use crate::sandbox::CapabilityHandle;
use crate::state::{AgentEvent, EventBus, EventType, WorkflowStore};
use crate::workflow::types::{DataMap, TaskStatus};
use crate::{FactoryError, Result};

/// What the wrapper reports back for one task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRun {
    pub status: TaskStatus,
    pub output: DataMap,
}

impl TaskRun {
    pub fn is_failed(&self) -> bool {
        self.status == TaskStatus::Failed
    }
}

#[derive(Clone)]
pub struct LifecycleWrapper {
    store: Arc<dyn WorkflowStore>,
    events: EventBus,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl LifecycleWrapper {
    pub fn new(store: Arc<dyn WorkflowStore>, events: EventBus) -> Self {
        Self { store, events }
    }

    /// Run one task through `agent`.
    ///
    /// Returns `Err` only when the workflow or task is missing (`NotFound`) or
    /// a store write fails. Agent errors come back as a failed [`TaskRun`].
    pub async fn execute_task(
        &self,
        workflow_id: &str,
        task_id: &str,
        agent: Arc<dyn Agent>,
        capability: CapabilityHandle,
    ) -> Result<TaskRun> {
        let agent_name = agent.name().to_string();

        self.events
            .publish(AgentEvent::new(
                EventType::AgentStarted,
                agent_name.as_str(),
                workflow_id,
                Some(task_id.to_string()),
                json!({ "agent": agent_name, "capability": capability.class().as_str() }),
            ))
            .await?;

        self.store
            .update_task_status(workflow_id, task_id, TaskStatus::InProgress, None)
            .await?;

        let workflow = self
            .store
            .get(workflow_id)
            .await?
            .ok_or_else(|| FactoryError::NotFound {
                workflow_id: workflow_id.to_string(),
                task_id: None,
            })?;
        let task = workflow
            .task(task_id)
            .cloned()
            .ok_or_else(|| FactoryError::NotFound {
                workflow_id: workflow_id.to_string(),
                task_id: Some(task_id.to_string()),
            })?;

        tracing::info!(
            "[AGENT] {} starting task {} ({}): {}",
            agent_name,
            task.id,
            task.department,
            task.description
        );

        let ctx = AgentContext::new(
            workflow_id,
            task_id,
            agent_name.as_str(),
            capability,
            self.events.clone(),
        );

        let result = AssertUnwindSafe(agent.run(&ctx, &task)).catch_unwind().await;

        let failure = match result {
            Ok(Ok(output)) => return self.complete(&agent_name, workflow_id, task_id, output).await,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("{} panicked: {}", agent_name, panic_message(panic)),
        };

        self.fail(&agent_name, workflow_id, task_id, failure).await
    }

    async fn complete(
        &self,
        agent_name: &str,
        workflow_id: &str,
        task_id: &str,
        output: DataMap,
    ) -> Result<TaskRun> {
        self.store
            .update_task_status(workflow_id, task_id, TaskStatus::Completed, Some(output.clone()))
            .await?;

        let message = output
            .get("message")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| format!("Task {} completed by {}", task_id, agent_name));

        self.events
            .publish(AgentEvent::new(
                EventType::AgentCompleted,
                agent_name,
                workflow_id,
                Some(task_id.to_string()),
                message_payload(&message),
            ))
            .await?;

        tracing::info!("[AGENT] {} completed task {}", agent_name, task_id);
        Ok(TaskRun {
            status: TaskStatus::Completed,
            output,
        })
    }

    async fn fail(
        &self,
        agent_name: &str,
        workflow_id: &str,
        task_id: &str,
        error: String,
    ) -> Result<TaskRun> {
        tracing::error!("[AGENT] {} failed task {}: {}", agent_name, task_id, error);

        let mut output = DataMap::new();
        output.insert("error".to_string(), Value::String(error.clone()));

        self.store
            .update_task_status(workflow_id, task_id, TaskStatus::Failed, Some(output.clone()))
            .await?;

        self.events
            .publish(AgentEvent::new(
                EventType::TaskProgress,
                agent_name,
                workflow_id,
                Some(task_id.to_string()),
                json!({ "level": "error", "error": error }),
            ))
            .await?;

        Ok(TaskRun {
            status: TaskStatus::Failed,
            output,
        })
    }
}
