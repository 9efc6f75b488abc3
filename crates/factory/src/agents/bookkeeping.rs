use async_trait::async_trait;
use serde_json::json;

use super::{output, Agent, AgentContext, AgentError};
use crate::workflow::types::{DataMap, TaskState};

/// Agent for departments that only record that their step happened
/// (integration and deployment)
pub struct BookkeepingAgent {
    name: String,
    activity: String,
}

impl BookkeepingAgent {
    pub fn new(name: impl Into<String>, activity: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            activity: activity.into(),
        }
    }
}

#[async_trait]
impl Agent for BookkeepingAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &AgentContext, task: &TaskState) -> Result<DataMap, AgentError> {
        ctx.log(format!("{}: {}", self.activity, task.description)).await;
        Ok(output(json!({
            "message": format!("Task '{}' completed by {}.", task.description, self.name),
            "artifacts": [],
        })))
    }
}
