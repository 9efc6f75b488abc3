use async_trait::async_trait;
use serde_json::json;

use super::{input_str, output, Agent, AgentContext, AgentError};
use crate::workflow::types::{DataMap, TaskState};

/// Produces a research summary for the task. No retrieval backend is wired
/// in; the summary is derived from the description and any injected context.
pub struct ResearchAgent;

#[async_trait]
impl Agent for ResearchAgent {
    fn name(&self) -> &str {
        "ResearchAgent"
    }

    async fn run(&self, ctx: &AgentContext, task: &TaskState) -> Result<DataMap, AgentError> {
        ctx.log(format!("Performing research task: {}", task.description)).await;

        let summary = match input_str(task, "content") {
            Some(context) => format!("Summary for task: {}\nContext: {}", task.description, context),
            None => format!("Summary for task: {}", task.description),
        };

        Ok(output(json!({
            "message": format!("Research completed for '{}'", task.description),
            "summary": summary,
            "artifacts": [summary],
        })))
    }
}
