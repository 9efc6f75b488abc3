use async_trait::async_trait;
use serde_json::json;

use super::{input_str, output, Agent, AgentContext, AgentError};
use crate::workflow::types::{DataMap, TaskState};

/// Runs backend code in the process sandbox.
///
/// The script comes from `input_data.script`, falling back to the description;
/// `input_data.language` defaults to python.
pub struct BackendDeveloperAgent;

#[async_trait]
impl Agent for BackendDeveloperAgent {
    fn name(&self) -> &str {
        "BackendDeveloperAgent"
    }

    async fn run(&self, ctx: &AgentContext, task: &TaskState) -> Result<DataMap, AgentError> {
        let sandbox = ctx.process()?;
        let script = input_str(task, "script").unwrap_or(task.description.as_str());
        let language = input_str(task, "language").unwrap_or("python");

        ctx.log(format!("Running {} script in process sandbox", language)).await;
        let result = sandbox.run_script(language, script).await?;
        ctx.log("Process sandbox execution finished").await;

        let shown = result.stdout.trim();
        let mut out = output(json!({
            "message": format!(
                "Task '{}' executed. Output: {}",
                task.description,
                if shown.is_empty() { "No output" } else { shown }
            ),
            "stdout": result.stdout,
            "stderr": result.stderr,
            "exit_code": result.exit_code,
            "artifacts": result.artifacts,
        }));
        if let Some(url) = result.url {
            out.insert("url".to_string(), json!(url));
        }
        Ok(out)
    }
}
