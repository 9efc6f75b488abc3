//! Core types for plan execution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Open key/value map used for task inputs and outputs
pub type DataMap = HashMap<String, Value>;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Status of a single task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a workflow document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Running,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkflowStatus::Running)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work produced by the planner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    #[serde(default = "new_id", alias = "task_id")]
    pub id: String,
    pub department: String,
    #[serde(alias = "task")]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_type: Option<String>,
    #[serde(default)]
    pub input_data: DataMap,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Task {
    pub fn new(department: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            department: department.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            sandbox_type: None,
            input_data: DataMap::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_sandbox(mut self, sandbox_type: impl Into<String>) -> Self {
        self.sandbox_type = Some(sandbox_type.into());
        self
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.input_data.insert(key.into(), value.into());
        self
    }

    pub fn depends_on(mut self, task_id: impl Into<String>) -> Self {
        self.depends_on.push(task_id.into());
        self
    }
}

/// Ordered task list for one project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub project_name: String,
    pub tasks: Vec<Task>,
}

impl Plan {
    pub fn new(project_name: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            project_name: project_name.into(),
            tasks,
        }
    }
}

/// Durable per-task projection stored inside the workflow document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskState {
    #[serde(alias = "task_id")]
    pub id: String,
    pub department: String,
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub input_data: DataMap,
    #[serde(default)]
    pub output_data: DataMap,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskState {
    /// Move to `status`, stamping start/completion times only the first time
    /// they are reached. Existing timestamps are never cleared.
    pub fn apply_status(&mut self, status: TaskStatus, now: DateTime<Utc>) {
        match status {
            TaskStatus::InProgress => {
                self.started_at.get_or_insert(now);
            }
            TaskStatus::Completed | TaskStatus::Failed => {
                self.started_at.get_or_insert(now);
                self.completed_at.get_or_insert(now);
            }
            TaskStatus::Pending => {}
        }
        self.status = status;
    }

    /// Merge `output` into `output_data`, new keys win
    pub fn merge_output(&mut self, output: DataMap) {
        self.output_data.extend(output);
    }
}

impl From<&Task> for TaskState {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            department: task.department.clone(),
            description: task.description.clone(),
            status: task.status,
            input_data: task.input_data.clone(),
            output_data: DataMap::new(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Top-level durable record for one plan execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowState {
    #[serde(alias = "workflow_id")]
    pub id: String,
    pub project_name: String,
    pub tasks: Vec<TaskState>,
    #[serde(default)]
    pub status: WorkflowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    pub fn from_plan(id: impl Into<String>, plan: &Plan) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            project_name: plan.project_name.clone(),
            tasks: plan.tasks.iter().map(TaskState::from).collect(),
            status: WorkflowStatus::Running,
            error: None,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskState> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut TaskState> {
        self.tasks.iter_mut().find(|t| t.id == task_id)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// One entry of the run's completed-outputs list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskOutcome {
    pub task_id: String,
    pub department: String,
    pub status: TaskStatus,
    pub message: String,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub output: DataMap,
}

impl TaskOutcome {
    pub fn from_output(task: &Task, status: TaskStatus, output: DataMap) -> Self {
        let message = output
            .get("message")
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| output.get("error").and_then(Value::as_str).map(String::from))
            .unwrap_or_else(|| format!("Task '{}' finished with status {}", task.description, status));

        let artifacts = output
            .get("artifacts")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.clone()),
                        Value::Null => None,
                        other => Some(other.to_string()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            task_id: task.id.clone(),
            department: task.department.clone(),
            status,
            message,
            artifacts,
            output,
        }
    }

    pub fn failed(task: &Task, error: impl Into<String>) -> Self {
        let error = error.into();
        let mut output = DataMap::new();
        output.insert("error".to_string(), Value::String(error.clone()));
        Self {
            task_id: task.id.clone(),
            department: task.department.clone(),
            status: TaskStatus::Failed,
            message: error,
            artifacts: Vec::new(),
            output,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == TaskStatus::Failed
    }

    /// Output field as a string, when present
    pub fn output_str(&self, key: &str) -> Option<&str> {
        self.output.get(key).and_then(Value::as_str)
    }
}

/// Terminal status of an engine run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failed,
}

/// What the engine returns once it reaches its terminal state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub results: Vec<TaskOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}
