//! Task orchestration engine - executes a plan task by task
//!
//! A plain loop over [`EngineState`]: pick the next task, run it through the
//! lifecycle wrapper, and either continue or halt on the first failure. Tasks
//! run strictly in plan order and never concurrently within one workflow.

use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::agents::{AgentRegistry, Department, LifecycleWrapper};
use crate::planner::Planner;
use crate::sandbox::{choose_capability, Capabilities, CapabilityClass, Requirements};
use crate::state::{AgentEvent, EventBus, EventType, WorkflowStore};
use crate::{FactoryError, Result};

use super::locks::WorkflowLocks;
use super::plan::OrderingPolicy;
use super::types::{
    DataMap, ExecutionOutcome, ExecutionStatus, Plan, Task, TaskOutcome, TaskStatus, WorkflowState,
    WorkflowStatus,
};

/// Source name used for engine-level events
pub const ORCHESTRATOR: &str = "Orchestrator";

#[derive(Debug)]
enum EngineState {
    GetNextTask,
    ExecuteTask(usize),
    HandleError(String),
    Terminal(ExecutionStatus),
}

#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn WorkflowStore>,
    events: EventBus,
    registry: AgentRegistry,
    capabilities: Capabilities,
    wrapper: LifecycleWrapper,
    ordering: OrderingPolicy,
    locks: WorkflowLocks,
}

impl Engine {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        events: EventBus,
        registry: AgentRegistry,
        capabilities: Capabilities,
    ) -> Self {
        let wrapper = LifecycleWrapper::new(store.clone(), events.clone());
        Self {
            store,
            events,
            registry,
            capabilities,
            wrapper,
            ordering: OrderingPolicy::default(),
            locks: WorkflowLocks::new(),
        }
    }

    pub fn with_ordering(mut self, ordering: OrderingPolicy) -> Self {
        self.ordering = ordering;
        self
    }

    /// Share a lock table with other engines in this process
    pub fn with_locks(mut self, locks: WorkflowLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Ask `planner` for a plan and execute it
    pub async fn execute_command(&self, planner: &dyn Planner, command: &str) -> Result<ExecutionOutcome> {
        let plan = planner.create_plan(command).await?;
        self.execute_plan(plan).await
    }

    /// Execute a plan under a fresh workflow id
    pub async fn execute_plan(&self, plan: Plan) -> Result<ExecutionOutcome> {
        self.execute_plan_with_id(Uuid::new_v4().to_string(), plan).await
    }

    /// Execute a plan under a caller-chosen workflow id.
    ///
    /// Plan ordering errors are returned before any document is written. Store
    /// failures abort the run and are returned as `Err`; everything else ends
    /// up in the outcome.
    pub async fn execute_plan_with_id(
        &self,
        workflow_id: impl Into<String>,
        plan: Plan,
    ) -> Result<ExecutionOutcome> {
        let workflow_id = workflow_id.into();
        let plan = plan.prepare(self.ordering)?;

        let _guard = self
            .locks
            .try_acquire(&workflow_id)
            .ok_or_else(|| FactoryError::WorkflowBusy(workflow_id.clone()))?;

        self.store
            .create(WorkflowState::from_plan(workflow_id.as_str(), &plan))
            .await?;

        tracing::info!(
            "[ENGINE] Starting workflow {} for project '{}' ({} tasks)",
            workflow_id,
            plan.project_name,
            plan.tasks.len()
        );

        match self.run(&workflow_id, &plan).await {
            Ok(outcome) => {
                self.finish(&outcome).await?;
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!("[ENGINE] Workflow {} aborted: {}", workflow_id, e);
                if let Err(mark_err) = self
                    .store
                    .set_workflow_status(&workflow_id, WorkflowStatus::Failed, Some(e.to_string()))
                    .await
                {
                    tracing::error!(
                        "[ENGINE] Could not mark workflow {} as failed: {}",
                        workflow_id,
                        mark_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn run(&self, workflow_id: &str, plan: &Plan) -> Result<ExecutionOutcome> {
        let mut cursor = 0;
        let mut results: Vec<TaskOutcome> = Vec::with_capacity(plan.tasks.len());
        let mut last_error = None;
        let mut state = EngineState::GetNextTask;

        let status = loop {
            state = match state {
                EngineState::GetNextTask => {
                    if cursor < plan.tasks.len() {
                        cursor += 1;
                        EngineState::ExecuteTask(cursor - 1)
                    } else {
                        EngineState::Terminal(ExecutionStatus::Success)
                    }
                }
                EngineState::ExecuteTask(index) => {
                    let outcome = self.execute_task(workflow_id, &plan.tasks[index], &results).await?;
                    let next = if outcome.is_failed() {
                        EngineState::HandleError(outcome.message.clone())
                    } else {
                        EngineState::GetNextTask
                    };
                    results.push(outcome);
                    next
                }
                EngineState::HandleError(message) => {
                    tracing::error!("[ENGINE] Workflow {} halted: {}", workflow_id, message);
                    last_error = Some(message);
                    EngineState::Terminal(ExecutionStatus::Failed)
                }
                EngineState::Terminal(status) => break status,
            };
        };

        Ok(ExecutionOutcome {
            workflow_id: workflow_id.to_string(),
            status,
            results,
            error: last_error,
        })
    }

    async fn finish(&self, outcome: &ExecutionOutcome) -> Result<()> {
        let (status, event_type, payload) = match outcome.status {
            ExecutionStatus::Success => (
                WorkflowStatus::Completed,
                EventType::WorkflowCompleted,
                json!({ "tasks": outcome.results.len() }),
            ),
            ExecutionStatus::Failed => (
                WorkflowStatus::Failed,
                EventType::WorkflowFailed,
                json!({ "error": outcome.error }),
            ),
        };

        self.store
            .set_workflow_status(&outcome.workflow_id, status, outcome.error.clone())
            .await?;
        self.events
            .publish(AgentEvent::new(
                event_type,
                ORCHESTRATOR,
                outcome.workflow_id.as_str(),
                None,
                payload,
            ))
            .await?;

        tracing::info!("[ENGINE] Workflow {} finished: {}", outcome.workflow_id, status);
        Ok(())
    }

    async fn execute_task(
        &self,
        workflow_id: &str,
        task: &Task,
        completed: &[TaskOutcome],
    ) -> Result<TaskOutcome> {
        tracing::info!(
            "[ENGINE] Executing task {} ({}): {}",
            task.id,
            task.department,
            task.description
        );

        let input = self.resolve_dependencies(workflow_id, task, completed).await?;
        if input != task.input_data {
            self.store
                .set_task_input(workflow_id, &task.id, input.clone())
                .await?;
        }

        let (department, agent) = match self.registry.resolve(&task.department) {
            Ok(found) => found,
            Err(e) => return self.reject(workflow_id, task, e).await,
        };

        let class = match resolve_capability(task, department, &input) {
            Ok(class) => class,
            Err(e) => return self.reject(workflow_id, task, e).await,
        };
        tracing::debug!("[ENGINE] Task {} routed to {} on {}", task.id, agent.name(), class);

        match self
            .wrapper
            .execute_task(workflow_id, &task.id, agent, self.capabilities.handle(class))
            .await
        {
            Ok(run) => Ok(TaskOutcome::from_output(task, run.status, run.output)),
            Err(e @ FactoryError::NotFound { .. }) => {
                tracing::error!("[ENGINE] Task {} could not be loaded: {}", task.id, e);
                Ok(TaskOutcome::failed(task, e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Inject outputs of completed dependencies into the task's input.
    /// Missing dependencies are reported and skipped.
    async fn resolve_dependencies(
        &self,
        workflow_id: &str,
        task: &Task,
        completed: &[TaskOutcome],
    ) -> Result<DataMap> {
        let mut input = task.input_data.clone();

        for dependency_id in &task.depends_on {
            let Some(dependency) = completed
                .iter()
                .find(|o| &o.task_id == dependency_id && !o.is_failed())
            else {
                let message = format!(
                    "Dependency {} of task {} has no completed result; continuing without it",
                    dependency_id, task.id
                );
                tracing::warn!("[ENGINE] {}", message);
                self.events
                    .publish(AgentEvent::progress(
                        ORCHESTRATOR,
                        workflow_id,
                        task.id.as_str(),
                        "warning",
                        message,
                    ))
                    .await?;
                continue;
            };

            inject_outputs(&mut input, dependency);
        }

        Ok(input)
    }

    /// Configuration failure for one task: record it and report a failed outcome
    async fn reject(&self, workflow_id: &str, task: &Task, error: FactoryError) -> Result<TaskOutcome> {
        let message = error.to_string();
        tracing::error!("[ENGINE] Task {} rejected: {}", task.id, message);

        let mut output = DataMap::new();
        output.insert("error".to_string(), Value::String(message.clone()));
        self.store
            .update_task_status(workflow_id, &task.id, TaskStatus::Failed, Some(output))
            .await?;
        self.events
            .publish(AgentEvent::new(
                EventType::TaskProgress,
                ORCHESTRATOR,
                workflow_id,
                Some(task.id.clone()),
                json!({ "level": "error", "error": message }),
            ))
            .await?;

        Ok(TaskOutcome::failed(task, message))
    }
}

/// Typed slots filled from one dependency's result; later calls overwrite
fn inject_outputs(input: &mut DataMap, dependency: &TaskOutcome) {
    if let Some(url) = dependency.output_str("url") {
        match dependency.department.parse::<Department>() {
            Ok(Department::FrontendDevelopment) => {
                input.insert("frontend_url".to_string(), json!(url));
            }
            Ok(Department::BackendDevelopment) => {
                input.insert("backend_url".to_string(), json!(url));
            }
            _ => {}
        }
    }
    if let Some(first) = dependency.artifacts.first() {
        input.insert("content".to_string(), json!(first));
    }
}

/// Explicit sandbox hint, else the selection policy when the task states a
/// language, else the department default
fn resolve_capability(task: &Task, department: Department, input: &DataMap) -> Result<CapabilityClass> {
    if let Some(raw) = &task.sandbox_type {
        return raw
            .parse()
            .map_err(|_| FactoryError::UnknownSandbox(raw.clone()));
    }
    if let Some(requirements) = Requirements::from_input(input) {
        return Ok(choose_capability(&requirements));
    }
    Ok(department.default_capability())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(department: &str, output: Value) -> TaskOutcome {
        let task = Task::new(department, "dep").with_id("dep");
        let map: DataMap = serde_json::from_value(output).unwrap();
        TaskOutcome::from_output(&task, TaskStatus::Completed, map)
    }

    #[test]
    fn test_inject_typed_slots() {
        let mut input = DataMap::new();
        inject_outputs(
            &mut input,
            &outcome("FrontendDevelopment", json!({"url": "http://ui", "artifacts": ["http://ui"]})),
        );
        inject_outputs(
            &mut input,
            &outcome("BackendDevelopment", json!({"url": "http://api", "artifacts": []})),
        );

        assert_eq!(input.get("frontend_url"), Some(&json!("http://ui")));
        assert_eq!(input.get("backend_url"), Some(&json!("http://api")));
        assert_eq!(input.get("content"), Some(&json!("http://ui")));
    }

    #[test]
    fn test_later_dependency_overwrites_content() {
        let mut input = DataMap::new();
        inject_outputs(&mut input, &outcome("Research", json!({"artifacts": ["first"]})));
        inject_outputs(&mut input, &outcome("Research", json!({"artifacts": ["second"]})));
        assert_eq!(input.get("content"), Some(&json!("second")));
    }

    #[test]
    fn test_url_from_other_departments_is_ignored() {
        let mut input = DataMap::new();
        inject_outputs(&mut input, &outcome("Research", json!({"url": "http://x"})));
        assert!(input.is_empty());
    }

    #[test]
    fn test_capability_resolution_order() {
        let mut input = DataMap::new();
        let plain = Task::new("BackendDevelopment", "x");
        assert_eq!(
            resolve_capability(&plain, Department::BackendDevelopment, &input).unwrap(),
            CapabilityClass::ProcessSandbox
        );
        assert_eq!(
            resolve_capability(&plain, Department::FrontendDevelopment, &input).unwrap(),
            CapabilityClass::BrowserSandbox
        );

        input.insert("language".into(), json!("node"));
        assert_eq!(
            resolve_capability(&plain, Department::BackendDevelopment, &input).unwrap(),
            CapabilityClass::BrowserSandbox
        );

        let hinted = Task::new("BackendDevelopment", "x").with_sandbox("e2b");
        assert_eq!(
            resolve_capability(&hinted, Department::BackendDevelopment, &input).unwrap(),
            CapabilityClass::ProcessSandbox
        );

        let bogus = Task::new("BackendDevelopment", "x").with_sandbox("docker");
        assert!(matches!(
            resolve_capability(&bogus, Department::BackendDevelopment, &input),
            Err(FactoryError::UnknownSandbox(_))
        ));
    }
}
