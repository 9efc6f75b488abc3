//! Department agents
//!
//! Every department is served by one [`Agent`] implementation registered in an
//! [`AgentRegistry`] at startup. Agents never touch the stores directly: the
//! [`lifecycle`] wrapper owns status transitions and event emission.

pub mod backend;
pub mod bookkeeping;
pub mod bridge;
pub mod data;
pub mod frontend;
pub mod lifecycle;
pub mod research;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;

use crate::knowledge::{KnowledgeError, KnowledgeStore};
use crate::sandbox::{BrowserSandbox, CapabilityClass, CapabilityHandle, ProcessSandbox, SandboxError};
use crate::state::{AgentEvent, EventBus};
use crate::workflow::types::{DataMap, TaskState};
use crate::{FactoryError, Result};

pub use backend::BackendDeveloperAgent;
pub use bookkeeping::BookkeepingAgent;
pub use bridge::BridgeAgent;
pub use data::DataAgent;
pub use frontend::FrontendDeveloperAgent;
pub use lifecycle::{LifecycleWrapper, TaskRun};
pub use research::ResearchAgent;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("{0}")]
    MissingInput(String),
    #[error("{agent} does not support action: '{action}'")]
    Unsupported { agent: String, action: String },
    #[error("{agent} requires a {expected} capability but was given {actual}")]
    CapabilityMismatch {
        agent: String,
        expected: CapabilityClass,
        actual: CapabilityClass,
    },
    #[error("Error executing task in sandbox: {0}")]
    Sandbox(#[from] SandboxError),
    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),
    #[error("{0}")]
    Failed(String),
}

/// Departments known to the factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Department {
    Research,
    Data,
    BackendDevelopment,
    FrontendDevelopment,
    Integration,
    Deployment,
    Bridge,
}

impl Department {
    pub const ALL: [Department; 7] = [
        Department::Research,
        Department::Data,
        Department::BackendDevelopment,
        Department::FrontendDevelopment,
        Department::Integration,
        Department::Deployment,
        Department::Bridge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Research => "Research",
            Department::Data => "Data",
            Department::BackendDevelopment => "BackendDevelopment",
            Department::FrontendDevelopment => "FrontendDevelopment",
            Department::Integration => "Integration",
            Department::Deployment => "Deployment",
            Department::Bridge => "Bridge",
        }
    }

    /// Capability used when neither the task nor its requirements pick one
    pub fn default_capability(&self) -> CapabilityClass {
        match self {
            Department::FrontendDevelopment | Department::Bridge => CapabilityClass::BrowserSandbox,
            _ => CapabilityClass::ProcessSandbox,
        }
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Department {
    type Err = FactoryError;

    /// Case-insensitive; separators are ignored ("backend_development" works)
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        Department::ALL
            .into_iter()
            .find(|d| d.as_str().to_ascii_lowercase() == folded)
            .ok_or_else(|| FactoryError::UnknownDepartment(s.to_string()))
    }
}

/// What an agent sees while it runs
pub struct AgentContext {
    pub workflow_id: String,
    pub task_id: String,
    agent_name: String,
    capability: CapabilityHandle,
    events: EventBus,
}

impl AgentContext {
    pub fn new(
        workflow_id: impl Into<String>,
        task_id: impl Into<String>,
        agent_name: impl Into<String>,
        capability: CapabilityHandle,
        events: EventBus,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            task_id: task_id.into(),
            agent_name: agent_name.into(),
            capability,
            events,
        }
    }

    pub fn capability(&self) -> &CapabilityHandle {
        &self.capability
    }

    pub fn process(&self) -> std::result::Result<&Arc<dyn ProcessSandbox>, AgentError> {
        self.capability.as_process().ok_or_else(|| self.mismatch(CapabilityClass::ProcessSandbox))
    }

    pub fn browser(&self) -> std::result::Result<&Arc<dyn BrowserSandbox>, AgentError> {
        self.capability.as_browser().ok_or_else(|| self.mismatch(CapabilityClass::BrowserSandbox))
    }

    fn mismatch(&self, expected: CapabilityClass) -> AgentError {
        AgentError::CapabilityMismatch {
            agent: self.agent_name.clone(),
            expected,
            actual: self.capability.class(),
        }
    }

    /// Record a progress line as a `task_progress` event
    pub async fn log(&self, message: impl Into<String>) {
        self.log_at("info", message).await;
    }

    pub async fn log_at(&self, level: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("[AGENT] {} ({}): {}", self.agent_name, self.task_id, message);
        let event = AgentEvent::progress(
            self.agent_name.as_str(),
            self.workflow_id.as_str(),
            self.task_id.as_str(),
            level,
            message,
        );
        if let Err(e) = self.events.publish(event).await {
            tracing::warn!("[AGENT] Failed to record progress for {}: {}", self.task_id, e);
        }
    }
}

#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    /// Do the department's work for one task and return its output fields
    async fn run(&self, ctx: &AgentContext, task: &TaskState) -> std::result::Result<DataMap, AgentError>;
}

/// Build an output map from `json!` object literals
pub(crate) fn output(value: serde_json::Value) -> DataMap {
    match value {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        other => {
            let mut out = DataMap::new();
            out.insert("result".to_string(), other);
            out
        }
    }
}

/// Input field as a non-empty string
pub(crate) fn input_str<'a>(task: &'a TaskState, key: &str) -> Option<&'a str> {
    task.input_data
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

/// Static department to agent table
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: HashMap<Department, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One agent per department
    pub fn standard(knowledge: Arc<dyn KnowledgeStore>) -> Self {
        let mut registry = Self::new();
        registry.register(Department::Research, Arc::new(ResearchAgent));
        registry.register(Department::Data, Arc::new(DataAgent::new(knowledge)));
        registry.register(Department::BackendDevelopment, Arc::new(BackendDeveloperAgent));
        registry.register(Department::FrontendDevelopment, Arc::new(FrontendDeveloperAgent));
        registry.register(Department::Bridge, Arc::new(BridgeAgent));
        registry.register(
            Department::Integration,
            Arc::new(BookkeepingAgent::new("IntegrationAgent", "Running integration task")),
        );
        registry.register(
            Department::Deployment,
            Arc::new(BookkeepingAgent::new("DeploymentAgent", "Running deployment task")),
        );
        registry
    }

    pub fn register(&mut self, department: Department, agent: Arc<dyn Agent>) -> &mut Self {
        self.agents.insert(department, agent);
        self
    }

    /// Resolve a department string from a plan
    pub fn resolve(&self, department: &str) -> Result<(Department, Arc<dyn Agent>)> {
        let parsed: Department = department.parse()?;
        self.agents
            .get(&parsed)
            .cloned()
            .map(|agent| (parsed, agent))
            .ok_or_else(|| FactoryError::UnknownDepartment(department.to_string()))
    }
}

impl fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.agents.keys().map(Department::as_str).collect();
        names.sort_unstable();
        f.debug_struct("AgentRegistry").field("departments", &names).finish()
    }
}

/// Payload for events that only carry a message
pub(crate) fn message_payload(message: &str) -> serde_json::Value {
    json!({ "message": message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::InMemoryKnowledgeStore;

    #[test]
    fn test_department_parsing() {
        assert_eq!("Research".parse::<Department>().unwrap(), Department::Research);
        assert_eq!(
            "backend_development".parse::<Department>().unwrap(),
            Department::BackendDevelopment
        );
        assert_eq!(
            "Frontend Development".parse::<Department>().unwrap(),
            Department::FrontendDevelopment
        );
        assert!(matches!(
            "Marketing".parse::<Department>(),
            Err(FactoryError::UnknownDepartment(_))
        ));
    }

    #[test]
    fn test_standard_registry_covers_every_department() {
        let registry = AgentRegistry::standard(Arc::new(InMemoryKnowledgeStore::new()));
        for department in Department::ALL {
            let (resolved, _) = registry.resolve(department.as_str()).unwrap();
            assert_eq!(resolved, department);
        }
        assert!(registry.resolve("Legal").is_err());
    }

    #[test]
    fn test_empty_registry_rejects_known_department() {
        let registry = AgentRegistry::new();
        assert!(matches!(
            registry.resolve("Research"),
            Err(FactoryError::UnknownDepartment(_))
        ));
    }
}
