//! # Factory - dependency-aware task orchestration
//!
//! Executes a plan of department tasks in order, routing each task to the
//! agent for its department and to a process or browser sandbox. Workflow and
//! task state is kept in a [`state::WorkflowStore`]; every step is recorded in
//! an append-only event log.

pub mod agents;
pub mod config;
pub mod knowledge;
pub mod planner;
pub mod sandbox;
pub mod state;
pub mod workflow;

#[cfg(test)]
mod test_utils;

pub use agents::{Agent, AgentContext, AgentError, AgentRegistry, Department, LifecycleWrapper};
pub use config::{ConfigError, FactoryConfig};
pub use knowledge::{InMemoryKnowledgeStore, KnowledgeStore};
pub use planner::{Planner, StaticPlanner};
pub use sandbox::{
    choose_capability, Capabilities, CapabilityClass, CapabilityHandle, Requirements, SandboxError,
};
pub use state::{
    AgentEvent, EventBus, EventStore, EventType, InMemoryEventStore, InMemoryWorkflowStore,
    SqliteEventStore, SqliteWorkflowStore, StoreError, WorkflowStore,
};
pub use workflow::{
    Engine, ExecutionOutcome, ExecutionStatus, OrderingPolicy, Plan, PlanError, Task, TaskOutcome,
    TaskState, TaskStatus, WorkflowState, WorkflowStatus,
};

use thiserror::Error;

fn task_suffix(task_id: &Option<String>) -> String {
    task_id
        .as_ref()
        .map(|id| format!(", task {}", id))
        .unwrap_or_default()
}

/// Error types for the factory
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid plan: {0}")]
    Plan(#[from] PlanError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Unknown department: {0}")]
    UnknownDepartment(String),

    #[error("Unknown sandbox type: {0}")]
    UnknownSandbox(String),

    #[error("Not found: workflow {workflow_id}{}", task_suffix(.task_id))]
    NotFound {
        workflow_id: String,
        task_id: Option<String>,
    },

    #[error("Workflow {0} is already running")]
    WorkflowBusy(String),

    #[error("Planner error: {0}")]
    Planner(String),
}

pub type Result<T> = std::result::Result<T, FactoryError>;

/// Stores and engine wired from configuration
pub struct Factory {
    pub config: FactoryConfig,
    pub engine: Engine,
    pub store: std::sync::Arc<dyn WorkflowStore>,
    pub events: EventBus,
    pub knowledge: std::sync::Arc<dyn KnowledgeStore>,
}

impl Factory {
    /// Open the SQLite database from `config.database_url` and build the
    /// standard agent registry
    pub async fn open(config: FactoryConfig) -> Result<Self> {
        use std::sync::Arc;

        let pool = state::sqlite::connect(&config.database_url).await?;
        let store: Arc<dyn WorkflowStore> = Arc::new(SqliteWorkflowStore::new(pool.clone()));
        let events = EventBus::new(
            Arc::new(SqliteEventStore::new(pool)),
            config.event_channel_capacity,
        );
        let knowledge: Arc<dyn KnowledgeStore> = Arc::new(InMemoryKnowledgeStore::new());

        let engine = Engine::new(
            store.clone(),
            events.clone(),
            AgentRegistry::standard(knowledge.clone()),
            Capabilities::from_config(&config),
        )
        .with_ordering(config.ordering);

        tracing::info!("Factory ready (database {})", config.database_url);
        Ok(Self {
            config,
            engine,
            store,
            events,
            knowledge,
        })
    }
}
