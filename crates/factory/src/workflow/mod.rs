//! Plans, workflow documents and the engine that executes them

pub mod engine;
pub mod locks;
pub mod plan;
pub mod types;

pub use engine::{Engine, ORCHESTRATOR};
pub use locks::{WorkflowLockGuard, WorkflowLocks};
pub use plan::{OrderingPolicy, PlanError};
pub use types::{
    DataMap, ExecutionOutcome, ExecutionStatus, Plan, Task, TaskOutcome, TaskState, TaskStatus,
    WorkflowState, WorkflowStatus,
};
