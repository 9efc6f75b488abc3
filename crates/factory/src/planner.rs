//! Planner interface
//!
//! Turning a free-text command into a plan happens outside this crate; the
//! engine only needs something that hands it a [`Plan`].

use std::path::Path;

use async_trait::async_trait;

use crate::workflow::types::Plan;
use crate::{FactoryError, Result};

#[async_trait]
pub trait Planner: Send + Sync {
    async fn create_plan(&self, command: &str) -> Result<Plan>;
}

/// Returns the same plan for every command
#[derive(Debug, Clone)]
pub struct StaticPlanner {
    plan: Plan,
}

impl StaticPlanner {
    pub fn new(plan: Plan) -> Self {
        Self { plan }
    }

    /// Plan read from planner output saved as JSON
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(Plan::load(path)?))
    }
}

#[async_trait]
impl Planner for StaticPlanner {
    async fn create_plan(&self, command: &str) -> Result<Plan> {
        if self.plan.tasks.is_empty() {
            return Err(FactoryError::Planner(format!(
                "no tasks planned for command: {}",
                command
            )));
        }
        tracing::debug!(
            "Static plan '{}' used for command: {}",
            self.plan.project_name,
            command
        );
        Ok(self.plan.clone())
    }
}
