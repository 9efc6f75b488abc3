//! Plan loading and ordering checks
//!
//! The engine executes tasks strictly in plan order. Before a plan is run it is
//! checked (or reordered) according to an [`OrderingPolicy`] so that every
//! dependency precedes its dependents.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::types::Plan;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PlanError {
    #[error("Duplicate task id: {0}")]
    DuplicateTaskId(String),

    #[error("Task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: String, dependency: String },

    #[error("Task {task} depends on {dependency}, which is not scheduled before it")]
    DependencyOutOfOrder { task: String, dependency: String },

    #[error("Dependency cycle involving tasks: {0:?}")]
    Cycle(Vec<String>),

    #[error("Invalid plan document: {0}")]
    Parse(String),
}

/// How the engine treats plan order versus dependency order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderingPolicy {
    /// Reject plans whose order does not respect dependencies
    #[default]
    Validate,
    /// Reorder into a stable topological order
    Sort,
    /// Run as given; missing dependency outputs are only warned about
    Trust,
}

impl Plan {
    /// Parse planner output
    pub fn from_json_str(raw: &str) -> Result<Self, PlanError> {
        serde_json::from_str(raw).map_err(|e| PlanError::Parse(e.to_string()))
    }

    /// Read planner output from a JSON file
    pub fn load(path: &Path) -> Result<Self, PlanError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PlanError::Parse(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }

    /// Check that ids are unique and every dependency appears earlier in the plan
    pub fn validate(&self) -> Result<(), PlanError> {
        let index = self.index_by_id()?;

        for (position, task) in self.tasks.iter().enumerate() {
            for dependency in &task.depends_on {
                match index.get(dependency.as_str()) {
                    None => {
                        return Err(PlanError::UnknownDependency {
                            task: task.id.clone(),
                            dependency: dependency.clone(),
                        })
                    }
                    Some(&dep_position) if dep_position >= position => {
                        return Err(PlanError::DependencyOutOfOrder {
                            task: task.id.clone(),
                            dependency: dependency.clone(),
                        })
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(())
    }

    /// Stable topological sort: among ready tasks the one earliest in the plan goes first
    pub fn sorted(&self) -> Result<Plan, PlanError> {
        let index = self.index_by_id()?;
        let mut in_degree = vec![0usize; self.tasks.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.tasks.len()];

        for (position, task) in self.tasks.iter().enumerate() {
            let unique: HashSet<&str> = task.depends_on.iter().map(String::as_str).collect();
            for dependency in unique {
                let dep_position =
                    *index
                        .get(dependency)
                        .ok_or_else(|| PlanError::UnknownDependency {
                            task: task.id.clone(),
                            dependency: dependency.to_string(),
                        })?;
                in_degree[position] += 1;
                dependents[dep_position].push(position);
            }
        }

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(position, _)| position)
            .collect();
        let mut order = Vec::with_capacity(self.tasks.len());

        while let Some(position) = ready.pop_first() {
            order.push(position);
            for &dependent in &dependents[position] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() != self.tasks.len() {
            let stuck = in_degree
                .iter()
                .enumerate()
                .filter(|(_, degree)| **degree > 0)
                .map(|(position, _)| self.tasks[position].id.clone())
                .collect();
            return Err(PlanError::Cycle(stuck));
        }

        Ok(Plan {
            project_name: self.project_name.clone(),
            tasks: order.into_iter().map(|p| self.tasks[p].clone()).collect(),
        })
    }

    /// Apply an ordering policy, returning the plan the engine should run
    pub fn prepare(self, policy: OrderingPolicy) -> Result<Plan, PlanError> {
        match policy {
            OrderingPolicy::Validate => {
                self.validate()?;
                Ok(self)
            }
            OrderingPolicy::Sort => self.sorted(),
            OrderingPolicy::Trust => Ok(self),
        }
    }

    fn index_by_id(&self) -> Result<HashMap<&str, usize>, PlanError> {
        let mut index = HashMap::with_capacity(self.tasks.len());
        for (position, task) in self.tasks.iter().enumerate() {
            if index.insert(task.id.as_str(), position).is_some() {
                return Err(PlanError::DuplicateTaskId(task.id.clone()));
            }
        }
        Ok(index)
    }
}
