//! In-process advisory locks keyed by workflow id

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Default, Debug)]
pub struct WorkflowLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl WorkflowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take the lock for `workflow_id`, or `None` if it is already held
    pub fn try_acquire(&self, workflow_id: &str) -> Option<WorkflowLockGuard> {
        if !self.held().insert(workflow_id.to_string()) {
            return None;
        }
        Some(WorkflowLockGuard {
            locks: self.clone(),
            workflow_id: workflow_id.to_string(),
        })
    }

    pub fn is_held(&self, workflow_id: &str) -> bool {
        self.held().contains(workflow_id)
    }
}

/// Releases the workflow lock on drop
#[derive(Debug)]
pub struct WorkflowLockGuard {
    locks: WorkflowLocks,
    workflow_id: String,
}

impl Drop for WorkflowLockGuard {
    fn drop(&mut self) {
        self.locks.held().remove(&self.workflow_id);
    }
}
