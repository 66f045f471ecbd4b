use crate::config::NodeConfig;
use crate::error::{DeployError, Result};
use crate::task::{Task, TaskId, TaskStatus};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// Counts of tasks per status.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct TaskStatistics {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl TaskStatistics {
    pub fn count(&self, status: TaskStatus) -> usize {
        match status {
            TaskStatus::Pending => self.pending,
            TaskStatus::Running => self.running,
            TaskStatus::Completed => self.completed,
            TaskStatus::Failed => self.failed,
            TaskStatus::Skipped => self.skipped,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Owns every task of a run.
///
/// Tasks live in an arena; the id and node indexes are fixed once
/// [`TaskRegistry::create_tasks`] returns, so workers only take the arena
/// lock for the duration of a single transition.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: RwLock<Vec<Task>>,
    by_id: HashMap<TaskId, usize>,
    by_node: HashMap<String, Vec<usize>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: &[NodeConfig]) -> Self {
        let mut registry = Self::new();
        registry.create_tasks(nodes);
        registry
    }

    /// One pending task per software entry per node, in declared order.
    /// Replaces anything created before.
    pub fn create_tasks(&mut self, nodes: &[NodeConfig]) {
        let tasks = self.tasks.get_mut();
        tasks.clear();
        self.by_id.clear();
        self.by_node.clear();

        for node in nodes {
            let slots = self.by_node.entry(node.name.clone()).or_default();
            for software in &node.install {
                let task = Task::new(&node.name, &software.name, &software.version);
                if self.by_id.contains_key(task.id()) {
                    warn!("Duplicate task {} ignored", task.id());
                    continue;
                }
                let slot = tasks.len();
                self.by_id.insert(task.id().clone(), slot);
                slots.push(slot);
                tasks.push(task);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn get_task(&self, id: &TaskId) -> Option<Task> {
        let slot = *self.by_id.get(id)?;
        self.tasks.read().get(slot).cloned()
    }

    pub fn get_all_tasks(&self) -> Vec<Task> {
        self.tasks.read().clone()
    }

    /// Ordered snapshots of a node's tasks; empty for an unknown node.
    pub fn get_node_tasks(&self, node_name: &str) -> Vec<Task> {
        let Some(slots) = self.by_node.get(node_name) else {
            return Vec::new();
        };
        let tasks = self.tasks.read();
        slots.iter().filter_map(|&s| tasks.get(s).cloned()).collect()
    }

    pub fn node_task_ids(&self, node_name: &str) -> Vec<TaskId> {
        self.get_node_tasks(node_name)
            .into_iter()
            .map(|t| t.id().clone())
            .collect()
    }

    /// Apply one state transition under the write lock and return the
    /// task as it looks afterwards.
    pub fn transition<F>(&self, id: &TaskId, f: F) -> Result<Task>
    where
        F: FnOnce(&mut Task) -> Result<()>,
    {
        let slot = *self
            .by_id
            .get(id)
            .ok_or_else(|| DeployError::UnknownTask(id.to_string()))?;
        let mut tasks = self.tasks.write();
        let task = tasks
            .get_mut(slot)
            .ok_or_else(|| DeployError::UnknownTask(id.to_string()))?;
        f(task)?;
        Ok(task.clone())
    }

    pub fn update_progress(&self, id: &TaskId, progress: f64) -> Result<()> {
        self.transition(id, |task| {
            task.update_progress(progress);
            Ok(())
        })
        .map(|_| ())
    }

    pub fn get_statistics(&self) -> TaskStatistics {
        let tasks = self.tasks.read();
        let mut stats = TaskStatistics {
            total: tasks.len(),
            ..Default::default()
        };
        for task in tasks.iter() {
            match task.status() {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Skipped => stats.skipped += 1,
            }
        }
        stats
    }

    /// Mean progress over all tasks, 0 when there are none.
    pub fn get_progress(&self) -> f64 {
        let tasks = self.tasks.read();
        if tasks.is_empty() {
            return 0.0;
        }
        tasks.iter().map(Task::progress).sum::<f64>() / tasks.len() as f64
    }

    /// Return every task to pending. Must not race with running workers.
    pub fn reset(&self) {
        for task in self.tasks.write().iter_mut() {
            task.reset();
        }
    }
}
