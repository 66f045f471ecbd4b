use crate::error::{DeployError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a task: `{node}_{software}_{version}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(node: &str, software: &str, version: &str) -> Self {
        Self(format!("{}_{}_{}", node, software, version))
    }

    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Skipped,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }

    fn can_become(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Pending, Skipped)
                | (Running, Skipped)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// One (node, software, version) installation unit.
///
/// Fields are private: state only moves through [`Task::start`],
/// [`Task::complete`], [`Task::fail`] and [`Task::skip`], which reject
/// transitions out of a terminal state.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    id: TaskId,
    node_name: String,
    software_name: String,
    software_version: String,
    status: TaskStatus,
    progress: f64,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    error: Option<String>,
}

impl Task {
    pub fn new(node_name: &str, software_name: &str, software_version: &str) -> Self {
        Self {
            id: TaskId::new(node_name, software_name, software_version),
            node_name: node_name.to_string(),
            software_name: software_name.to_string(),
            software_version: software_version.to_string(),
            status: TaskStatus::Pending,
            progress: 0.0,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn software_name(&self) -> &str {
        &self.software_name
    }

    pub fn software_version(&self) -> &str {
        &self.software_version
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Failure text for failed tasks, skip reason for skipped ones.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn advance(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_become(next) {
            return Err(DeployError::InvalidTransition {
                task: self.id.to_string(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.advance(TaskStatus::Running)?;
        self.started_at = Some(Utc::now());
        self.progress = 0.0;
        Ok(())
    }

    pub fn complete(&mut self) -> Result<()> {
        self.advance(TaskStatus::Completed)?;
        self.progress = 100.0;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.advance(TaskStatus::Failed)?;
        self.finished_at = Some(Utc::now());
        self.error = Some(error.into());
        Ok(())
    }

    pub fn skip(&mut self, reason: impl Into<String>) -> Result<()> {
        self.advance(TaskStatus::Skipped)?;
        self.error = Some(reason.into());
        Ok(())
    }

    /// Clamp to [0, 100]. Only `complete()` is meant to reach 100.
    pub fn update_progress(&mut self, progress: f64) {
        self.progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 100.0)
        };
    }

    pub(crate) fn reset(&mut self) {
        self.status = TaskStatus::Pending;
        self.progress = 0.0;
        self.started_at = None;
        self.finished_at = None;
        self.error = None;
    }

    /// Elapsed time: finished − started, or now − started while running.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            (Some(start), None) => Some(Utc::now() - start),
            _ => None,
        }
    }

    /// Structured JSON for reports and dashboards.
    pub fn to_summary_json(&self) -> serde_json::Value {
        serde_json::json!({
            "task_id": self.id.0,
            "node_name": self.node_name,
            "software_name": self.software_name,
            "software_version": self.software_version,
            "status": self.status,
            "progress": self.progress,
            "started_at": self.started_at.map(|t| t.to_rfc3339()),
            "finished_at": self.finished_at.map(|t| t.to_rfc3339()),
            "duration_secs": self.duration().map(|d| d.num_milliseconds() as f64 / 1000.0),
            "error_message": self.error,
        })
    }
}
