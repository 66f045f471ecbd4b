use crate::task::TaskStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("SSH connection failed: {0}")]
    Connection(String),

    #[error("Remote command failed: {0}")]
    Command(String),

    #[error("Playbook error: {0}")]
    Playbook(String),

    #[error("Pre-installation checks failed: {failed} errors")]
    ChecksFailed { failed: usize, total: usize },

    #[error("{stage} failed: {message}")]
    Stage { stage: Stage, message: String },

    #[error("No installer found for {name}. Available: {}", available.join(", "))]
    InstallerNotFound { name: String, available: Vec<String> },

    #[error("Software {software} {version} not found in node {node} configuration")]
    SoftwareNotFound {
        node: String,
        software: String,
        version: String,
    },

    #[error("Task not found: {0}")]
    UnknownTask(String),

    #[error("Task {task} cannot go from {from} to {to}")]
    InvalidTransition {
        task: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl DeployError {
    pub fn stage(stage: Stage, message: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            message: message.into(),
        }
    }
}

/// The four installer stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    PreCheck,
    Install,
    PostConfig,
    Verify,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::PreCheck => write!(f, "Pre-check"),
            Stage::Install => write!(f, "Installation"),
            Stage::PostConfig => write!(f, "Post-configuration"),
            Stage::Verify => write!(f, "Verification"),
        }
    }
}

pub type Result<T, E = DeployError> = std::result::Result<T, E>;
