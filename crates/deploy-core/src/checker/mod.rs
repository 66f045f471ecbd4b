//! Pre-flight checks run against a node before each installation.

mod connectivity;
mod disk_space;
mod memory;
mod package_manager;
mod port;
mod sudo;
mod system_info;

pub use connectivity::ConnectivityChecker;
pub use disk_space::DiskSpaceChecker;
pub use memory::MemoryChecker;
pub use package_manager::PackageManagerChecker;
pub use port::PortAvailabilityChecker;
pub use sudo::SudoPrivilegeChecker;
pub use system_info::SystemInfoChecker;

use crate::backend::RemoteNode;
use crate::config::CheckThresholds;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Warning,
    Failed,
    Skipped,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStatus::Passed => write!(f, "passed"),
            CheckStatus::Warning => write!(f, "warning"),
            CheckStatus::Failed => write!(f, "failed"),
            CheckStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Verdict of a single check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl CheckResult {
    pub fn new(name: impl Into<String>, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
            details: serde_json::Map::new(),
        }
    }

    pub fn passed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Passed, message)
    }

    pub fn warning(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Warning, message)
    }

    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Failed, message)
    }

    pub fn skipped(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Skipped, message)
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// A single pre-flight probe.
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Display name, also used for the synthetic result when `check` errors.
    fn name(&self) -> &str;

    async fn check(&self) -> Result<CheckResult>;
}

/// Aggregate of one `run_all` pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckSummary {
    pub total: usize,
    pub passed: usize,
    pub warnings: usize,
    pub failed: usize,
    pub skipped: usize,
    pub results: Vec<CheckResult>,
}

impl CheckSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    fn record(&mut self, result: CheckResult) {
        match result.status {
            CheckStatus::Passed => self.passed += 1,
            CheckStatus::Warning => self.warnings += 1,
            CheckStatus::Failed => self.failed += 1,
            CheckStatus::Skipped => self.skipped += 1,
        }
        self.results.push(result);
    }
}

/// Runs registered checkers in registration order against one node.
pub struct CheckerManager {
    node_name: String,
    checkers: Vec<Box<dyn Checker>>,
}

impl CheckerManager {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            checkers: Vec::new(),
        }
    }

    /// Connectivity, disk space, memory and system info, in that order.
    pub fn with_defaults(remote: &RemoteNode, thresholds: &CheckThresholds) -> Self {
        let mut manager = Self::new(remote.name());
        manager.add_checker(Box::new(ConnectivityChecker::new(remote.clone())));
        manager.add_checker(Box::new(DiskSpaceChecker::new(
            remote.clone(),
            thresholds.min_disk_mb,
        )));
        manager.add_checker(Box::new(MemoryChecker::new(
            remote.clone(),
            thresholds.min_memory_mb,
        )));
        manager.add_checker(Box::new(SystemInfoChecker::new(remote.clone())));
        manager
    }

    pub fn add_checker(&mut self, checker: Box<dyn Checker>) {
        self.checkers.push(checker);
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }

    /// Run every checker. A checker that errors is recorded as failed and
    /// the remaining checkers still run.
    pub async fn run_all(&self) -> CheckSummary {
        let node = self.node_name.as_str();
        info!(node = %node, "Running {} pre-installation checks", self.checkers.len());

        let mut summary = CheckSummary {
            total: self.checkers.len(),
            ..Default::default()
        };

        for checker in &self.checkers {
            let result = match checker.check().await {
                Ok(result) => result,
                Err(e) => {
                    error!(node = %node, "Error running checker {}: {}", checker.name(), e);
                    CheckResult::failed(checker.name(), format!("Check failed with error: {}", e))
                }
            };

            match result.status {
                CheckStatus::Passed => info!(node = %node, "✓ {}: {}", result.name, result.message),
                CheckStatus::Warning => warn!(node = %node, "⚠ {}: {}", result.name, result.message),
                CheckStatus::Failed => error!(node = %node, "✗ {}: {}", result.name, result.message),
                CheckStatus::Skipped => debug!(node = %node, "- {}: {}", result.name, result.message),
            }
            summary.record(result);
        }

        info!(
            node = %node,
            "Checks completed: {} passed, {} warnings, {} failed, {} skipped",
            summary.passed,
            summary.warnings,
            summary.failed,
            summary.skipped
        );
        summary
    }
}
