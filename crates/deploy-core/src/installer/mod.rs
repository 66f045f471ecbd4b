//! Per-software installation pipelines.
//!
//! Every installer walks the same four stages: `pre_check`, `install`,
//! `post_config` and `verify`. The executor drives them in that order and
//! stops at the first stage that errors or reports [`StageStatus::Failure`].

mod java;
mod python;
mod zookeeper;

pub use java::JavaInstaller;
pub use python::PythonInstaller;
pub use zookeeper::ZookeeperInstaller;

use crate::backend::{CommandOutput, Inventory, RemoteNode};
use crate::config::SoftwareConfig;
use crate::error::{DeployError, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Failure,
}

/// Outcome of `install`, `post_config` or `verify`.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub status: StageStatus,
    pub message: Option<String>,
    pub details: Map<String, Value>,
}

impl StageReport {
    pub fn success() -> Self {
        Self {
            status: StageStatus::Success,
            message: None,
            details: Map::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Failure,
            message: Some(message.into()),
            details: Map::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Success
    }

    pub fn message_or_default(&self) -> &str {
        self.message.as_deref().unwrap_or("Unknown error")
    }
}

/// Informational output of `pre_check`.
pub type PreCheckReport = Map<String, Value>;

#[async_trait::async_trait]
pub trait Installer: Send + Sync {
    /// Read-only inspection of the node. Never gates the pipeline.
    async fn pre_check(&self) -> Result<PreCheckReport>;

    async fn install(&self) -> Result<StageReport>;

    async fn post_config(&self) -> Result<StageReport>;

    /// Authoritative for marking the task completed.
    async fn verify(&self) -> Result<StageReport>;
}

/// Everything an installer needs for one (node, software) pair.
#[derive(Debug, Clone)]
pub struct InstallContext {
    pub remote: RemoteNode,
    pub software: SoftwareConfig,
    pub playbook_dir: PathBuf,
    pub dry_run: bool,
}

impl InstallContext {
    pub fn node_name(&self) -> &str {
        self.remote.name()
    }

    pub fn install_path(&self) -> String {
        self.software.install_path.display().to_string()
    }

    /// Parent directory of the install path, used for disk probes.
    pub fn install_parent(&self) -> String {
        self.software
            .install_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("/"))
            .display()
            .to_string()
    }

    pub async fn run(&self, command: &str, escalate: bool) -> Result<CommandOutput> {
        self.remote.run(command, escalate).await
    }

    /// Free space under the install path's parent, logged for pre-checks.
    /// Returns `None` when the probe itself fails.
    pub async fn disk_space_ok(&self, min_mb: u64) -> Option<bool> {
        match self.remote.free_space_mb(&self.install_parent(), true).await {
            Ok(mb) => {
                info!(node = %self.node_name(), "Available disk space: {}MB", mb);
                Some(mb >= min_mb)
            }
            Err(e) => {
                warn!(node = %self.node_name(), "Could not check disk space: {}", e);
                None
            }
        }
    }

    pub fn playbook_path(&self, playbook: &str) -> Result<PathBuf> {
        let path = self.playbook_dir.join(playbook);
        if !path.exists() {
            return Err(DeployError::Playbook(format!(
                "Playbook not found: {}",
                path.display()
            )));
        }
        Ok(path)
    }

    /// Run `playbook` against this node and turn the outcome into an
    /// install report.
    pub async fn run_playbook(&self, playbook: &str, vars: Map<String, Value>) -> Result<StageReport> {
        let path = self.playbook_path(playbook)?;
        let inventory = Inventory::for_node(&self.remote.node);

        info!(node = %self.node_name(), "Running playbook: {}", playbook);
        let outcome = self
            .remote
            .backend
            .run_playbook(&path, &inventory, &vars, self.dry_run)
            .await?;

        if outcome.succeeded() {
            Ok(StageReport::success()
                .with_detail("method", "playbook")
                .with_detail("source", self.software.source.to_string())
                .with_detail("playbook", playbook)
                .with_detail("check_mode", self.dry_run))
        } else {
            Ok(StageReport::failure(format!(
                "Playbook execution failed: {} (rc {})",
                playbook, outcome.rc
            ))
            .with_detail("rc", outcome.rc))
        }
    }

    /// Variables shared by every playbook, prefixed per software.
    fn base_vars(&self, prefix: &str) -> Map<String, Value> {
        let mut vars = Map::new();
        vars.insert(format!("{}_version", prefix), self.software.version.clone().into());
        vars.insert(format!("{}_install_path", prefix), self.install_path().into());
        vars.insert(format!("{}_source", prefix), self.software.source.to_string().into());
        vars.insert(
            format!("{}_source_path", prefix),
            self.software.source_path.clone().unwrap_or_default().into(),
        );
        vars
    }
}

pub type InstallerFactory = Arc<dyn Fn(InstallContext) -> Box<dyn Installer> + Send + Sync>;

/// Installer factories keyed by lower-cased software name.
#[derive(Clone, Default)]
pub struct InstallerRegistry {
    factories: BTreeMap<String, InstallerFactory>,
}

impl InstallerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// java, python and zookeeper.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("java", |ctx| Box::new(JavaInstaller::new(ctx)));
        registry.register("python", |ctx| Box::new(PythonInstaller::new(ctx)));
        registry.register("zookeeper", |ctx| Box::new(ZookeeperInstaller::new(ctx)));
        registry
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(InstallContext) -> Box<dyn Installer> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_lowercase(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_lowercase())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Build the installer for `name` (case-insensitive).
    pub fn resolve(&self, name: &str, ctx: InstallContext) -> Result<Box<dyn Installer>> {
        let factory = self
            .factories
            .get(&name.to_lowercase())
            .ok_or_else(|| DeployError::InstallerNotFound {
                name: name.to_string(),
                available: self.names(),
            })?;
        Ok(factory(ctx))
    }
}

impl std::fmt::Debug for InstallerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallerRegistry")
            .field("installers", &self.names())
            .finish()
    }
}
