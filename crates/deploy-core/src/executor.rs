//! Concurrent, pausable deployment across nodes.
//!
//! One worker per node, bounded by a semaphore. Inside a worker the node's
//! tasks run strictly in order and the first failing task ends the node.
//! Pause is observed between tasks; stop is cooperative and turns every task
//! not yet started into `skipped`.

use crate::backend::{RemoteBackend, RemoteNode};
use crate::checker::CheckerManager;
use crate::config::{CheckThresholds, Config, NodeConfig};
use crate::error::{DeployError, Result, Stage};
use crate::events::{Callbacks, Event, EventKind};
use crate::installer::{InstallContext, InstallerRegistry, StageReport};
use crate::registry::{TaskStatistics, TaskRegistry};
use crate::task::{Task, TaskId};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Reason recorded on tasks skipped after `stop()`.
pub const STOPPED_REASON: &str = "Deployment stopped by user";

const PROGRESS_CHECKED: f64 = 25.0;
const PROGRESS_INSTALLED: f64 = 60.0;
const PROGRESS_CONFIGURED: f64 = 80.0;

/// Builds the checker set run before every task on a node.
pub type CheckerFactory = Arc<dyn Fn(&RemoteNode, &CheckThresholds) -> CheckerManager + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub max_concurrent_nodes: usize,
    pub thresholds: CheckThresholds,
    pub playbook_dir: PathBuf,
    /// Run playbooks in check mode.
    pub dry_run: bool,
}

impl ExecutorSettings {
    pub fn from_config(config: &Config, dry_run: bool) -> Self {
        Self {
            max_concurrent_nodes: config.general.max_concurrent_nodes,
            thresholds: config.checks,
            playbook_dir: config.general.playbook_dir.clone(),
            dry_run,
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_nodes: 5,
            thresholds: CheckThresholds::default(),
            playbook_dir: PathBuf::from("./playbook"),
            dry_run: false,
        }
    }
}

pub struct ExecutorBuilder {
    nodes: Vec<Arc<NodeConfig>>,
    registry: Arc<TaskRegistry>,
    backend: Arc<dyn RemoteBackend>,
    settings: ExecutorSettings,
    installers: InstallerRegistry,
    checkers: CheckerFactory,
}

impl ExecutorBuilder {
    pub fn settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn installers(mut self, installers: InstallerRegistry) -> Self {
        self.installers = installers;
        self
    }

    pub fn checkers<F>(mut self, factory: F) -> Self
    where
        F: Fn(&RemoteNode, &CheckThresholds) -> CheckerManager + Send + Sync + 'static,
    {
        self.checkers = Arc::new(factory);
        self
    }

    pub fn build(self) -> DeploymentExecutor {
        let permits = self.settings.max_concurrent_nodes.max(1);
        let (paused, _) = watch::channel(false);
        DeploymentExecutor {
            shared: Arc::new(Shared {
                nodes: self.nodes,
                registry: self.registry,
                backend: self.backend,
                installers: self.installers,
                checkers: self.checkers,
                settings: self.settings,
                permits: Semaphore::new(permits),
                cancel: CancellationToken::new(),
                paused,
                callbacks: Callbacks::new(),
                active: AtomicUsize::new(0),
            }),
            workers: Mutex::new(Vec::new()),
        }
    }
}

struct Shared {
    nodes: Vec<Arc<NodeConfig>>,
    registry: Arc<TaskRegistry>,
    backend: Arc<dyn RemoteBackend>,
    installers: InstallerRegistry,
    checkers: CheckerFactory,
    settings: ExecutorSettings,
    permits: Semaphore,
    cancel: CancellationToken,
    paused: watch::Sender<bool>,
    callbacks: Callbacks,
    active: AtomicUsize,
}

/// Decrements the live worker count even if the worker panics.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Shared {
    fn pause(&self) {
        info!("Pausing deployment");
        self.paused.send_replace(true);
        self.callbacks.fire(&Event::Pause);
    }

    fn resume(&self) {
        info!("Resuming deployment");
        self.paused.send_replace(false);
        self.callbacks.fire(&Event::Resume);
    }

    fn stop(&self) {
        info!("Stopping deployment");
        self.cancel.cancel();
        self.paused.send_replace(false);
        self.callbacks.fire(&Event::Stop);
    }

    fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Block while paused. Returns early once stopped.
    async fn wait_if_paused(&self) {
        let mut rx = self.paused.subscribe();
        let mut logged = false;
        loop {
            let paused = *rx.borrow_and_update();
            if !paused || self.cancel.is_cancelled() {
                return;
            }
            if !logged {
                info!("Execution paused, waiting for resume...");
                logged = true;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }

    async fn execute_node(&self, node: Arc<NodeConfig>) {
        let Ok(_permit) = self.permits.acquire().await else {
            error!(node = %node.name, "Worker pool closed before node could start");
            return;
        };

        info!(node = %node.name, "Starting deployment on node");
        let remote = RemoteNode::new(node.clone(), self.backend.clone());

        for id in self.registry.node_task_ids(&node.name) {
            self.wait_if_paused().await;

            if self.is_stopped() {
                info!(node = %node.name, "Deployment stopped, skipping task {}", id);
                match self.registry.transition(&id, |task| task.skip(STOPPED_REASON)) {
                    Ok(task) => self.callbacks.fire(&Event::TaskSkip(task)),
                    Err(e) => warn!(node = %node.name, "Could not skip task {}: {}", id, e),
                }
                continue;
            }

            if !self.run_task(&remote, &id).await {
                warn!(node = %node.name, "Task {} failed, not continuing on this node", id);
                break;
            }
        }

        info!(node = %node.name, "Completed deployment on node");
    }

    /// Drive one task to a terminal state. Returns whether it completed.
    async fn run_task(&self, remote: &RemoteNode, id: &TaskId) -> bool {
        let task = match self.registry.transition(id, Task::start) {
            Ok(task) => task,
            Err(e) => {
                error!(node = %remote.name(), "Could not start task {}: {}", id, e);
                return false;
            }
        };
        info!(
            node = %remote.name(),
            "Starting task: {} {}", task.software_name(), task.software_version()
        );
        self.callbacks.fire(&Event::TaskStart(task.clone()));

        let outcome = match self.run_pipeline(remote, &task).await {
            Ok(()) => self.registry.transition(id, Task::complete),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(done) => {
                info!(node = %remote.name(), "Task completed successfully: {}", id);
                self.callbacks.fire(&Event::TaskComplete(done));
                true
            }
            Err(e) => {
                let message = match e {
                    DeployError::ChecksFailed { .. } | DeployError::Stage { .. } => e.to_string(),
                    other => format!("Unexpected error: {}", other),
                };
                self.fail_task(remote.name(), id, message);
                false
            }
        }
    }

    fn fail_task(&self, node: &str, id: &TaskId, message: String) {
        error!(node = %node, "Task {} failed: {}", id, message);
        match self.registry.transition(id, |task| task.fail(message.clone())) {
            Ok(task) => self.callbacks.fire(&Event::TaskFail(task, message)),
            Err(e) => error!(node = %node, "Could not mark task {} failed: {}", id, e),
        }
    }

    async fn run_pipeline(&self, remote: &RemoteNode, task: &Task) -> Result<()> {
        let id = task.id();

        let summary = (self.checkers)(remote, &self.settings.thresholds)
            .run_all()
            .await;
        if summary.has_failures() {
            return Err(DeployError::ChecksFailed {
                failed: summary.failed,
                total: summary.total,
            });
        }
        self.registry.update_progress(id, PROGRESS_CHECKED)?;

        let software = remote
            .node
            .software(task.software_name(), task.software_version())
            .cloned()
            .ok_or_else(|| DeployError::SoftwareNotFound {
                node: remote.name().to_string(),
                software: task.software_name().to_string(),
                version: task.software_version().to_string(),
            })?;
        let ctx = InstallContext {
            remote: remote.clone(),
            software,
            playbook_dir: self.settings.playbook_dir.clone(),
            dry_run: self.settings.dry_run,
        };
        let installer = self.installers.resolve(task.software_name(), ctx)?;

        match installer.pre_check().await {
            Ok(report) => debug!(
                node = %remote.name(),
                "Pre-check results: {}",
                serde_json::Value::Object(report)
            ),
            Err(e) => warn!(node = %remote.name(), "{} failed: {}", Stage::PreCheck, e),
        }

        expect_success(Stage::Install, installer.install().await)?;
        self.registry.update_progress(id, PROGRESS_INSTALLED)?;

        expect_success(Stage::PostConfig, installer.post_config().await)?;
        self.registry.update_progress(id, PROGRESS_CONFIGURED)?;

        expect_success(Stage::Verify, installer.verify().await)?;
        Ok(())
    }
}

fn expect_success(stage: Stage, report: Result<StageReport>) -> Result<()> {
    match report {
        Ok(report) if report.is_success() => Ok(()),
        Ok(report) => Err(DeployError::stage(stage, report.message_or_default())),
        Err(e) => Err(DeployError::stage(stage, e.to_string())),
    }
}

/// Cloneable handle for pausing, resuming and stopping a run from another
/// task or thread.
#[derive(Clone)]
pub struct ExecutorControl {
    shared: Arc<Shared>,
}

impl ExecutorControl {
    pub fn pause(&self) {
        self.shared.pause();
    }

    pub fn resume(&self) {
        self.shared.resume();
    }

    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn is_paused(&self) -> bool {
        self.shared.is_paused()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }
}

pub struct DeploymentExecutor {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DeploymentExecutor {
    /// Start building an executor with the default installers and checkers.
    pub fn builder(
        nodes: Vec<NodeConfig>,
        registry: Arc<TaskRegistry>,
        backend: Arc<dyn RemoteBackend>,
    ) -> ExecutorBuilder {
        ExecutorBuilder {
            nodes: nodes.into_iter().map(Arc::new).collect(),
            registry,
            backend,
            settings: ExecutorSettings::default(),
            installers: InstallerRegistry::with_defaults(),
            checkers: Arc::new(CheckerManager::with_defaults),
        }
    }

    /// Tasks for every configured node plus an executor over them.
    pub fn from_config(config: &Config, backend: Arc<dyn RemoteBackend>, dry_run: bool) -> Self {
        let registry = Arc::new(TaskRegistry::from_nodes(&config.nodes));
        Self::builder(config.nodes.clone(), registry, backend)
            .settings(ExecutorSettings::from_config(config, dry_run))
            .build()
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.shared.registry
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.shared.settings
    }

    pub fn control(&self) -> ExecutorControl {
        ExecutorControl {
            shared: self.shared.clone(),
        }
    }

    pub fn register_callback<F>(&self, event: EventKind, callback: F)
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.callbacks.register(event, callback);
    }

    /// Spawn one worker per node in configuration order and return the
    /// names submitted. Must be called inside a tokio runtime.
    pub fn execute_all(&self) -> Vec<String> {
        info!(
            "Starting deployment to {} nodes (max concurrent: {})",
            self.shared.nodes.len(),
            self.shared.settings.max_concurrent_nodes
        );

        let mut submitted = Vec::new();
        let mut workers = self.workers.lock();
        for node in &self.shared.nodes {
            if self.shared.is_stopped() {
                info!("Deployment stopped, not submitting remaining nodes");
                break;
            }
            let shared = self.shared.clone();
            let node = node.clone();
            submitted.push(node.name.clone());

            shared.active.fetch_add(1, Ordering::SeqCst);
            workers.push(tokio::spawn(async move {
                let _guard = ActiveGuard(&shared.active);
                shared.execute_node(node).await;
            }));
        }
        submitted
    }

    /// Run a single node's tasks on the current task.
    pub async fn execute_node(&self, node_name: &str) -> Result<()> {
        let node = self
            .shared
            .nodes
            .iter()
            .find(|n| n.name == node_name)
            .cloned()
            .ok_or_else(|| DeployError::Config(format!("Unknown node: {}", node_name)))?;

        self.shared.active.fetch_add(1, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.shared.active);
        self.shared.execute_node(node).await;
        Ok(())
    }

    /// Wait for every submitted worker. Returns `false` if the timeout
    /// elapsed first; unfinished workers keep running and can be waited on
    /// again.
    pub async fn wait_completion(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        let mut handles = std::mem::take(&mut *self.workers.lock()).into_iter();

        while let Some(mut handle) = handles.next() {
            let joined = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, &mut handle).await,
                None => Ok((&mut handle).await),
            };
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Node worker ended abnormally: {}", e),
                Err(_) => {
                    warn!("Timed out waiting for node workers");
                    let mut workers = self.workers.lock();
                    workers.push(handle);
                    workers.extend(handles);
                    return false;
                }
            }
        }
        true
    }

    pub fn pause(&self) {
        self.shared.pause();
    }

    pub fn resume(&self) {
        self.shared.resume();
    }

    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn is_running(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst) > 0
    }

    pub fn is_paused(&self) -> bool {
        self.shared.is_paused()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    pub fn get_statistics(&self) -> TaskStatistics {
        self.shared.registry.get_statistics()
    }

    pub fn get_progress(&self) -> f64 {
        self.shared.registry.get_progress()
    }
}
