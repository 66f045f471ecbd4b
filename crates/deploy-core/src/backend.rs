use crate::config::NodeConfig;
use crate::error::DeployError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Output of a remote shell command. A non-zero `rc` is not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandOutput {
    pub rc: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.rc == 0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybookStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookOutcome {
    pub status: PlaybookStatus,
    pub rc: i32,
    /// Per-host recap counters (ok, changed, failed, ...).
    #[serde(default)]
    pub stats: BTreeMap<String, BTreeMap<String, u64>>,
}

impl PlaybookOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == PlaybookStatus::Success && self.rc == 0
    }
}

/// Ansible inventory for a single node, serialized as
/// `all.hosts.<node>.<vars>`.
#[derive(Debug, Clone, Serialize)]
pub struct Inventory {
    pub all: InventoryGroup,
}

#[derive(Debug, Clone, Serialize)]
pub struct InventoryGroup {
    pub hosts: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
}

impl Inventory {
    pub fn for_node(node: &NodeConfig) -> Self {
        let mut vars = BTreeMap::new();
        vars.insert("ansible_host".to_string(), node.host.clone().into());
        vars.insert("ansible_port".to_string(), node.port.into());
        vars.insert("ansible_user".to_string(), node.owner_user.clone().into());

        if let Some(key) = &node.owner_key {
            vars.insert(
                "ansible_ssh_private_key_file".to_string(),
                key.display().to_string().into(),
            );
        } else if let Some(pass) = &node.owner_pass {
            vars.insert("ansible_password".to_string(), pass.clone().into());
        }

        vars.insert("ansible_become".to_string(), true.into());
        vars.insert("ansible_become_user".to_string(), node.super_user.clone().into());
        if let Some(key) = &node.super_key {
            vars.insert(
                "ansible_become_ssh_private_key_file".to_string(),
                key.display().to_string().into(),
            );
        } else if let Some(pass) = &node.super_pass {
            vars.insert("ansible_become_password".to_string(), pass.clone().into());
        }

        let mut hosts = BTreeMap::new();
        hosts.insert(node.name.clone(), vars);
        Self {
            all: InventoryGroup { hosts },
        }
    }
}

/// Remote execution collaborator. Every checker and installer talks to
/// nodes through this trait; implementations may block for as long as the
/// remote side takes.
#[async_trait::async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Run a shell command as the owner user, or as the super user when
    /// `escalate` is set.
    async fn run_command(
        &self,
        node: &NodeConfig,
        command: &str,
        escalate: bool,
    ) -> Result<CommandOutput, DeployError>;

    /// Run a playbook against the inventory. Transport and setup problems
    /// are errors; a play that fails is reported through the outcome.
    async fn run_playbook(
        &self,
        playbook: &Path,
        inventory: &Inventory,
        vars: &serde_json::Map<String, serde_json::Value>,
        check_mode: bool,
    ) -> Result<PlaybookOutcome, DeployError>;

    /// Open a session and run a trivial command. Errors with
    /// [`DeployError::Connection`] when the node is unreachable.
    async fn test_connection(&self, node: &NodeConfig) -> Result<bool, DeployError>;
}

/// A node paired with the backend that reaches it.
#[derive(Clone)]
pub struct RemoteNode {
    pub node: Arc<NodeConfig>,
    pub backend: Arc<dyn RemoteBackend>,
}

impl RemoteNode {
    pub fn new(node: Arc<NodeConfig>, backend: Arc<dyn RemoteBackend>) -> Self {
        Self { node, backend }
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub async fn run(&self, command: &str, escalate: bool) -> Result<CommandOutput, DeployError> {
        self.backend.run_command(&self.node, command, escalate).await
    }

    /// Free space in MB on the filesystem holding `path`, from `df -BM`.
    pub async fn free_space_mb(&self, path: &str, escalate: bool) -> Result<u64, DeployError> {
        let output = self
            .run(
                &format!("df -BM {} | tail -1 | awk '{{print $4}}'", path),
                escalate,
            )
            .await?;
        if !output.success() {
            return Err(DeployError::Command(format!(
                "df failed on {}: {}",
                self.name(),
                output.stderr.trim()
            )));
        }
        parse_megabytes(&output.stdout)
    }
}

impl std::fmt::Debug for RemoteNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteNode")
            .field("node", &self.node.name)
            .finish_non_exhaustive()
    }
}

/// Parse `2048M` / `2048` style sizes.
pub fn parse_megabytes(raw: &str) -> Result<u64, DeployError> {
    let trimmed = raw.trim().trim_end_matches(['M', 'm']);
    trimmed
        .parse()
        .map_err(|_| DeployError::Command(format!("Unexpected size output: '{}'", raw.trim())))
}
