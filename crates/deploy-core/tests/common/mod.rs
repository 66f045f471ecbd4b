#![allow(dead_code)]

use deploy_core::backend::{CommandOutput, Inventory, PlaybookOutcome, PlaybookStatus, RemoteBackend};
use deploy_core::config::{Config, NodeConfig};
use deploy_core::error::DeployError;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tempfile::TempDir;

/// In-memory backend. Commands are answered by the most recently added rule
/// whose pattern is a substring of the command; anything else succeeds with
/// empty output.
#[derive(Default)]
pub struct StubBackend {
    rules: Mutex<Vec<(String, CommandOutput)>>,
    unreachable: Mutex<HashSet<String>>,
    playbook_rc: Mutex<HashMap<String, i32>>,
    delay: Mutex<Option<Duration>>,
    pub commands: Mutex<Vec<(String, String, bool)>>,
    pub playbooks: Mutex<Vec<(String, bool, serde_json::Map<String, serde_json::Value>)>>,
}

impl StubBackend {
    /// Healthy node: 10G free disk, 4G available memory.
    pub fn healthy() -> Self {
        let stub = Self::default();
        stub.respond("df -BM", 0, "10240M");
        stub.respond("free -m", 0, "4096");
        stub
    }

    pub fn respond(&self, pattern: &str, rc: i32, stdout: &str) {
        self.rules.lock().push((
            pattern.to_string(),
            CommandOutput {
                rc,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        ));
    }

    pub fn unreachable(&self, host: &str) {
        self.unreachable.lock().insert(host.to_string());
    }

    pub fn fail_playbook(&self, playbook: &str, rc: i32) {
        self.playbook_rc.lock().insert(playbook.to_string(), rc);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn playbook_names(&self) -> Vec<String> {
        self.playbooks.lock().iter().map(|(p, _, _)| p.clone()).collect()
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.commands.lock().iter().any(|(_, c, _)| c.contains(pattern))
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait::async_trait]
impl RemoteBackend for StubBackend {
    async fn run_command(
        &self,
        node: &NodeConfig,
        command: &str,
        escalate: bool,
    ) -> Result<CommandOutput, DeployError> {
        self.pause().await;
        self.commands
            .lock()
            .push((node.name.clone(), command.to_string(), escalate));
        let rules = self.rules.lock();
        Ok(rules
            .iter()
            .rev()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default())
    }

    async fn run_playbook(
        &self,
        playbook: &Path,
        _inventory: &Inventory,
        vars: &serde_json::Map<String, serde_json::Value>,
        check_mode: bool,
    ) -> Result<PlaybookOutcome, DeployError> {
        self.pause().await;
        let name = playbook
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.playbooks.lock().push((name.clone(), check_mode, vars.clone()));

        let rc = self.playbook_rc.lock().get(&name).copied().unwrap_or(0);
        Ok(PlaybookOutcome {
            status: if rc == 0 {
                PlaybookStatus::Success
            } else {
                PlaybookStatus::Failed
            },
            rc,
            stats: BTreeMap::new(),
        })
    }

    async fn test_connection(&self, node: &NodeConfig) -> Result<bool, DeployError> {
        self.pause().await;
        if self.unreachable.lock().contains(&node.host) {
            return Err(DeployError::Connection(format!(
                "{}: Connection refused",
                node.address()
            )));
        }
        Ok(true)
    }
}

/// Playbook directory holding empty `install_*.yml` files, shared by every
/// test in the binary.
pub fn playbook_dir() -> PathBuf {
    static DIR: OnceLock<TempDir> = OnceLock::new();
    DIR.get_or_init(|| {
        let dir = tempfile::Builder::new()
            .prefix("deploy-playbooks-")
            .tempdir()
            .unwrap();
        for name in ["java", "python", "zookeeper"] {
            std::fs::write(dir.path().join(format!("install_{}.yml", name)), "---\n").unwrap();
        }
        dir
    })
    .path()
    .to_path_buf()
}

/// `nodes` is a list of (node name, "software:version,...").
pub fn config(nodes: &[(&str, &str)]) -> Config {
    let mut yaml = String::from("general:\n  max_concurrent_nodes: 2\nnodes:\n");
    for (i, (name, software)) in nodes.iter().enumerate() {
        yaml.push_str(&format!(
            "  - name: {}\n    host: 10.0.0.{}\n    owner_user: deploy\n    owner_pass: secret\n    super_pass: secret\n    install:\n",
            name,
            i + 1
        ));
        for (sw, version) in software.split(',').filter_map(|s| s.trim().split_once(':')) {
            yaml.push_str(&format!(
                "      - name: {}\n        version: \"{}\"\n        install_path: /opt/{}\n",
                sw, version, sw
            ));
        }
    }
    Config::from_yaml(&yaml).unwrap()
}
