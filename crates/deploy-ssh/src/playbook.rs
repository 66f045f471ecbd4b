use deploy_core::backend::{Inventory, PlaybookOutcome, PlaybookStatus};
use deploy_core::error::DeployError;
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Runs `ansible-playbook` against a generated single-node inventory.
#[derive(Debug, Clone)]
pub struct PlaybookRunner {
    program: String,
}

impl Default for PlaybookRunner {
    fn default() -> Self {
        Self {
            program: "ansible-playbook".to_string(),
        }
    }
}

impl PlaybookRunner {
    /// Use a different executable, e.g. a wrapper script or a venv path.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub async fn run(
        &self,
        playbook: &Path,
        inventory: &Inventory,
        vars: &serde_json::Map<String, serde_json::Value>,
        check_mode: bool,
    ) -> Result<PlaybookOutcome, DeployError> {
        if !playbook.exists() {
            return Err(DeployError::Playbook(format!(
                "Playbook not found: {}",
                playbook.display()
            )));
        }

        let workdir = workdir()?;
        let result = self
            .run_in(workdir.path(), playbook, inventory, vars, check_mode)
            .await;

        let path = workdir.path().to_path_buf();
        if let Err(e) = workdir.close() {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
        result
    }

    async fn run_in(
        &self,
        workdir: &Path,
        playbook: &Path,
        inventory: &Inventory,
        vars: &serde_json::Map<String, serde_json::Value>,
        check_mode: bool,
    ) -> Result<PlaybookOutcome, DeployError> {
        let inventory_path = workdir.join("inventory.yml");
        tokio::fs::write(&inventory_path, serde_yaml::to_string(inventory)?).await?;
        let vars_path = workdir.join("vars.json");
        tokio::fs::write(&vars_path, serde_json::to_vec(vars)?).await?;

        let mut cmd = Command::new(&self.program);
        cmd.arg("-i")
            .arg(&inventory_path)
            .arg("--extra-vars")
            .arg(format!("@{}", vars_path.display()))
            .arg(playbook);
        if check_mode {
            cmd.arg("--check");
        }

        let name = playbook
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!("Running playbook {}{}", name, if check_mode { " (check mode)" } else { "" });

        let output = cmd
            .output()
            .await
            .map_err(|e| DeployError::Playbook(format!("Failed to run {}: {}", self.program, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            debug!("{}", line);
        }
        let rc = output.status.code().unwrap_or(-1);
        let stats = parse_recap(&stdout);
        let hosts_failed = stats.values().any(|counts| {
            ["failed", "unreachable"]
                .iter()
                .any(|key| counts.get(*key).copied().unwrap_or(0) > 0)
        });

        let status = if rc == 0 && !hosts_failed {
            info!("Playbook {} completed successfully", name);
            PlaybookStatus::Success
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Playbook {} failed with rc {}: {}", name, rc, stderr.trim());
            PlaybookStatus::Failed
        };

        Ok(PlaybookOutcome { status, rc, stats })
    }
}

/// Private scratch directory for the inventory and vars files. The inventory
/// carries node passwords, so the directory is owner-only (0700 on unix).
fn workdir() -> std::io::Result<TempDir> {
    tempfile::Builder::new().prefix("auto-deploy-").tempdir()
}

/// Per-host counters from the `PLAY RECAP` section of playbook output.
pub fn parse_recap(stdout: &str) -> BTreeMap<String, BTreeMap<String, u64>> {
    let mut stats = BTreeMap::new();
    let Some(start) = stdout.find("PLAY RECAP") else {
        return stats;
    };

    for line in stdout[start..].lines().skip(1) {
        let Some((host, counters)) = line.split_once(" : ") else {
            continue;
        };
        let counts: BTreeMap<String, u64> = counters
            .split_whitespace()
            .filter_map(|pair| pair.split_once('='))
            .filter_map(|(k, v)| v.parse().ok().map(|n| (k.to_string(), n)))
            .collect();
        if !counts.is_empty() {
            stats.insert(host.trim().to_string(), counts);
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = "\
PLAY [all] *********************************************************************

TASK [Install JDK] *************************************************************
changed: [web-1]

PLAY RECAP *********************************************************************
web-1                      : ok=5    changed=2    unreachable=0    failed=0    skipped=1    rescued=0    ignored=0
web-2                      : ok=1    changed=0    unreachable=1    failed=0    skipped=0    rescued=0    ignored=0
";

    #[test]
    fn test_parse_recap() {
        let stats = parse_recap(OUTPUT);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats["web-1"]["ok"], 5);
        assert_eq!(stats["web-1"]["changed"], 2);
        assert_eq!(stats["web-2"]["unreachable"], 1);
    }

    #[test]
    fn test_parse_recap_without_recap() {
        assert!(parse_recap("ERROR! the playbook could not be found").is_empty());
    }

    #[tokio::test]
    async fn test_missing_playbook() {
        let err = PlaybookRunner::default()
            .run(
                Path::new("/nonexistent/install_java.yml"),
                &Inventory::for_node(&node()),
                &serde_json::Map::new(),
                false,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Playbook not found"));
    }

    fn node() -> deploy_core::config::NodeConfig {
        serde_yaml::from_str(
            "{name: n1, host: 10.0.0.1, owner_user: deploy, owner_pass: hunter2, super_pass: x}",
        )
        .unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_code_decides_status() {
        let scratch = TempDir::new().unwrap();
        let playbook = scratch.path().join("install_java.yml");
        std::fs::write(&playbook, "---\n").unwrap();
        let inventory = Inventory::for_node(&node());
        let vars = serde_json::Map::new();

        let ok = PlaybookRunner::with_program("true")
            .run(&playbook, &inventory, &vars, true)
            .await
            .unwrap();
        assert!(ok.succeeded());

        let failed = PlaybookRunner::with_program("false")
            .run(&playbook, &inventory, &vars, false)
            .await
            .unwrap();
        assert_eq!(failed.status, PlaybookStatus::Failed);
        assert_eq!(failed.rc, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_workdir_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = workdir().unwrap();
        let mode = std::fs::metadata(dir.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
        assert!(dir
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("auto-deploy-"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_inventory_is_private_and_removed() {
        use std::os::unix::fs::PermissionsExt;

        let scratch = TempDir::new().unwrap();
        let playbook = scratch.path().join("install_java.yml");
        std::fs::write(&playbook, "---\n").unwrap();

        // Records the inventory's directory listing while the run is live.
        let script = scratch.path().join("fake-ansible-playbook");
        let seen = scratch.path().join("seen");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\ndir=$(dirname \"$2\")\nls -ld \"$dir\" | cut -c1-10 > '{seen}'\necho \"$dir\" >> '{seen}'\ngrep -c hunter2 \"$2\" >> '{seen}'\n",
                seen = seen.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let outcome = PlaybookRunner::with_program(script.display().to_string())
            .run(&playbook, &Inventory::for_node(&node()), &serde_json::Map::new(), false)
            .await
            .unwrap();
        assert!(outcome.succeeded());

        let seen = std::fs::read_to_string(&seen).unwrap();
        let lines: Vec<&str> = seen.lines().collect();
        assert_eq!(lines[0], "drwx------");
        assert_eq!(lines[2], "1");
        assert!(!Path::new(lines[1]).exists());
    }
}
