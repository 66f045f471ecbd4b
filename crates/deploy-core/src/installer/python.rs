use super::{InstallContext, Installer, PreCheckReport, StageReport};
use crate::error::Result;
use serde_json::Value;
use tracing::{debug, info};

const PLAYBOOK: &str = "install_python.yml";

/// Python 3 with pip and venv via `install_python.yml`.
pub struct PythonInstaller {
    ctx: InstallContext,
}

impl PythonInstaller {
    pub fn new(ctx: InstallContext) -> Self {
        Self { ctx }
    }
}

#[async_trait::async_trait]
impl Installer for PythonInstaller {
    async fn pre_check(&self) -> Result<PreCheckReport> {
        let node = self.ctx.node_name();
        info!(node = %node, "Running pre-installation checks for Python {}", self.ctx.software.version);

        let mut checks = PreCheckReport::new();
        match self.ctx.run("python3 --version", false).await {
            Ok(out) if out.success() => {
                info!(node = %node, "Python is already installed: {}", out.stdout.trim());
                checks.insert("python_installed".into(), true.into());
                checks.insert("python_version".into(), out.stdout.trim().into());
            }
            _ => {
                debug!(node = %node, "Python not found on system");
                checks.insert("python_installed".into(), false.into());
                checks.insert("python_version".into(), Value::Null);
            }
        }

        let disk_ok = self.ctx.disk_space_ok(300).await.unwrap_or(false);
        checks.insert("disk_space_ok".into(), disk_ok.into());
        Ok(checks)
    }

    async fn install(&self) -> Result<StageReport> {
        info!(
            node = %self.ctx.node_name(),
            "Installing Python {} using Ansible playbook", self.ctx.software.version
        );
        let mut vars = self.ctx.base_vars("python");
        vars.insert(
            "python_install_pip".into(),
            self.ctx.software.option("install_pip", true).into(),
        );
        vars.insert(
            "python_install_venv".into(),
            self.ctx.software.option("install_venv", true).into(),
        );
        self.ctx.run_playbook(PLAYBOOK, vars).await
    }

    async fn post_config(&self) -> Result<StageReport> {
        info!(node = %self.ctx.node_name(), "Post-configuration handled by playbook");
        Ok(StageReport::success().with_detail("configured", true))
    }

    async fn verify(&self) -> Result<StageReport> {
        info!(node = %self.ctx.node_name(), "Verifying Python installation");
        let out = self.ctx.run("python3 --version", false).await?;
        if !out.success() {
            return Ok(StageReport::failure("Python command not found after installation"));
        }
        let version = out.stdout.trim().to_string();
        info!(node = %self.ctx.node_name(), "Python verification successful: {}", version);

        let pip = self.ctx.run("python3 -m pip --version", false).await?;
        let pip_version = if pip.success() {
            Value::from(pip.stdout.trim())
        } else {
            Value::Null
        };
        Ok(StageReport::success()
            .with_detail("verified", true)
            .with_detail("python_version", version)
            .with_detail("pip_version", pip_version))
    }
}
