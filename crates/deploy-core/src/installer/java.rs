use super::{InstallContext, Installer, PreCheckReport, StageReport};
use crate::error::Result;
use serde_json::Value;
use tracing::{debug, info};

const PLAYBOOK: &str = "install_java.yml";

/// Java JDK via `install_java.yml`.
pub struct JavaInstaller {
    ctx: InstallContext,
}

impl JavaInstaller {
    pub fn new(ctx: InstallContext) -> Self {
        Self { ctx }
    }
}

#[async_trait::async_trait]
impl Installer for JavaInstaller {
    async fn pre_check(&self) -> Result<PreCheckReport> {
        let node = self.ctx.node_name();
        info!(node = %node, "Running pre-installation checks for Java {}", self.ctx.software.version);

        let mut checks = PreCheckReport::new();
        match self.ctx.run("java -version 2>&1", false).await {
            Ok(out) if out.success() => {
                info!(node = %node, "Java is already installed: {}", out.stdout.trim());
                checks.insert("java_installed".into(), true.into());
                checks.insert("java_version".into(), out.stdout.trim().into());
            }
            _ => {
                debug!(node = %node, "Java not found on system");
                checks.insert("java_installed".into(), false.into());
                checks.insert("java_version".into(), Value::Null);
            }
        }

        let disk_ok = self.ctx.disk_space_ok(500).await.unwrap_or(false);
        checks.insert("disk_space_ok".into(), disk_ok.into());

        let path_exists = self
            .ctx
            .run(
                &format!(
                    "test -d {} && echo exists || echo missing",
                    self.ctx.install_path()
                ),
                true,
            )
            .await
            .map(|out| out.stdout.trim() == "exists")
            .unwrap_or(false);
        checks.insert("install_path_exists".into(), path_exists.into());

        Ok(checks)
    }

    async fn install(&self) -> Result<StageReport> {
        info!(
            node = %self.ctx.node_name(),
            "Installing Java {} using Ansible playbook", self.ctx.software.version
        );
        let mut vars = self.ctx.base_vars("java");
        vars.insert(
            "java_set_home".into(),
            self.ctx.software.option("set_java_home", true).into(),
        );
        vars.insert(
            "java_add_to_path".into(),
            self.ctx.software.option("add_to_path", true).into(),
        );
        self.ctx.run_playbook(PLAYBOOK, vars).await
    }

    async fn post_config(&self) -> Result<StageReport> {
        info!(node = %self.ctx.node_name(), "Post-configuration handled by playbook");
        Ok(StageReport::success().with_detail("configured", true))
    }

    async fn verify(&self) -> Result<StageReport> {
        info!(node = %self.ctx.node_name(), "Verifying Java installation");
        let out = self.ctx.run("java -version 2>&1", false).await?;
        if !out.success() {
            return Ok(StageReport::failure("Java command not found after installation"));
        }
        info!(node = %self.ctx.node_name(), "Java verification successful: {}", out.stdout.trim());
        Ok(StageReport::success()
            .with_detail("verified", true)
            .with_detail("version_output", out.stdout.trim()))
    }
}
