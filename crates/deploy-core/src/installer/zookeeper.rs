use super::{InstallContext, Installer, PreCheckReport, StageReport};
use crate::error::Result;
use tracing::{info, warn};

const PLAYBOOK: &str = "install_zookeeper.yml";

/// Apache ZooKeeper via `install_zookeeper.yml`. Needs Java on the node.
pub struct ZookeeperInstaller {
    ctx: InstallContext,
}

impl ZookeeperInstaller {
    pub fn new(ctx: InstallContext) -> Self {
        Self { ctx }
    }

    fn server_script(&self) -> String {
        format!("{}/bin/zkServer.sh", self.ctx.install_path())
    }
}

#[async_trait::async_trait]
impl Installer for ZookeeperInstaller {
    async fn pre_check(&self) -> Result<PreCheckReport> {
        let node = self.ctx.node_name();
        info!(node = %node, "Running pre-installation checks for Zookeeper {}", self.ctx.software.version);

        let mut checks = PreCheckReport::new();
        let installed = self
            .ctx
            .run(&format!("test -f {} && echo installed", self.server_script()), true)
            .await
            .map(|out| out.stdout.contains("installed"))
            .unwrap_or(false);
        if installed {
            info!(node = %node, "Zookeeper is already installed");
        }
        checks.insert("zookeeper_installed".into(), installed.into());

        let java = self
            .ctx
            .run("java -version 2>&1", false)
            .await
            .map(|out| out.success())
            .unwrap_or(false);
        if !java {
            warn!(node = %node, "Java is not installed (required for Zookeeper)");
        }
        checks.insert("java_installed".into(), java.into());

        let disk_ok = self.ctx.disk_space_ok(200).await.unwrap_or(false);
        checks.insert("disk_space_ok".into(), disk_ok.into());
        Ok(checks)
    }

    async fn install(&self) -> Result<StageReport> {
        info!(
            node = %self.ctx.node_name(),
            "Installing Zookeeper {} using Ansible playbook", self.ctx.software.version
        );
        let software = &self.ctx.software;
        let mut vars = self.ctx.base_vars("zk");
        vars.insert(
            "zk_data_dir".into(),
            software
                .option("data_dir", "/var/lib/zookeeper".to_string())
                .into(),
        );
        vars.insert("zk_client_port".into(), software.option("client_port", 2181u16).into());
        vars.insert("zk_tick_time".into(), software.option("tick_time", 2000u32).into());
        vars.insert("zk_init_limit".into(), software.option("init_limit", 10u32).into());
        vars.insert("zk_sync_limit".into(), software.option("sync_limit", 5u32).into());
        self.ctx.run_playbook(PLAYBOOK, vars).await
    }

    async fn post_config(&self) -> Result<StageReport> {
        info!(node = %self.ctx.node_name(), "Post-configuration handled by playbook");
        Ok(StageReport::success().with_detail("configured", true))
    }

    async fn verify(&self) -> Result<StageReport> {
        info!(node = %self.ctx.node_name(), "Verifying Zookeeper installation");
        let script = self.server_script();
        let found = self
            .ctx
            .run(&format!("test -f {} && echo found", script), true)
            .await?;
        if !found.stdout.contains("found") {
            return Ok(StageReport::failure(
                "Zookeeper binaries not found after installation",
            ));
        }

        let version_info = match self.ctx.run(&format!("{} version", script), true).await {
            Ok(out) => out.stdout.trim().to_string(),
            Err(_) => "Version info not available".to_string(),
        };
        info!(node = %self.ctx.node_name(), "Zookeeper verification successful");
        Ok(StageReport::success()
            .with_detail("verified", true)
            .with_detail("version_info", version_info))
    }
}
