use crate::playbook::PlaybookRunner;
use deploy_core::backend::{CommandOutput, Inventory, PlaybookOutcome, RemoteBackend};
use deploy_core::config::{Config, NodeConfig};
use deploy_core::error::DeployError;
use ssh2::Session;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// SSH backend: one short-lived session per command, opened with the
/// node's owner credentials. Escalated commands go through `sudo`.
#[derive(Debug, Clone)]
pub struct SshBackend {
    connect_timeout: Duration,
    playbooks: PlaybookRunner,
}

impl SshBackend {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            playbooks: PlaybookRunner::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Duration::from_secs(config.general.connect_timeout_secs))
    }

    pub fn with_playbook_runner(mut self, runner: PlaybookRunner) -> Self {
        self.playbooks = runner;
        self
    }

    async fn blocking<T, F>(&self, node: &NodeConfig, f: F) -> Result<T, DeployError>
    where
        T: Send + 'static,
        F: FnOnce(Session) -> Result<T, DeployError> + Send + 'static,
    {
        let node = node.clone();
        let timeout = self.connect_timeout;
        tokio::task::spawn_blocking(move || {
            let sess = connect(&node, timeout)?;
            f(sess)
        })
        .await
        .map_err(|e| DeployError::Command(format!("SSH worker failed: {}", e)))?
    }
}

/// Establish an authenticated session as the owner user.
fn connect(node: &NodeConfig, timeout: Duration) -> Result<Session, DeployError> {
    let address = node.address();
    debug!(node = %node.name, "Connecting to {}@{}", node.owner_user, address);

    let addr = address
        .to_socket_addrs()
        .map_err(|e| DeployError::Connection(format!("{}: {}", address, e)))?
        .next()
        .ok_or_else(|| DeployError::Connection(format!("{}: no address resolved", address)))?;
    let tcp = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|e| DeployError::Connection(format!("TCP connect to {}: {}", address, e)))?;

    let mut sess = Session::new()
        .map_err(|e| DeployError::Connection(format!("Session::new: {}", e)))?;
    sess.set_tcp_stream(tcp);
    sess.set_timeout(timeout.as_millis().min(u32::MAX as u128) as u32);
    sess.handshake()
        .map_err(|e| DeployError::Connection(format!("Handshake with {}: {}", address, e)))?;

    let user = node.owner_user.as_str();
    if let Some(key) = &node.owner_key {
        sess.userauth_pubkey_file(user, None, key, None)
            .map_err(|e| DeployError::Connection(format!("Pubkey auth: {}", e)))?;
    } else if let Some(pass) = &node.owner_pass {
        sess.userauth_password(user, pass)
            .map_err(|e| DeployError::Connection(format!("Password auth: {}", e)))?;
    } else {
        sess.userauth_agent(user)
            .map_err(|e| DeployError::Connection(format!("Agent auth: {}", e)))?;
    }

    if !sess.authenticated() {
        return Err(DeployError::Connection(format!(
            "Authentication failed for {}@{}",
            user, address
        )));
    }

    // Installs can run for minutes; only the handshake is bounded.
    sess.set_timeout(0);
    debug!(node = %node.name, "SSH connected to {}@{}", user, address);
    Ok(sess)
}

/// Execute a command, optionally feeding `stdin`, and collect its output.
fn exec_remote(sess: &Session, cmd: &str, stdin: Option<&str>) -> Result<CommandOutput, DeployError> {
    let mut channel = sess
        .channel_session()
        .map_err(|e| DeployError::Command(format!("Channel: {}", e)))?;
    channel
        .exec(cmd)
        .map_err(|e| DeployError::Command(format!("Exec '{}': {}", cmd, e)))?;

    if let Some(input) = stdin {
        channel
            .write_all(input.as_bytes())
            .map_err(|e| DeployError::Command(format!("Write stdin: {}", e)))?;
    }
    channel
        .send_eof()
        .map_err(|e| DeployError::Command(format!("Send EOF: {}", e)))?;

    let mut stdout = String::new();
    channel
        .read_to_string(&mut stdout)
        .map_err(|e| DeployError::Command(format!("Read output: {}", e)))?;
    let mut stderr = String::new();
    channel
        .stderr()
        .read_to_string(&mut stderr)
        .map_err(|e| DeployError::Command(format!("Read stderr: {}", e)))?;

    channel.wait_close().ok();
    let rc = channel.exit_status().unwrap_or(-1);
    if rc != 0 && !stderr.is_empty() {
        debug!("Remote command stderr: {}", stderr.trim());
    }

    Ok(CommandOutput { rc, stdout, stderr })
}

/// Wrap `cmd` for execution as the super user. With a super password it is
/// sent on stdin to `sudo -S`; otherwise sudo must not prompt.
fn escalate(node: &NodeConfig, cmd: &str) -> (String, Option<String>) {
    match &node.super_pass {
        Some(pass) => (
            format!(
                "sudo -S -p '' -u {} sh -c {}",
                shell_escape(&node.super_user),
                shell_escape(cmd)
            ),
            Some(format!("{}\n", pass)),
        ),
        None => (
            format!(
                "sudo -n -u {} sh -c {}",
                shell_escape(&node.super_user),
                shell_escape(cmd)
            ),
            None,
        ),
    }
}

/// Shell-escape a string for safe use in remote commands.
fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[async_trait::async_trait]
impl RemoteBackend for SshBackend {
    async fn run_command(
        &self,
        node: &NodeConfig,
        command: &str,
        escalate_to_super: bool,
    ) -> Result<CommandOutput, DeployError> {
        let (cmd, stdin) = if escalate_to_super {
            escalate(node, command)
        } else {
            (command.to_string(), None)
        };
        debug!(node = %node.name, "Remote exec: {}", command);
        self.blocking(node, move |sess| exec_remote(&sess, &cmd, stdin.as_deref()))
            .await
    }

    async fn run_playbook(
        &self,
        playbook: &Path,
        inventory: &Inventory,
        vars: &serde_json::Map<String, serde_json::Value>,
        check_mode: bool,
    ) -> Result<PlaybookOutcome, DeployError> {
        self.playbooks.run(playbook, inventory, vars, check_mode).await
    }

    async fn test_connection(&self, node: &NodeConfig) -> Result<bool, DeployError> {
        let output = self
            .blocking(node, |sess| exec_remote(&sess, "echo ok", None))
            .await?;
        let ok = output.success() && output.stdout.trim() == "ok";
        if ok {
            info!(node = %node.name, "Connection test passed");
        }
        Ok(ok)
    }
}
