use crate::error::{DeployError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Top-level deployment configuration.
/// Loaded from ~/.config/auto-deploy/deploy.yml unless `--config` is given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub checks: CheckThresholds,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_max_concurrent_nodes")]
    pub max_concurrent_nodes: usize,
    #[serde(default = "default_playbook_dir")]
    pub playbook_dir: PathBuf,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_concurrent_nodes: default_max_concurrent_nodes(),
            playbook_dir: default_playbook_dir(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub level: LogLevel,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            level: LogLevel::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    #[serde(alias = "WARN")]
    Warning,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Thresholds for the default pre-flight checks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CheckThresholds {
    #[serde(default = "default_min_disk_mb")]
    pub min_disk_mb: u64,
    #[serde(default = "default_min_memory_mb")]
    pub min_memory_mb: u64,
}

impl Default for CheckThresholds {
    fn default() -> Self {
        Self {
            min_disk_mb: default_min_disk_mb(),
            min_memory_mb: default_min_memory_mb(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default)]
    pub owner_user: String,
    #[serde(default)]
    pub owner_pass: Option<String>,
    #[serde(default)]
    pub owner_key: Option<PathBuf>,
    #[serde(default = "default_super_user")]
    pub super_user: String,
    #[serde(default)]
    pub super_pass: Option<String>,
    #[serde(default)]
    pub super_key: Option<PathBuf>,
    #[serde(default)]
    pub install: Vec<SoftwareConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftwareConfig {
    pub name: String,
    pub version: String,
    pub install_path: PathBuf,
    #[serde(default)]
    pub source: SourceKind,
    #[serde(default)]
    pub source_path: Option<String>,
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Local,
    Url,
    #[default]
    Repository,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Local => write!(f, "local"),
            SourceKind::Url => write!(f, "url"),
            SourceKind::Repository => write!(f, "repository"),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./deploy_data")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./deploy_data/log")
}

fn default_playbook_dir() -> PathBuf {
    PathBuf::from("./playbook")
}

fn default_max_concurrent_nodes() -> usize {
    5
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_min_disk_mb() -> u64 {
    500
}

fn default_min_memory_mb() -> u64 {
    512
}

fn default_ssh_port() -> u16 {
    22
}

fn default_super_user() -> String {
    "root".to_string()
}

impl Config {
    /// Load config from the default path (~/.config/auto-deploy/deploy.yml).
    pub fn load_default() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load, expand and validate config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DeployError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(contents)?;
        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("auto-deploy")
            .join("deploy.yml")
    }

    pub fn find_node(&self, name: &str) -> Option<&NodeConfig> {
        self.nodes.iter().find(|n| n.name == name)
    }

    fn expand_paths(&mut self) {
        self.general.data_dir = expand_path(&self.general.data_dir);
        self.general.playbook_dir = expand_path(&self.general.playbook_dir);
        self.log.dir = expand_path(&self.log.dir);
        for node in &mut self.nodes {
            node.owner_key = node.owner_key.as_deref().map(expand_path);
            node.super_key = node.super_key.as_deref().map(expand_path);
            for software in &mut node.install {
                software.install_path = expand_path(&software.install_path);
                if software.source == SourceKind::Local {
                    software.source_path = software
                        .source_path
                        .as_deref()
                        .map(|p| expand_path(Path::new(p)).display().to_string());
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.general.max_concurrent_nodes == 0 {
            return Err(DeployError::Config(
                "general.max_concurrent_nodes must be at least 1".into(),
            ));
        }
        if self.nodes.is_empty() {
            return Err(DeployError::Config("No nodes defined in config file".into()));
        }

        let mut names = HashSet::new();
        for node in &self.nodes {
            node.validate()?;
            if !names.insert(node.name.as_str()) {
                return Err(DeployError::Config(format!(
                    "Duplicate node name: {}",
                    node.name
                )));
            }
        }
        Ok(())
    }
}

impl NodeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(DeployError::Config("Node name is required".into()));
        }
        if self.host.is_empty() {
            return Err(DeployError::Config(format!(
                "Host is required for node {}",
                self.name
            )));
        }
        if self.port == 0 {
            return Err(DeployError::Config(format!(
                "Invalid port 0 for node {}. Port must be between 1 and 65535",
                self.name
            )));
        }
        if self.owner_user.is_empty() {
            return Err(DeployError::Config(format!(
                "owner_user is required for node {}",
                self.name
            )));
        }
        if self.owner_pass.is_none() && self.owner_key.is_none() {
            return Err(DeployError::Config(format!(
                "Either owner_pass or owner_key must be provided for node {}",
                self.name
            )));
        }
        if self.super_pass.is_none() && self.super_key.is_none() {
            return Err(DeployError::Config(format!(
                "Either super_pass or super_key must be provided for node {}",
                self.name
            )));
        }
        for key in [&self.owner_key, &self.super_key].into_iter().flatten() {
            check_key_file(key, &self.name)?;
        }
        if self.install.is_empty() {
            return Err(DeployError::Config(format!(
                "At least one software must be specified for node {}",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for software in &self.install {
            software.validate()?;
            if !seen.insert((software.name.as_str(), software.version.as_str())) {
                return Err(DeployError::Config(format!(
                    "Software {} {} is listed twice for node {}",
                    software.name, software.version, self.name
                )));
            }
        }
        Ok(())
    }

    /// SSH endpoint as `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn software(&self, name: &str, version: &str) -> Option<&SoftwareConfig> {
        self.install
            .iter()
            .find(|s| s.name == name && s.version == version)
    }
}

impl SoftwareConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(DeployError::Config("Software name is required".into()));
        }
        if self.version.is_empty() {
            return Err(DeployError::Config(format!(
                "Version is required for {}",
                self.name
            )));
        }
        if self.install_path.as_os_str().is_empty() {
            return Err(DeployError::Config(format!(
                "Install path is required for {}",
                self.name
            )));
        }
        match (self.source, self.source_path.as_deref()) {
            (SourceKind::Local | SourceKind::Url, None | Some("")) => {
                Err(DeployError::Config(format!(
                    "source_path is required when source is '{}' for {}",
                    self.source, self.name
                )))
            }
            (SourceKind::Local, Some(path)) if !Path::new(path).exists() => {
                Err(DeployError::Config(format!(
                    "Source file not found: {} for {}",
                    path, self.name
                )))
            }
            _ => Ok(()),
        }
    }

    /// Free-form option lookup with a fallback.
    pub fn option<T: serde::de::DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.config
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or(default)
    }
}

fn check_key_file(path: &Path, node: &str) -> Result<()> {
    let meta = std::fs::metadata(path).map_err(|_| {
        DeployError::Config(format!(
            "SSH key not found: {} for node {}",
            path.display(),
            node
        ))
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = meta.permissions().mode() & 0o777;
        if mode != 0o600 {
            return Err(DeployError::Config(format!(
                "SSH key {} has incorrect permissions {:o}. Should be 600 (rw-------)",
                path.display(),
                mode
            )));
        }
    }
    #[cfg(not(unix))]
    let _ = meta;

    Ok(())
}

/// Expand a leading `~` to the home directory.
pub fn expand_path(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

pub const SAMPLE_CONFIG: &str = r#"# auto-deploy configuration

general:
  data_dir: ./deploy_data
  max_concurrent_nodes: 5
  playbook_dir: ./playbook
  connect_timeout_secs: 10

log:
  dir: ./deploy_data/log
  level: INFO

checks:
  min_disk_mb: 500
  min_memory_mb: 512

nodes:
  - name: node1
    host: 192.168.1.10
    port: 22
    owner_user: deploy
    owner_key: ~/.ssh/id_rsa
    super_user: root
    super_pass: change-me
    install:
      - name: java
        version: "11"
        install_path: /opt/java
        source: repository
        config:
          set_java_home: true
          add_to_path: true
      - name: zookeeper
        version: "3.8.4"
        install_path: /opt/zookeeper
        source: url
        source_path: https://archive.apache.org/dist/zookeeper/zookeeper-3.8.4/apache-zookeeper-3.8.4-bin.tar.gz
        config:
          data_dir: /var/lib/zookeeper
          client_port: 2181

  - name: node2
    host: 192.168.1.11
    owner_user: deploy
    owner_pass: change-me
    super_pass: change-me
    install:
      - name: python
        version: "3.11"
        install_path: /opt/python
"#;
