use super::{CheckResult, Checker};
use crate::backend::RemoteNode;
use crate::error::Result;
use serde_json::{Map, Value};

const NAME: &str = "System Info";

/// Gathers OS, kernel, CPU and memory facts. Never fails: missing facts
/// degrade to a warning.
pub struct SystemInfoChecker {
    remote: RemoteNode,
}

impl SystemInfoChecker {
    pub fn new(remote: RemoteNode) -> Self {
        Self { remote }
    }

    async fn gather(&self) -> Result<Map<String, Value>> {
        let mut info = Map::new();

        let os = self.remote.run("cat /etc/os-release", false).await?;
        if os.success() {
            info.extend(parse_os_release(&os.stdout));
        }

        let kernel = self.remote.run("uname -r", false).await?;
        if kernel.success() {
            info.insert("kernel".into(), kernel.stdout.trim().into());
        }

        let cores = self.remote.run("nproc", false).await?;
        if cores.success() {
            if let Ok(n) = cores.stdout.trim().parse::<u64>() {
                info.insert("cpu_cores".into(), n.into());
            }
        }

        let memory = self
            .remote
            .run("free -m | grep Mem | awk '{print $2}'", false)
            .await?;
        if memory.success() {
            if let Ok(mb) = memory.stdout.trim().parse::<u64>() {
                info.insert("total_memory_mb".into(), mb.into());
            }
        }

        Ok(info)
    }
}

fn parse_os_release(raw: &str) -> Map<String, Value> {
    raw.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_lowercase(), Value::from(v.trim().trim_matches('"'))))
        .collect()
}

#[async_trait::async_trait]
impl Checker for SystemInfoChecker {
    fn name(&self) -> &str {
        NAME
    }

    async fn check(&self) -> Result<CheckResult> {
        match self.gather().await {
            Ok(info) => {
                let field = |key: &str| {
                    info.get(key)
                        .and_then(Value::as_str)
                        .unwrap_or("Unknown")
                        .to_string()
                };
                let message = format!(
                    "System: {}, Kernel: {}",
                    field("pretty_name"),
                    field("kernel")
                );
                let mut result = CheckResult::passed(NAME, message);
                result.details = info;
                Ok(result)
            }
            Err(e) => Ok(CheckResult::warning(
                NAME,
                format!("Could not gather full system info: {}", e),
            )
            .with_detail("error", e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::parse_os_release;

    #[test]
    fn test_parse_os_release() {
        let parsed = parse_os_release("NAME=\"Ubuntu\"\nPRETTY_NAME=\"Ubuntu 22.04.4 LTS\"\nVERSION_ID=\"22.04\"\n\n");
        assert_eq!(parsed["pretty_name"], "Ubuntu 22.04.4 LTS");
        assert_eq!(parsed["version_id"], "22.04");
        assert_eq!(parsed.len(), 3);
    }
}
