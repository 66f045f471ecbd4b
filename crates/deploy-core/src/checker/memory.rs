use super::{CheckResult, Checker};
use crate::backend::{parse_megabytes, RemoteNode};
use crate::error::Result;

const NAME: &str = "Memory";

/// Available memory below the minimum is only a warning.
pub struct MemoryChecker {
    remote: RemoteNode,
    min_memory_mb: u64,
}

impl MemoryChecker {
    pub fn new(remote: RemoteNode, min_memory_mb: u64) -> Self {
        Self {
            remote,
            min_memory_mb,
        }
    }
}

#[async_trait::async_trait]
impl Checker for MemoryChecker {
    fn name(&self) -> &str {
        NAME
    }

    async fn check(&self) -> Result<CheckResult> {
        let output = self
            .remote
            .run("free -m | grep Mem | awk '{print $7}'", false)
            .await?;
        if !output.success() {
            return Ok(CheckResult::failed(NAME, "Failed to check memory")
                .with_detail("error", output.stderr.trim().to_string()));
        }

        let available_mb = parse_megabytes(&output.stdout)?;
        let result = if available_mb >= self.min_memory_mb {
            CheckResult::passed(
                NAME,
                format!(
                    "Sufficient memory: {}MB available (required: {}MB)",
                    available_mb, self.min_memory_mb
                ),
            )
        } else {
            CheckResult::warning(
                NAME,
                format!(
                    "Low memory: {}MB available (recommended: {}MB)",
                    available_mb, self.min_memory_mb
                ),
            )
        };
        Ok(result
            .with_detail("available_mb", available_mb)
            .with_detail("required_mb", self.min_memory_mb))
    }
}
