use super::{CheckResult, Checker};
use crate::backend::RemoteNode;
use crate::error::Result;

const NAME: &str = "Disk Space";

/// Free space on `/` must reach the minimum, otherwise the check fails.
pub struct DiskSpaceChecker {
    remote: RemoteNode,
    min_space_mb: u64,
}

impl DiskSpaceChecker {
    pub fn new(remote: RemoteNode, min_space_mb: u64) -> Self {
        Self {
            remote,
            min_space_mb,
        }
    }
}

#[async_trait::async_trait]
impl Checker for DiskSpaceChecker {
    fn name(&self) -> &str {
        NAME
    }

    async fn check(&self) -> Result<CheckResult> {
        let available_mb = match self.remote.free_space_mb("/", false).await {
            Ok(mb) => mb,
            Err(e) => {
                return Ok(CheckResult::failed(NAME, format!("Error checking disk space: {}", e))
                    .with_detail("error", e.to_string()))
            }
        };

        let result = if available_mb >= self.min_space_mb {
            CheckResult::passed(
                NAME,
                format!(
                    "Sufficient disk space: {}MB available (required: {}MB)",
                    available_mb, self.min_space_mb
                ),
            )
        } else {
            CheckResult::failed(
                NAME,
                format!(
                    "Insufficient disk space: {}MB available (required: {}MB)",
                    available_mb, self.min_space_mb
                ),
            )
        };
        Ok(result
            .with_detail("available_mb", available_mb)
            .with_detail("required_mb", self.min_space_mb))
    }
}
