use super::{CheckResult, Checker};
use crate::backend::RemoteNode;
use crate::error::Result;

const NAME: &str = "Package Manager";
const MANAGERS: [&str; 2] = ["apt-get", "yum"];

/// Looks for a working apt-get or yum.
pub struct PackageManagerChecker {
    remote: RemoteNode,
}

impl PackageManagerChecker {
    pub fn new(remote: RemoteNode) -> Self {
        Self { remote }
    }
}

#[async_trait::async_trait]
impl Checker for PackageManagerChecker {
    fn name(&self) -> &str {
        NAME
    }

    async fn check(&self) -> Result<CheckResult> {
        for manager in MANAGERS {
            if !self.remote.run(&format!("which {}", manager), false).await?.success() {
                continue;
            }
            if self
                .remote
                .run(&format!("{} --version", manager), true)
                .await?
                .success()
            {
                return Ok(CheckResult::passed(
                    NAME,
                    format!("{} is available and working", manager),
                )
                .with_detail("manager", manager));
            }
        }

        Ok(CheckResult::warning(
            NAME,
            format!("No supported package manager found ({})", MANAGERS.join(", ")),
        ))
    }
}
