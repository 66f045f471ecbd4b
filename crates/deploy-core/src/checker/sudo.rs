use super::{CheckResult, Checker};
use crate::backend::RemoteNode;
use crate::error::Result;

const NAME: &str = "Sudo Privileges";

/// Escalated `whoami` must answer with the configured super user.
pub struct SudoPrivilegeChecker {
    remote: RemoteNode,
}

impl SudoPrivilegeChecker {
    pub fn new(remote: RemoteNode) -> Self {
        Self { remote }
    }
}

#[async_trait::async_trait]
impl Checker for SudoPrivilegeChecker {
    fn name(&self) -> &str {
        NAME
    }

    async fn check(&self) -> Result<CheckResult> {
        let output = self.remote.run("whoami", true).await?;
        if !output.success() {
            return Ok(CheckResult::failed(NAME, "Failed to execute command with sudo")
                .with_detail("error", output.stderr.trim().to_string()));
        }

        let expected = self.remote.node.super_user.as_str();
        let sudo_user = output.stdout.trim().to_string();
        let result = if sudo_user == expected {
            CheckResult::passed(
                NAME,
                format!("Sudo privileges confirmed (running as {})", sudo_user),
            )
        } else {
            CheckResult::warning(
                NAME,
                format!("Sudo works but running as {} instead of {}", sudo_user, expected),
            )
            .with_detail("expected", expected)
        };
        Ok(result.with_detail("sudo_user", sudo_user))
    }
}
