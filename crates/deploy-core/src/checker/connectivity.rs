use super::{CheckResult, Checker};
use crate::backend::RemoteNode;
use crate::error::{DeployError, Result};
use tracing::debug;

const NAME: &str = "SSH Connectivity";

/// Confirms an SSH session can be opened with the owner credentials.
pub struct ConnectivityChecker {
    remote: RemoteNode,
}

impl ConnectivityChecker {
    pub fn new(remote: RemoteNode) -> Self {
        Self { remote }
    }
}

#[async_trait::async_trait]
impl Checker for ConnectivityChecker {
    fn name(&self) -> &str {
        NAME
    }

    async fn check(&self) -> Result<CheckResult> {
        let node = &self.remote.node;
        debug!(node = %node.name, "Testing SSH connectivity to {}", node.address());

        let result = match self.remote.backend.test_connection(node).await {
            Ok(true) => CheckResult::passed(
                NAME,
                format!("Successfully connected to {}", node.address()),
            )
            .with_detail("host", node.host.clone())
            .with_detail("port", node.port)
            .with_detail("user", node.owner_user.clone()),
            Ok(false) => CheckResult::failed(
                NAME,
                format!("Connection test to {} did not succeed", node.address()),
            ),
            Err(DeployError::Connection(e)) => {
                CheckResult::failed(NAME, format!("Failed to connect: {}", e)).with_detail("error", e)
            }
            Err(e) => CheckResult::failed(NAME, format!("Unexpected error: {}", e))
                .with_detail("error", e.to_string()),
        };
        Ok(result)
    }
}
