use super::{CheckResult, Checker};
use crate::backend::RemoteNode;
use crate::error::Result;

const NAME: &str = "Port Availability";

/// Warns when any of the given TCP/UDP ports is already bound.
pub struct PortAvailabilityChecker {
    remote: RemoteNode,
    ports: Vec<u16>,
}

impl PortAvailabilityChecker {
    pub fn new(remote: RemoteNode, ports: Vec<u16>) -> Self {
        Self { remote, ports }
    }
}

#[async_trait::async_trait]
impl Checker for PortAvailabilityChecker {
    fn name(&self) -> &str {
        NAME
    }

    async fn check(&self) -> Result<CheckResult> {
        if self.ports.is_empty() {
            return Ok(CheckResult::skipped(NAME, "No ports to check"));
        }

        let mut occupied = Vec::new();
        for port in &self.ports {
            let output = self
                .remote
                .run(
                    &format!("netstat -tuln | grep ':{} ' || echo 'free'", port),
                    true,
                )
                .await?;
            if output.success() && !output.stdout.contains("free") {
                occupied.push(*port);
            }
        }

        let result = if occupied.is_empty() {
            CheckResult::passed(
                NAME,
                format!("All required ports are available: {:?}", self.ports),
            )
        } else {
            CheckResult::warning(NAME, format!("Some ports are occupied: {:?}", occupied))
        };
        Ok(result
            .with_detail("ports", self.ports.clone())
            .with_detail("occupied", occupied))
    }
}
