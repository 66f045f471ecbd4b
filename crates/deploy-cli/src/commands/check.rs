use deploy_core::backend::RemoteNode;
use deploy_core::checker::{
    CheckStatus, CheckSummary, CheckerManager, PackageManagerChecker, SudoPrivilegeChecker,
};
use deploy_core::config::Config;
use deploy_ssh::SshBackend;
use std::sync::Arc;

/// Run the pre-flight checks against every node, one node at a time.
/// Returns whether any check failed.
pub async fn run(config: &Config, json: bool) -> anyhow::Result<bool> {
    let backend = Arc::new(SshBackend::from_config(config));

    let mut summaries: Vec<(String, CheckSummary)> = Vec::new();
    for node in &config.nodes {
        let remote = RemoteNode::new(Arc::new(node.clone()), backend.clone());
        let mut manager = CheckerManager::with_defaults(&remote, &config.checks);
        manager.add_checker(Box::new(SudoPrivilegeChecker::new(remote.clone())));
        manager.add_checker(Box::new(PackageManagerChecker::new(remote)));
        summaries.push((node.name.clone(), manager.run_all().await));
    }

    if json {
        let mut entries = serde_json::Map::new();
        for (name, summary) in &summaries {
            entries.insert(name.clone(), serde_json::to_value(summary)?);
        }
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for (name, summary) in &summaries {
            println!("{}", name);
            for result in &summary.results {
                let icon = match result.status {
                    CheckStatus::Passed => "✓",
                    CheckStatus::Warning => "⚠",
                    CheckStatus::Failed => "✗",
                    CheckStatus::Skipped => "-",
                };
                println!("  {} {:<20} {}", icon, result.name, result.message);
            }
            println!(
                "  {} passed, {} warnings, {} failed, {} skipped",
                summary.passed, summary.warnings, summary.failed, summary.skipped
            );
        }
    }

    Ok(summaries.iter().any(|(_, s)| s.has_failures()))
}
