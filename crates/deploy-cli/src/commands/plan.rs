use deploy_core::config::Config;
use deploy_core::installer::InstallerRegistry;

pub fn run(config: &Config, json: bool) -> anyhow::Result<()> {
    let installers = InstallerRegistry::with_defaults();

    if json {
        let entries: Vec<serde_json::Value> = config
            .nodes
            .iter()
            .map(|node| {
                serde_json::json!({
                    "node": node.name,
                    "address": node.address(),
                    "software": node.install.iter().map(|s| serde_json::json!({
                        "name": s.name,
                        "version": s.version,
                        "install_path": s.install_path,
                        "source": s.source.to_string(),
                        "installer": installers.contains(&s.name),
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!(
        "{:<16} {:<22} {:<12} {:<10} {:<24} {}",
        "NODE", "ADDRESS", "SOFTWARE", "VERSION", "INSTALL PATH", "SOURCE"
    );
    println!("{}", "-".repeat(96));
    for node in &config.nodes {
        for software in &node.install {
            let source = if installers.contains(&software.name) {
                software.source.to_string()
            } else {
                format!("{} (no installer)", software.source)
            };
            println!(
                "{:<16} {:<22} {:<12} {:<10} {:<24} {}",
                node.name,
                node.address(),
                software.name,
                software.version,
                software.install_path.display(),
                source,
            );
        }
    }
    println!();
    println!(
        "{} nodes, {} tasks, max {} nodes in parallel",
        config.nodes.len(),
        config.nodes.iter().map(|n| n.install.len()).sum::<usize>(),
        config.general.max_concurrent_nodes
    );

    Ok(())
}
