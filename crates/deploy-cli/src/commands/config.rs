use deploy_core::config::{Config, SAMPLE_CONFIG};
use std::path::Path;

pub fn run(custom: Option<&Path>, path: bool, init: bool, sample: bool) -> anyhow::Result<()> {
    let config_path = custom
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::default_path);

    if path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if sample {
        print!("{}", SAMPLE_CONFIG);
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config already exists at: {}", config_path.display());
            println!("Remove it first if you want to reinitialize.");
            return Ok(());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&config_path, SAMPLE_CONFIG)?;
        println!("Sample config written to: {}", config_path.display());
        return Ok(());
    }

    // Default: show current config path and status
    println!("Config path: {}", config_path.display());
    if !config_path.exists() {
        println!("Status:      not found");
        println!("Run `auto-deploy config --init` to create one.");
        return Ok(());
    }

    match Config::load_from(&config_path) {
        Ok(config) => {
            println!("Status:      valid");
            println!("Data dir:    {}", config.general.data_dir.display());
            println!("Playbooks:   {}", config.general.playbook_dir.display());
            println!("Nodes:       {}", config.nodes.len());
            for node in &config.nodes {
                let software: Vec<String> = node
                    .install
                    .iter()
                    .map(|s| format!("{} {}", s.name, s.version))
                    .collect();
                println!("  - {} ({}): {}", node.name, node.address(), software.join(", "));
            }
        }
        Err(e) => println!("Status:      invalid ({})", e),
    }

    Ok(())
}
