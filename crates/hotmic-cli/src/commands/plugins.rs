//! Plugin listing and information command.

#![allow(clippy::print_literal)] // Table headers use literal strings

use clap::Args;
use hotmic_core::{ParameterInfo, PluginCategory, PluginRegistry};

#[derive(Args)]
pub struct PluginsArgs {
    /// Show parameters for one plugin
    #[arg(value_name = "PLUGIN")]
    plugin: Option<String>,
}

pub fn run(args: PluginsArgs) -> anyhow::Result<()> {
    let registry = PluginRegistry::new();

    if let Some(id) = &args.plugin {
        let descriptor = registry
            .get(id)
            .ok_or_else(|| anyhow::anyhow!("Unknown plugin: {id}. Run 'hotmic plugins' for the list."))?;
        let plugin = registry
            .create(id)
            .ok_or_else(|| anyhow::anyhow!("Plugin '{id}' could not be created"))?;

        println!("{} ({})", descriptor.name, descriptor.id);
        println!("{}", "=".repeat(descriptor.name.len() + descriptor.id.len() + 3));
        println!();
        println!("{}", descriptor.description);
        println!();

        if plugin.param_count() == 0 {
            println!("No parameters.");
            return Ok(());
        }
        println!("Parameters:");
        println!();
        println!("  {:>3}  {:12}  {:>10}  {}", "#", "Name", "Default", "Range");
        println!("  {:>3}  {:12}  {:>10}  {}", "-", "----", "-------", "-----");
        for index in 0..plugin.param_count() {
            let Some(p) = plugin.param_info(index) else {
                continue;
            };
            let suffix = p.unit.suffix();
            let default = format!("{}{}", p.default, suffix);
            println!(
                "  {:>3}  {:12}  {:>10}  {} .. {}{}",
                index, p.name, default, p.min, p.max, suffix
            );
        }
        println!();
        println!("Session file entry:");
        println!();
        println!("  [[channels.plugins]]");
        println!("  instance_id = 1");
        println!("  type = \"{}\"", descriptor.id);
        let defaults: Vec<String> = (0..plugin.param_count())
            .filter_map(|i| plugin.param_info(i))
            .map(|p| format!("{:?}", p.default))
            .collect();
        println!("  params = [{}]", defaults.join(", "));
        return Ok(());
    }

    println!("Available Plugins");
    println!("=================");
    for category in [PluginCategory::Routing, PluginCategory::Dynamics, PluginCategory::Utility] {
        let plugins = registry.in_category(category);
        if plugins.is_empty() {
            continue;
        }
        println!();
        println!("{}:", category.name());
        for descriptor in plugins {
            println!("  {:16} {}", descriptor.id, descriptor.description);
        }
    }
    println!();
    println!("Run 'hotmic plugins <PLUGIN>' for parameters.");
    Ok(())
}
