//! Session routing inspection.

use clap::Args;
use hotmic_config::{SessionConfig, validate_session};
use hotmic_core::{ChannelConfig, Engine, PluginRegistry, RoutingError, TapPoint};
use std::path::PathBuf;

#[derive(Args)]
pub struct RoutingArgs {
    /// Session file (TOML)
    #[arg(value_name = "SESSION")]
    session: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: RoutingArgs) -> anyhow::Result<()> {
    let session = SessionConfig::load(&args.session)?;
    let registry = PluginRegistry::new();

    let problems = match validate_session(&session, &registry) {
        Ok(()) => Vec::new(),
        Err(hotmic_config::ValidationError::Multiple(all)) => all,
        Err(e) => vec![e],
    };

    // Built without validation so that cycles can still be shown.
    let (mut engine, _processor) = Engine::new(session.engine_settings());
    for channel in &session.channels {
        if let Err(e) = engine.restore_channel(channel, &registry) {
            tracing::warn!(channel = %channel.name, error = %e, "channel kept empty");
            engine.add_channel(&channel.name)?;
        }
    }
    let plan = engine.rebuild_routing_graph();
    let edges = engine.routing_edges();
    let configs = engine.channel_configs();

    if args.json {
        let report = serde_json::json!({
            "session": session.name,
            "sample_rate": session.sample_rate,
            "block_size": session.effective_block_size(),
            "quality": session.quality.name(),
            "channels": configs.iter().map(|c| serde_json::json!({
                "name": c.name,
                "plugins": c.plugins.iter().map(|p| serde_json::json!({
                    "instance_id": p.instance_id,
                    "type": p.plugin_id,
                    "bypassed": p.bypassed,
                })).collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
            "edges": edges,
            "processing_order": plan.processing_order,
            "cycle": plan.diagnostic.as_ref().map(|e| match e {
                RoutingError::Cycle { channels } => channels.clone(),
            }),
            "latency_samples": engine.latency_samples(),
            "problems": problems.iter().map(ToString::to_string).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "Session: {} ({} channels, {} Hz, block {}, {})",
        session.name,
        configs.len(),
        session.sample_rate,
        session.effective_block_size(),
        session.quality.name()
    );
    println!();
    println!("Channels:");
    for (index, channel) in configs.iter().enumerate() {
        print_channel(index, channel, &registry);
    }

    println!();
    if edges.is_empty() {
        println!("Routing edges: none");
    } else {
        println!("Routing edges:");
        for (from, to) in &edges {
            println!("  {from} -> {to}");
        }
    }

    let order: Vec<String> = plan.processing_order.iter().map(ToString::to_string).collect();
    println!("Processing order: {}", order.join(" -> "));
    if let Some(RoutingError::Cycle { channels }) = &plan.diagnostic {
        println!("Cycle: channels {channels:?} run in declaration order");
    }
    println!("Latency: {} samples", engine.latency_samples());

    let tap = session.routing;
    match tap.tap {
        TapPoint::Output => println!("Analysis tap: channel {} output", tap.tap_channel),
        TapPoint::Plugin { instance_id } => println!(
            "Analysis tap: channel {} after plugin {}",
            tap.tap_channel, instance_id
        ),
    }

    if !problems.is_empty() {
        println!();
        println!("Problems:");
        for problem in &problems {
            println!("  {problem}");
        }
    }
    Ok(())
}

fn print_channel(index: usize, channel: &ChannelConfig, registry: &PluginRegistry) {
    let mut flags = Vec::new();
    if channel.muted {
        flags.push("muted");
    }
    if channel.soloed {
        flags.push("solo");
    }
    println!(
        "  [{index}] {}  in {:+.1} dB  out {:+.1} dB{}",
        channel.name,
        channel.input_gain_db,
        channel.output_gain_db,
        if flags.is_empty() {
            String::new()
        } else {
            format!("  ({})", flags.join(", "))
        }
    );
    for plugin in &channel.plugins {
        let name = registry.get(&plugin.plugin_id).map_or("?", |d| d.name);
        println!(
            "      {:>3}  {:16} {}{}",
            plugin.instance_id,
            plugin.plugin_id,
            name,
            if plugin.bypassed { "  (bypassed)" } else { "" }
        );
    }
}
