//! hotmic CLI - inspect sessions, render audio offline and analyse voice recordings.

mod commands;
mod wav;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hotmic")]
#[command(author, version, about = "hotmic microphone routing engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a session's channels, routing order and cycle diagnostics
    Routing(commands::routing::RoutingArgs),

    /// Run a session over a WAV file and write the stereo output mix
    Render(commands::render::RenderArgs),

    /// Run the voice analysis pipeline over a WAV file
    Analyze(commands::analyze::AnalyzeArgs),

    /// List built-in plugins and their parameters
    Plugins(commands::plugins::PluginsArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
    tracing_log::LogTracer::init().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Routing(args) => commands::routing::run(args),
        Commands::Render(args) => commands::render::run(args),
        Commands::Analyze(args) => commands::analyze::run(args),
        Commands::Plugins(args) => commands::plugins::run(args),
    }
}
