//! Remedy CLI Application
//!
//! Operator console for remediation deployments: fetch a plan from the
//! analysis service, deploy it and follow the executor live.

mod args;
mod cli;
mod renderer;

use std::path::Path;

use anyhow::{Context, Result};
use args::{Args, Commands};
use clap::Parser;
use cli::Cli;
use log::info;
use remedy_core::EngineConfig;
use renderer::TerminalRenderer;
use Commands::*;

/// Loads the configuration file and applies command-line overrides.
fn load_config(
    path: Option<&Path>,
    executor_url: Option<String>,
    analysis_url: Option<String>,
) -> Result<EngineConfig> {
    let mut config = EngineConfig::load(path).context("Failed to load configuration")?;
    if let Some(url) = executor_url {
        config.executor_url = url;
    }
    if let Some(url) = analysis_url {
        config.analysis_url = Some(url);
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let Args {
        config,
        executor_url,
        analysis_url,
        no_color,
        command,
    } = Args::parse();

    let config = load_config(config.as_deref(), executor_url, analysis_url)?;
    let cli = Cli::new(config, TerminalRenderer::new(!no_color));

    info!("Remedy started");

    match command {
        Analyze(args) => cli.analyze(args).await,
        Plan { command } => cli.handle_plan_command(command),
        Deploy(args) => cli.deploy(args).await,
        Status(args) => cli.status(args).await,
    }
}
