//! Command-line argument definitions using clap.
//!
//! Clap-specific types stay here and are converted into core types with
//! `From` impls, so `remedy-core` never depends on clap:
//!
//! ```text
//! User Input → CLI Args (clap) → Core types → DeploymentController
//! ```

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use remedy_core::{ExecutionMode, Provider};

/// Operator console for supervised remediation deployments
///
/// Remedy asks an analysis service for a remediation plan, hands the plan to
/// a remote executor and follows the deployment live, letting the operator
/// pause, resume, cancel, roll back or skip steps while it runs.
#[derive(Parser)]
#[command(version, about, name = "remedy")]
pub struct Args {
    /// Path to the configuration file. Defaults to
    /// $XDG_CONFIG_HOME/remedy/config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of the remote executor, overriding the configuration file
    #[arg(long, global = true)]
    pub executor_url: Option<String>,

    /// Base URL of the analysis service, overriding the configuration file
    #[arg(long, global = true)]
    pub analysis_url: Option<String>,

    /// Disable colored output and use plain text
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask the analysis service for a remediation plan
    #[command(alias = "a")]
    Analyze(AnalyzeArgs),
    /// Inspect plan documents
    #[command(alias = "p")]
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Submit a plan and follow the deployment live
    #[command(alias = "d")]
    Deploy(DeployArgs),
    /// Fetch the executor's current view of a deployment
    #[command(alias = "s")]
    Status(StatusArgs),
}

#[derive(ClapArgs)]
pub struct AnalyzeArgs {
    #[arg(long, help = "Identifier of the incident to analyze")]
    pub incident: String,
    #[arg(long, value_enum, default_value_t = ProviderArg::Claude)]
    pub provider: ProviderArg,
    /// Write the plan as JSON so it can be deployed later
    #[arg(long, help = "Write the plan as JSON to this file")]
    pub save: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Render a plan document
    #[command(alias = "s")]
    Show(ShowPlanArgs),
}

#[derive(ClapArgs)]
pub struct ShowPlanArgs {
    #[arg(help = "Path to a plan JSON document")]
    pub file: PathBuf,
}

/// Submit a plan and follow the deployment
///
/// While the deployment runs, operator commands are read from stdin one per
/// line: pause, resume, cancel, rollback, skip N, refresh, status, quit.
/// Ctrl-C cancels the deployment.
#[derive(ClapArgs)]
pub struct DeployArgs {
    #[arg(long, help = "Identifier of the incident being remediated")]
    pub incident: String,
    #[arg(long, help = "Path to a plan JSON document")]
    pub plan: PathBuf,
    #[arg(long, value_enum, default_value_t = ModeArg::Automatic)]
    pub mode: ModeArg,
}

#[derive(ClapArgs)]
pub struct StatusArgs {
    #[arg(help = "Identifier assigned by the executor")]
    pub id: String,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum ProviderArg {
    Claude,
    Openai,
    Gemini,
    Local,
}

impl From<ProviderArg> for Provider {
    fn from(val: ProviderArg) -> Self {
        match val {
            ProviderArg::Claude => Provider::Claude,
            ProviderArg::Openai => Provider::OpenAi,
            ProviderArg::Gemini => Provider::Gemini,
            ProviderArg::Local => Provider::Local,
        }
    }
}

/// How the executor advances between steps.
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Run every step back to back
    Automatic,
    /// Wait for the operator between steps
    Supervised,
}

impl From<ModeArg> for ExecutionMode {
    fn from(val: ModeArg) -> Self {
        match val {
            ModeArg::Automatic => ExecutionMode::Automatic,
            ModeArg::Supervised => ExecutionMode::Supervised,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_deploy_defaults_to_automatic() {
        let args = Args::try_parse_from([
            "remedy",
            "deploy",
            "--incident",
            "INC-1",
            "--plan",
            "plan.json",
        ])
        .unwrap();
        let Commands::Deploy(deploy) = args.command else {
            panic!("expected deploy command");
        };
        assert_eq!(ExecutionMode::from(deploy.mode), ExecutionMode::Automatic);
        assert_eq!(deploy.plan, PathBuf::from("plan.json"));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "remedy",
            "status",
            "dep-1",
            "--executor-url",
            "http://executor:8080",
            "--no-color",
        ])
        .unwrap();
        assert!(args.no_color);
        assert_eq!(args.executor_url.as_deref(), Some("http://executor:8080"));
    }
}
