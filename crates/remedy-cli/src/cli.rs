//! Command handlers for the remedy binary.
//!
//! Each handler loads what it needs from the core crate, runs the operation
//! and renders the result as markdown through the [`TerminalRenderer`]. The
//! `deploy` handler stays attached to the deployment: it renders every state
//! change, prints notices and forwards operator commands read from stdin.

use std::{fs, path::Path, str::FromStr};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use remedy_core::{
    display::OperationStatus, AnalysisService, ControllerBuilder, Deployment,
    DeploymentController, DeploymentId, DeploymentView, EngineConfig, HttpAnalysisClient,
    HttpExecutor, Notice, Plan, RemoteExecutor, StartRequest,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};

use crate::{
    args::{AnalyzeArgs, DeployArgs, PlanCommands, StatusArgs},
    renderer::TerminalRenderer,
};

/// Output lines kept in the live view.
const OUTPUT_TAIL: usize = 20;

/// A line typed by the operator while a deployment is followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    Pause,
    Resume,
    Cancel,
    Rollback,
    /// 1-based step number, as shown in the view
    Skip(usize),
    Refresh,
    Status,
    Quit,
}

impl FromStr for OperatorCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let command = words.next().unwrap_or_default().to_lowercase();
        let argument = words.next();
        if words.next().is_some() {
            return Err(format!("Too many arguments: {}", s.trim()));
        }

        let parsed = match command.as_str() {
            "pause" | "p" => OperatorCommand::Pause,
            "resume" | "r" => OperatorCommand::Resume,
            "cancel" | "c" => OperatorCommand::Cancel,
            "rollback" => OperatorCommand::Rollback,
            "skip" | "s" => {
                let number = argument
                    .ok_or_else(|| "Usage: skip N".to_string())?
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| "Step number must be a positive integer".to_string())?;
                return Ok(OperatorCommand::Skip(number));
            }
            "refresh" => OperatorCommand::Refresh,
            "status" | "st" => OperatorCommand::Status,
            "quit" | "q" | "exit" => OperatorCommand::Quit,
            "" => return Err("Empty command".to_string()),
            other => return Err(format!("Unknown command: {other}")),
        };
        match argument {
            Some(_) => Err(format!("{command} takes no arguments")),
            None => Ok(parsed),
        }
    }
}

pub struct Cli {
    config: EngineConfig,
    renderer: TerminalRenderer,
}

impl Cli {
    pub fn new(config: EngineConfig, renderer: TerminalRenderer) -> Self {
        Self { config, renderer }
    }

    pub async fn analyze(&self, args: AnalyzeArgs) -> Result<()> {
        let client =
            HttpAnalysisClient::new(&self.config).context("Failed to create analysis client")?;
        let plan = client
            .analyze(&args.incident, args.provider.into())
            .await
            .with_context(|| format!("Failed to analyze incident {}", args.incident))?;

        self.renderer.render(&plan.to_string())?;

        if let Some(path) = args.save {
            let json = serde_json::to_string_pretty(&plan).context("Failed to encode plan")?;
            fs::write(&path, json)
                .with_context(|| format!("Failed to write plan to {}", path.display()))?;
            let status = OperationStatus::success(format!("Plan saved to {}", path.display()));
            self.renderer.render(&format!("\n{status}"))?;
        }
        Ok(())
    }

    pub fn handle_plan_command(&self, command: PlanCommands) -> Result<()> {
        match command {
            PlanCommands::Show(args) => {
                let plan = load_plan(&args.file)?;
                self.renderer.render(&plan.to_string())
            }
        }
    }

    pub async fn status(&self, args: StatusArgs) -> Result<()> {
        let executor = HttpExecutor::new(&self.config).context("Failed to create executor client")?;
        let id = DeploymentId::from(args.id.as_str());
        let report = executor
            .fetch_status(&id)
            .await
            .with_context(|| format!("Failed to fetch status of deployment {id}"))?;
        self.renderer
            .render(&format!("# Deployment {id}\n\n{report}"))
    }

    /// Starts the deployment and follows it until it settles, the operator
    /// quits or Ctrl-C cancels it.
    pub async fn deploy(&self, args: DeployArgs) -> Result<()> {
        let plan = load_plan(&args.plan)?;
        let controller = ControllerBuilder::new()
            .with_config(self.config.clone())
            .build()
            .context("Failed to initialize deployment controller")?;

        let mut snapshots = controller.subscribe();
        let mut notices = controller.notices();
        let started = controller
            .start(StartRequest {
                incident_id: args.incident,
                plan,
                mode: args.mode.into(),
            })
            .await;
        let id = match started {
            Ok(id) => id,
            Err(e) => {
                if e.is_retryable() {
                    warn!("Nothing was started; the request can be retried");
                }
                return Err(e).context("Failed to start deployment");
            }
        };
        info!("Following deployment {id}");
        self.renderer
            .render(&OperationStatus::success(format!("Deployment {id} submitted")).to_string())?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;
        let mut offered_rollback = false;

        loop {
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let deployment = snapshots.borrow_and_update().clone();
                    let Some(deployment) = deployment else { continue };
                    self.render_view(&deployment)?;

                    if deployment.status.is_terminal() {
                        if stdin_open && deployment.can_roll_back() {
                            if !offered_rollback {
                                offered_rollback = true;
                                self.renderer.render(
                                    "Type `rollback` to undo the applied steps or `quit` to exit.\n",
                                )?;
                            }
                        } else {
                            break;
                        }
                    }
                }
                notice = notices.recv() => match notice {
                    Ok(notice) => self.render_notice(&notice)?,
                    Err(RecvError::Lagged(missed)) => warn!("Missed {missed} notices"),
                    Err(RecvError::Closed) => break,
                },
                line = lines.next_line(), if stdin_open => match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => match line.parse::<OperatorCommand>() {
                        Ok(OperatorCommand::Quit) => break,
                        Ok(command) => self.run_operator_command(&controller, command).await?,
                        Err(message) => {
                            self.renderer.render(&OperationStatus::failure(message).to_string())?;
                        }
                    },
                    Ok(None) => {
                        debug!("Operator input closed");
                        stdin_open = false;
                        if controller.status().is_terminal() {
                            break;
                        }
                    }
                    Err(e) => return Err(e).context("Failed to read operator input"),
                },
                signal = tokio::signal::ctrl_c() => {
                    signal.context("Failed to listen for Ctrl-C")?;
                    if controller.status().is_active() {
                        self.run_operator_command(&controller, OperatorCommand::Cancel).await?;
                    }
                    break;
                }
            }
        }

        if let Err(e) = controller.shutdown().await {
            debug!("Controller already stopped: {e}");
        }
        // Notices raised alongside the final state change
        while let Ok(notice) = notices.try_recv() {
            self.render_notice(&notice)?;
        }
        Ok(())
    }

    async fn run_operator_command(
        &self,
        controller: &DeploymentController,
        command: OperatorCommand,
    ) -> Result<()> {
        let outcome = match command {
            OperatorCommand::Pause => controller.pause().await.map(|()| "pause"),
            OperatorCommand::Resume => controller.resume().await.map(|()| "resume"),
            OperatorCommand::Cancel => controller.cancel().await.map(|()| "cancel"),
            OperatorCommand::Rollback => controller.rollback().await.map(|()| "rollback"),
            OperatorCommand::Skip(number) => {
                controller.skip_step(number - 1).await.map(|()| "skip")
            }
            OperatorCommand::Refresh => controller.refresh().await.map(|_| "refresh"),
            OperatorCommand::Status => {
                return match controller.snapshot() {
                    Some(deployment) => self.render_view(&deployment),
                    None => self.renderer.render("No deployment yet.\n"),
                };
            }
            OperatorCommand::Quit => return Ok(()),
        };

        let status = match outcome {
            Ok(command) => OperationStatus::now(command, controller.status()),
            Err(e) => OperationStatus::from(&e),
        };
        self.renderer.render(&status.to_string())
    }

    fn render_notice(&self, notice: &Notice) -> Result<()> {
        if notice.is_warning() {
            self.renderer.render(&format!("> {notice}\n"))
        } else {
            self.renderer.render(&format!("{notice}\n"))
        }
    }

    fn render_view(&self, deployment: &Deployment) -> Result<()> {
        let view = DeploymentView::new(deployment).tail(OUTPUT_TAIL);
        self.renderer.render(&view.to_string())
    }
}

fn load_plan(path: &Path) -> Result<Plan> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan file {}", path.display()))?;
    Plan::from_json(&json).with_context(|| format!("Failed to load plan from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_operator_commands() {
        assert_eq!("pause".parse(), Ok(OperatorCommand::Pause));
        assert_eq!("  Resume ".parse(), Ok(OperatorCommand::Resume));
        assert_eq!("skip 3".parse(), Ok(OperatorCommand::Skip(3)));
        assert_eq!("q".parse(), Ok(OperatorCommand::Quit));
        assert_eq!("refresh".parse(), Ok(OperatorCommand::Refresh));
    }

    #[test]
    fn test_parse_operator_command_errors() {
        assert!("skip".parse::<OperatorCommand>().is_err());
        assert!("skip 0".parse::<OperatorCommand>().is_err());
        assert!("skip two".parse::<OperatorCommand>().is_err());
        assert!("pause now".parse::<OperatorCommand>().is_err());
        assert_eq!(
            "deploy".parse::<OperatorCommand>(),
            Err("Unknown command: deploy".to_string())
        );
    }

    #[test]
    fn test_load_plan_reports_invalid_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        fs::write(&path, r#"{"provider": "claude", "steps": []}"#).unwrap();

        let error = load_plan(&path).unwrap_err();
        assert!(error.to_string().starts_with("Failed to load plan from"));
    }
}
