//! Run command - Drive a wizard through a flow's script.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::{info, warn};

use wizard_core::{
    AdvanceOptions, FinishOptions, StepStatus, Transition, WizardConfig, WizardController,
    WizardHost, WizardSession, WizardSnapshot,
};

use crate::flow::{parse_assignment, Action, FlowContext, FlowFile, FlowProvider};

#[derive(Args)]
pub struct RunArgs {
    /// Path to the flow file
    #[arg(short, long)]
    pub flow: PathBuf,

    /// Engine configuration file, overrides the flow's `config` section
    #[arg(short, long, env = "WIZARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print the final snapshot as JSON
    #[arg(long)]
    pub json: bool,

    /// Override a context entry before the run (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,
}

/// Prints the close notification.
struct ConsoleHost {
    detail_available: bool,
    quiet: bool,
}

impl WizardHost for ConsoleHost {
    fn on_close(&self, show_detail: bool) {
        if !self.quiet {
            if show_detail {
                println!("🏁 Wizard closed, opening detail view");
            } else {
                println!("🏁 Wizard closed");
            }
        }
    }

    fn show_detail_available(&self) -> bool {
        self.detail_available
    }
}

pub async fn execute(args: RunArgs, quiet: bool) -> Result<()> {
    info!("Running flow: {}", args.flow.display());

    let flow = FlowFile::load(&args.flow)?;
    let report = flow.check();
    for warning in &report.warnings {
        warn!("{}", warning);
    }
    if !report.is_valid() {
        for error in &report.errors {
            eprintln!("   - {}", error);
        }
        bail!("Flow validation failed: {} error(s)", report.errors.len());
    }

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => flow.config.clone(),
    };

    let mut context = flow.context.clone();
    for assignment in &args.overrides {
        let (key, value) = parse_assignment(assignment)
            .with_context(|| format!("Invalid --set argument: {}", assignment))?;
        context.insert(key, value);
    }

    let actions = flow.actions()?;
    let provider = FlowProvider::new(&flow);
    let host = ConsoleHost {
        detail_available: flow.detail_available,
        quiet,
    };
    let session = WizardSession::new(WizardController::new(config).with_host(Arc::new(host)));
    session.refresh(&provider, &context)?;

    if !quiet {
        println!("🧭 Flow '{}' ({} steps)", flow.name, session.snapshot().steps.len());
    }

    for (index, action) in actions.iter().enumerate() {
        if session.is_closed() {
            warn!(
                "Wizard closed; ignoring {} remaining action(s)",
                actions.len() - index
            );
            break;
        }

        let outcome = perform(&session, action, &provider, &mut context).await?;
        if !quiet {
            println!("   [{:>2}] {:<16} {}", index + 1, action.to_string(), outcome);
        }
    }

    let snapshot = session.snapshot();
    if args.json {
        println!("{}", snapshot.to_json_pretty()?);
    } else if !quiet {
        print_summary(&snapshot);
    }

    Ok(())
}

async fn perform(
    session: &WizardSession,
    action: &Action,
    provider: &FlowProvider,
    context: &mut FlowContext,
) -> Result<String> {
    let transition = match action {
        Action::Next => session.next(AdvanceOptions::new()).await?,
        Action::Skip => session.next(AdvanceOptions::new().skip()).await?,
        Action::GoNext => session.next(AdvanceOptions::new().only_go_next()).await?,
        Action::Previous => session.previous()?,
        Action::Finish { show_detail } => {
            let mut options = FinishOptions::new();
            if *show_detail {
                options = options.show_detail();
            }
            session.finish(options).await?
        }
        Action::Set { key, value } => {
            context.insert(key.clone(), value.clone());
            session.refresh(provider, context)?;
            let snapshot = session.snapshot();
            return Ok(format!(
                "re-derived {} steps, active {}",
                snapshot.steps.len(),
                snapshot
                    .active
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "none".to_string())
            ));
        }
        Action::Loading(loading) => {
            session.set_loading(*loading);
            return Ok(format!("loading={}", loading));
        }
    };

    Ok(describe(&transition))
}

fn describe(transition: &Transition) -> String {
    let icon = if transition.is_applied() {
        "✅"
    } else {
        match transition {
            Transition::Abandoned { .. } => "❌",
            _ => "⏸️ ",
        }
    };
    format!("{} {}", icon, transition)
}

fn load_config(path: &Path) -> Result<WizardConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Config file not found: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Invalid config file: {}", path.display()))
}

fn print_summary(snapshot: &WizardSnapshot) {
    println!();
    println!("📊 Summary:");
    for step in &snapshot.steps {
        let icon = match step.status {
            StepStatus::Done => "✅",
            StepStatus::Skipped => "⏭️ ",
            StepStatus::Active => "▶️ ",
            StepStatus::NotStarted => "⬜",
        };
        println!("   {} {:<16} {}", icon, step.id.to_string(), step.status);
    }
    println!(
        "   {} done, {} skipped, closed: {}",
        snapshot.count(StepStatus::Done),
        snapshot.count(StepStatus::Skipped),
        snapshot.closed
    );
}
