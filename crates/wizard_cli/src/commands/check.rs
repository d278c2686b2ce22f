//! Check command - Validate a flow file.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use tracing::info;

use wizard_core::{reconcile, StepProvider};

use crate::flow::{parse_assignment, FlowFile, FlowProvider};

#[derive(Args)]
pub struct CheckArgs {
    /// Path to the flow file
    #[arg(short, long)]
    pub flow: PathBuf,

    /// Override a context entry before deriving steps (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,
}

pub async fn execute(args: CheckArgs) -> Result<()> {
    info!("Checking flow: {}", args.flow.display());

    let flow = FlowFile::load(&args.flow)?;
    let report = flow.check();

    println!("📋 Flow '{}'", flow.name);
    if let Some(description) = &flow.description {
        println!("   {}", description);
    }

    for warning in &report.warnings {
        println!("   ⚠️  {}", warning);
    }

    if !report.is_valid() {
        println!("   ❌ Flow is invalid:");
        for error in &report.errors {
            println!("      - {}", error);
        }
        bail!("Flow validation failed: {} error(s)", report.errors.len());
    }

    let mut context = flow.context.clone();
    for assignment in &args.overrides {
        let (key, value) = parse_assignment(assignment)?;
        context.insert(key, value);
    }

    let states = reconcile(&[], FlowProvider::new(&flow).steps(&context))?;

    println!();
    println!("🧭 Derived steps ({}):", states.len());
    for state in &states {
        let mut markers = Vec::new();
        if state.is_active {
            markers.push("start");
        }
        if state.is_last {
            markers.push("last");
        }
        if state.descriptor.is_skippable {
            markers.push("skippable");
        }
        if state.descriptor.has_content() {
            markers.push("content");
        }

        if markers.is_empty() {
            println!("   - {:<16} {}", state.id(), state.label());
        } else {
            println!(
                "   - {:<16} {} [{}]",
                state.id(),
                state.label(),
                markers.join(", ")
            );
        }
    }

    println!();
    println!("✅ Flow is valid ({} script action(s))", flow.script.len());
    Ok(())
}
