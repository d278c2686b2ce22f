//! CLI command definitions.
//!
//! `run` drives a wizard through a flow file's script; `check` validates a
//! flow file without running it.

use clap::{Parser, Subcommand};

pub mod check;
pub mod run;

/// Step wizard - scripted driver for the wizard engine
#[derive(Parser)]
#[command(name = "wizard")]
#[command(version, about = "Step wizard - scripted driver for the wizard engine")]
#[command(long_about = r#"
Drives a multi-step wizard described by a YAML flow file. Steps are derived
from a context map, re-derived whenever the script changes it, and may defer
their commit before the wizard moves on.

COMMANDS:
  run    → Walk the flow's script and print each transition
  check  → Validate a flow file and list the steps it derives

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Flow validation failure
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a flow's script against the wizard engine
    Run(run::RunArgs),

    /// Validate a flow file
    Check(check::CheckArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "wizard", "run", "--flow", "f.yaml", "--json", "--set", "a=1", "--set", "b=2",
        ])
        .unwrap();

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.flow.to_str(), Some("f.yaml"));
                assert!(args.json);
                assert_eq!(args.overrides, vec!["a=1", "b=2"]);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_check_with_global_flags() {
        let cli = Cli::try_parse_from(["wizard", "check", "--flow", "f.yaml", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Check(_)));

        assert!(Cli::try_parse_from(["wizard", "run"]).is_err());
    }
}
