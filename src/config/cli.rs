use crate::utils::error::Result;
use crate::utils::validation::{validate_non_empty_string, validate_required_field, Validate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "rwe-planner")]
#[command(about = "Orchestrates analytic services into a real-world-evidence study plan")]
pub struct CliConfig {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the HTTP orchestrator
    Serve {
        /// Override `server.bind_address`
        #[arg(long)]
        bind: Option<String>,

        /// Include internal error details in 500 responses
        #[arg(long)]
        expose_errors: bool,
    },

    /// Produce a study plan from a StudyRequest JSON file
    Plan {
        #[arg(short, long)]
        request: PathBuf,

        /// Print the stage execution summary after the plan
        #[arg(long)]
        summary: bool,
    },

    /// Score a protocol and print the quick recommendation
    Quick {
        #[arg(long, conflicts_with = "protocol_file")]
        protocol_text: Option<String>,

        #[arg(long)]
        protocol_file: Option<PathBuf>,
    },

    /// Report the health of every registered backend
    Status,
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        match &self.command {
            Command::Serve {
                bind: Some(bind), ..
            } => validate_non_empty_string("bind", bind),
            Command::Quick {
                protocol_text,
                protocol_file: None,
            } => {
                let text = validate_required_field("protocol_text", protocol_text)?;
                validate_non_empty_string("protocol_text", text)
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::PlannerError;

    #[test]
    fn test_parse_plan_command() {
        let cli = CliConfig::parse_from([
            "rwe-planner",
            "--config",
            "planner.toml",
            "plan",
            "--request",
            "study.json",
            "--summary",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("planner.toml")));
        assert!(matches!(cli.command, Command::Plan { summary: true, .. }));
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_quick_requires_protocol_source() {
        let cli = CliConfig::parse_from(["rwe-planner", "quick"]);
        assert!(matches!(
            cli.validate(),
            Err(PlannerError::MissingConfigError { ref field }) if field == "protocol_text"
        ));

        let cli = CliConfig::parse_from(["rwe-planner", "quick", "--protocol-text", "  "]);
        assert!(cli.validate().is_err());

        let cli = CliConfig::parse_from(["rwe-planner", "quick", "--protocol-file", "p.txt"]);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_quick_sources_conflict() {
        let result = CliConfig::try_parse_from([
            "rwe-planner",
            "quick",
            "--protocol-text",
            "x",
            "--protocol-file",
            "p.txt",
        ]);
        assert!(result.is_err());
    }
}
