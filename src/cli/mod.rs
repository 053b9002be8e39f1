//! CLI interface using clap
//!
//! Provides the command-line interface for rulescope

mod commands;

pub use commands::*;

use crate::repo::RulescopeConfig;
use clap::{Args, Parser, Subcommand};

/// rulescope - Business logic extraction and classification drift tracking
#[derive(Parser, Debug)]
#[command(name = "rulescope")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the source tree (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".", env = "RULESCOPE_PATH")]
    pub path: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json)
    #[arg(short = 'o', long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default configuration to .rulescope/config.toml
    Init(InitArgs),

    /// Extract, classify, diff against the last run and save a snapshot
    Run(RunArgs),

    /// Extract and classify without touching the snapshot store
    Extract(ExtractArgs),

    /// Show what changed since the last run without saving
    Diff(DiffArgs),

    /// List archived snapshots
    History,

    /// Watch for changes and re-run automatically
    Watch(WatchArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Arguments for init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Overwrite an existing configuration
    #[arg(short, long)]
    pub force: bool,
}

/// Assistant fallback switches and endpoint overrides
#[derive(Args, Debug, Clone, Default)]
pub struct AssistantArgs {
    /// Ask the assistant when heuristics are inconclusive
    #[arg(long, conflicts_with = "no_assistant")]
    pub assistant: bool,

    /// Never ask the assistant
    #[arg(long)]
    pub no_assistant: bool,

    /// Assistant endpoint (e.g. http://localhost:11434)
    #[arg(long, env = "RULESCOPE_LLM_ENDPOINT")]
    pub llm_endpoint: Option<String>,

    /// Assistant model name
    #[arg(long, env = "RULESCOPE_LLM_MODEL")]
    pub llm_model: Option<String>,

    /// Assistant API key
    #[arg(long, env = "RULESCOPE_LLM_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,
}

impl AssistantArgs {
    /// `Some` when a flag overrides the configured setting
    pub fn choice(&self) -> Option<bool> {
        if self.assistant {
            Some(true)
        } else if self.no_assistant {
            Some(false)
        } else {
            None
        }
    }

    /// Apply endpoint overrides on top of the loaded configuration
    pub fn apply(&self, config: &mut RulescopeConfig) {
        if let Some(ref endpoint) = self.llm_endpoint {
            config.llm.endpoint = Some(endpoint.clone());
        }
        if let Some(ref model) = self.llm_model {
            config.llm.model = Some(model.clone());
        }
        if let Some(ref key) = self.llm_api_key {
            config.llm.api_key = Some(key.clone());
        }
    }
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Ref that triggered the run
    #[arg(long = "ref", env = "RULESCOPE_REF")]
    pub git_ref: Option<String>,

    /// Commit id (defaults to HEAD when inside a git repository)
    #[arg(long, env = "RULESCOPE_COMMIT")]
    pub commit: Option<String>,

    /// Commit message
    #[arg(short, long, env = "RULESCOPE_MESSAGE")]
    pub message: Option<String>,

    #[command(flatten)]
    pub assistant: AssistantArgs,
}

/// Arguments for extract command
#[derive(Parser, Debug)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub assistant: AssistantArgs,
}

/// Arguments for diff command
#[derive(Parser, Debug)]
pub struct DiffArgs {
    #[command(flatten)]
    pub assistant: AssistantArgs,
}

/// Arguments for watch command
#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Debounce interval in milliseconds
    #[arg(short, long, default_value = "1000")]
    pub debounce: u64,

    #[command(flatten)]
    pub assistant: AssistantArgs,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Show current configuration
    #[arg(long)]
    pub show: bool,

    /// Reset to defaults
    #[arg(long)]
    pub reset: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_parsing() {
        let cli = Cli::parse_from([
            "rulescope",
            "run",
            "--ref",
            "refs/heads/main",
            "--commit",
            "abc123",
            "--no-assistant",
        ]);

        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.git_ref.as_deref(), Some("refs/heads/main"));
        assert_eq!(args.commit.as_deref(), Some("abc123"));
        assert_eq!(args.assistant.choice(), Some(false));
    }

    #[test]
    fn test_global_format() {
        let cli = Cli::parse_from(["rulescope", "extract", "--format", "json"]);
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Extract(_)));
    }

    #[test]
    fn test_assistant_flags_conflict() {
        let result =
            Cli::try_parse_from(["rulescope", "diff", "--assistant", "--no-assistant"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_init_command() {
        let cli = Cli::parse_from(["rulescope", "init", "--force"]);
        if let Commands::Init(args) = cli.command {
            assert!(args.force);
        }
    }

    #[test]
    fn test_assistant_overrides() {
        let args = AssistantArgs {
            llm_model: Some("qwen2.5".to_string()),
            ..Default::default()
        };
        let mut config = RulescopeConfig::default();
        args.apply(&mut config);
        assert_eq!(config.llm.model.as_deref(), Some("qwen2.5"));
        assert_eq!(args.choice(), None);
    }
}
