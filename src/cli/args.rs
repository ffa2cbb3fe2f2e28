//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Multi-provider text generation with quota-aware failover.
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    // === Global flags ===
    /// Config file (default: platform config dir, or FOLIO_CONFIG)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the effective output format.
    #[must_use]
    pub const fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate text for one request
    Dispatch(DispatchArgs),

    /// Refine a text file until it passes the quality check
    Refine(RefineArgs),

    /// Show candidate models in dispatch order
    Models(ModelsArgs),

    /// Show quota and cooldown state per model
    Quota(QuotaArgs),

    /// Check provider credentials and reachability
    Doctor(DoctorArgs),
}

/// Arguments for the `dispatch` command.
#[derive(Parser, Debug)]
pub struct DispatchArgs {
    /// Prompt text; read from stdin when omitted or "-"
    pub prompt: Option<String>,

    /// Task type used to pick candidate models
    #[arg(short, long, default_value = "general")]
    pub task: String,

    /// System prompt
    #[arg(long, value_name = "TEXT")]
    pub system: Option<String>,

    /// Sampling temperature (0.0-2.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Maximum output tokens
    #[arg(long, value_name = "N")]
    pub max_tokens: Option<u32>,

    /// Try this model (provider/name) first
    #[arg(short, long, value_name = "MODEL")]
    pub model: Option<String>,

    /// With --model, fail instead of falling back to other models
    #[arg(long, requires = "model")]
    pub no_fallback: bool,

    /// Retries per model for transient failures
    #[arg(long, value_name = "N")]
    pub retry_budget: Option<u32>,

    /// Request JSON output constrained by the schema in this file
    #[arg(long, value_name = "FILE")]
    pub schema: Option<PathBuf>,
}

/// Arguments for the `refine` command.
#[derive(Parser, Debug)]
pub struct RefineArgs {
    /// Text file to refine
    pub file: PathBuf,

    /// Title passed to prompts (default: file stem)
    #[arg(long)]
    pub title: Option<String>,

    /// Write the result here instead of stdout
    #[arg(short, long, value_name = "PATH", conflicts_with = "in_place")]
    pub output: Option<PathBuf>,

    /// Overwrite the input file, keeping a .bak copy
    #[arg(long)]
    pub in_place: bool,

    /// Minimum words for acceptance
    #[arg(long, value_name = "N")]
    pub min_words: Option<usize>,

    /// Rewrite budget
    #[arg(long, value_name = "N")]
    pub max_attempts: Option<u32>,
}

/// Arguments for the `models` command.
#[derive(Parser, Debug)]
pub struct ModelsArgs {
    /// Show candidates for this task type instead of the full table
    #[arg(short, long)]
    pub task: Option<String>,
}

/// Arguments for the `quota` command.
#[derive(Parser, Debug)]
pub struct QuotaArgs {
    /// Only show this model
    #[arg(short, long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Also list this many recent attempts
    #[arg(long, value_name = "N", default_value = "0")]
    pub attempts: usize,
}

/// Arguments for the `doctor` command.
#[derive(Parser, Debug)]
pub struct DoctorArgs {
    /// Only check specific provider(s)
    #[arg(short, long, value_name = "PROVIDER")]
    pub provider: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn json_flag_overrides_format() {
        let cli = Cli::parse_from(["folio", "--json", "models"]);
        assert_eq!(cli.effective_format(), OutputFormat::Json);
    }

    #[test]
    fn dispatch_parses_options() {
        let cli = Cli::parse_from([
            "folio",
            "dispatch",
            "--task",
            "creative",
            "--model",
            "groq/llama-3.3-70b-versatile",
            "--no-fallback",
            "Write a haiku",
        ]);
        let Commands::Dispatch(args) = cli.command else {
            panic!("expected dispatch");
        };
        assert_eq!(args.task, "creative");
        assert!(args.no_fallback);
        assert_eq!(args.prompt.as_deref(), Some("Write a haiku"));
    }

    #[test]
    fn no_fallback_requires_model() {
        assert!(Cli::try_parse_from(["folio", "dispatch", "--no-fallback", "hi"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["folio", "quota", "--log-level", "debug", "--attempts", "5"]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        let Commands::Quota(args) = cli.command else {
            panic!("expected quota");
        };
        assert_eq!(args.attempts, 5);
    }
}
