use std::fmt;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum OutputFormat {
    Plain,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Plain => write!(f, "plain"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum ModeArg {
    /// Single perspective, no analysis phase.
    Fast,
    /// Full multi-perspective pipeline.
    Deep,
}

impl From<ModeArg> for seeker_types::Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Fast => seeker_types::Mode::Fast,
            ModeArg::Deep => seeker_types::Mode::Deep,
        }
    }
}

/// Deep-research agent: multi-perspective search, cross-validation and
/// cited report synthesis from the terminal.
#[derive(Debug, Parser)]
#[command(name = "seeker", version, about)]
pub struct Cli {
    /// Run one research query and exit (otherwise start interactive mode).
    #[arg(long)]
    pub query: Option<String>,

    /// Override the LLM model.
    #[arg(long)]
    pub model: Option<String>,

    /// Maximum concurrent workers.
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Verbose progress output (also VERBOSE=1).
    #[arg(long)]
    pub verbose: bool,

    /// Write finished reports into this vault directory.
    #[arg(long)]
    pub vault: Option<PathBuf>,

    /// Attach to an existing session for follow-up questions.
    #[arg(long)]
    pub session: Option<String>,

    /// Research depth.
    #[arg(long, value_enum, default_value_t = ModeArg::Deep)]
    pub mode: ModeArg,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect stored research sessions.
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// List all sessions, newest first.
    List {
        #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,
    },
    /// Show one session snapshot.
    Show {
        /// Session id (UUID).
        id: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,
    },
    /// Convert a legacy snapshot file into an event log.
    Migrate {
        /// Path to the legacy JSON snapshot.
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_one_shot_flags() {
        let cli = Cli::parse_from([
            "seeker",
            "--query",
            "what is rust",
            "--model",
            "openai/gpt-4o",
            "--max-workers",
            "3",
            "--mode",
            "fast",
            "--verbose",
        ]);
        assert_eq!(cli.query.as_deref(), Some("what is rust"));
        assert_eq!(cli.max_workers, Some(3));
        assert_eq!(cli.mode, ModeArg::Fast);
        assert!(cli.verbose);
    }

    #[test]
    fn parses_session_subcommands() {
        let cli = Cli::parse_from(["seeker", "session", "list", "--format", "json"]);
        match cli.command {
            Some(Command::Session {
                command: SessionCommand::List { format },
            }) => assert_eq!(format, OutputFormat::Json),
            other => panic!("unexpected {other:?}"),
        }
    }
}
