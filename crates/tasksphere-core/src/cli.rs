use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::query::StatusFilter;
use crate::task::TaskStatus;

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        let key = k.trim();
        if key.is_empty() {
            return Err(anyhow!("empty key in override: {s}"));
        }
        Ok(Self {
            key: key.to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tasksphere",
    version,
    about = "TaskSphere: a small personal task list",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Override a config key, e.g. `--set display.color=off`.
    #[arg(
        long = "set",
        value_name = "KEY=VALUE",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub overrides: Vec<KeyVal>,

    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Add a task. A due date needs both --due-date and --due-time.
    Add {
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,

        #[arg(long = "due-date", value_name = "YYYY-MM-DD")]
        due_date: Option<String>,

        #[arg(long = "due-time", value_name = "HH:MM")]
        due_time: Option<String>,
    },

    /// List tasks, newest first.
    #[command(alias = "ls")]
    List {
        #[arg(short = 's', long = "search", default_value = "")]
        search: String,

        #[arg(long = "status", default_value = "all", value_parser = parse_status_filter)]
        status: StatusFilter,
    },

    /// Show one task in full.
    Show { id: String },

    /// Replace a task's title.
    Edit {
        id: String,

        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },

    /// Set a task's status.
    Status {
        id: String,

        #[arg(value_parser = parse_status)]
        status: TaskStatus,
    },

    /// Complete an open task, or reopen a completed one.
    Toggle { id: String },

    /// Remove a task.
    #[command(alias = "rm")]
    Delete { id: String },

    /// Show or change the colour theme.
    Theme {
        #[arg(value_enum, default_value_t = ThemeAction::Show)]
        action: ThemeAction,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeAction {
    Show,
    Toggle,
    Dark,
    Light,
}

fn parse_status(s: &str) -> Result<TaskStatus, String> {
    s.parse::<TaskStatus>().map_err(|err| err.to_string())
}

fn parse_status_filter(s: &str) -> Result<StatusFilter, String> {
    s.parse::<StatusFilter>().map_err(|err| format!("{err:#}"))
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
