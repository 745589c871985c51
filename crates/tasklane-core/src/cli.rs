use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tasklane_shared::TaskPriority;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

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
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tasklane",
    version,
    about = "Tasklane: a team task calendar with a drag-and-drop todo lane",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "rc-file")]
    pub rc_file: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Month grid with the number of tasks on each day.
    Calendar {
        /// `YYYY-MM`; defaults to the current month.
        month: Option<String>,
    },
    /// Each day of a week with its tasks.
    Week {
        /// Any day inside the week; defaults to today.
        date: Option<String>,
        /// Weeks to move forward (or back, when negative).
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        shift: i32,
    },
    /// Tasks placed on one day.
    Day {
        date: String,
        #[arg(long)]
        employee: Option<String>,
        /// Only tasks assigned to the configured user.
        #[arg(long)]
        mine: bool,
    },
    /// Create a task directly on a day.
    Add(AddArgs),
    /// Reschedule a task to another day.
    Move { task: String, date: String },
    #[command(subcommand)]
    Todo(TodoCommand),
    /// Turn a todo into a task on a day.
    Drop {
        todo: String,
        date: String,
        /// Keep the todo in the list.
        #[arg(long)]
        copy: bool,
    },
    /// Move a task to the trash.
    Trash { task: String },
    /// Delete a task permanently.
    Delete { task: String },
    /// Bring a task back from the trash.
    Restore { task: String },
    #[command(name = "trash-list")]
    TrashList,
    /// Permanently delete everything in the trash.
    Purge,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    pub title: String,
    #[arg(long = "on")]
    pub on: String,
    #[arg(long, value_parser = parse_priority)]
    pub priority: Option<TaskPriority>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub assign: Option<String>,
    #[arg(long)]
    pub hours: Option<f64>,
    #[command(flatten)]
    pub files: AttachArgs,
}

#[derive(Args, Debug, Clone)]
pub struct TodoAddArgs {
    pub title: String,
    #[arg(long, value_parser = parse_priority)]
    pub priority: Option<TaskPriority>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub hours: Option<f64>,
    #[command(flatten)]
    pub files: AttachArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct AttachArgs {
    /// Local file to upload; repeatable.
    #[arg(long = "attach", action = ArgAction::Append)]
    pub attach: Vec<PathBuf>,
    #[arg(long = "link", action = ArgAction::Append)]
    pub link: Vec<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TodoCommand {
    Add(TodoAddArgs),
    List,
    /// Toggle completion.
    Done { todo: String },
    Rm { todo: String },
}

fn parse_priority(raw: &str) -> Result<TaskPriority, String> {
    raw.parse()
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

/// Pulls bare `rc.key=value` (or `rc.key:value`) tokens out of argv so they
/// can sit anywhere on the command line.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest.split_once('=').or_else(|| rest.split_once(':'));
            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k.to_string(), v.to_string()));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<OsString> {
        items.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_lifted_out() {
        let pre = preprocess_args(&args(&["tasklane", "rc.user.role=member", "todo", "list"]))
            .expect("preprocess");
        assert_eq!(
            pre.rc_overrides,
            vec![("user.role".to_string(), "member".to_string())]
        );
        assert_eq!(pre.cleaned_args, args(&["tasklane", "todo", "list"]));
    }

    #[test]
    fn parses_drop_with_copy() {
        let cli = GlobalCli::try_parse_from(["tasklane", "-v", "drop", "1a2b", "2024-06-10", "--copy"])
            .expect("parse");
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Some(Command::Drop { todo, date, copy }) => {
                assert_eq!(todo, "1a2b");
                assert_eq!(date, "2024-06-10");
                assert!(copy);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_add_with_repeated_attachments() {
        let cli = GlobalCli::try_parse_from([
            "tasklane",
            "--rc",
            "color=off",
            "add",
            "Review docs",
            "--on",
            "2024-06-10",
            "--priority",
            "high",
            "--link",
            "http://a",
            "--link",
            "http://b",
        ])
        .expect("parse");
        assert_eq!(cli.rc_overrides[0].key, "color");
        let Some(Command::Add(add)) = cli.command else {
            panic!("expected add");
        };
        assert_eq!(add.priority, Some(TaskPriority::High));
        assert_eq!(add.files.link.len(), 2);
    }

    #[test]
    fn week_accepts_negative_shift() {
        let cli = GlobalCli::try_parse_from(["tasklane", "week", "--shift", "-2"]).expect("parse");
        let Some(Command::Week { date, shift }) = cli.command else {
            panic!("expected week");
        };
        assert_eq!(date, None);
        assert_eq!(shift, -2);
    }

    #[test]
    fn todo_add_needs_no_day() {
        let cli = GlobalCli::try_parse_from(["tasklane", "todo", "add", "Review docs", "--hours", "2"])
            .expect("parse");
        let Some(Command::Todo(TodoCommand::Add(add))) = cli.command else {
            panic!("expected todo add");
        };
        assert_eq!(add.hours, Some(2.0));
        assert!(add.files.attach.is_empty());
    }

    #[test]
    fn unknown_priority_is_rejected() {
        let result = GlobalCli::try_parse_from([
            "tasklane", "add", "x", "--on", "today", "--priority", "someday",
        ]);
        assert!(result.is_err());
    }
}
