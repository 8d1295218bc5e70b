use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::filter::{DeadlineFilter, ViewFilter};

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
    name = "todo",
    version,
    about = "A personal to-do list with spreadsheet import and export",
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
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "todorc", global = true)]
    pub todorc: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    /// Print JSON instead of a table
    #[arg(long, global = true)]
    pub json: bool,

    /// Skip delete confirmation prompts
    #[arg(short = 'y', long = "yes", global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show the filtered task list (default)
    List(FilterArgs),
    /// Show one task
    Show { id: u64 },
    /// Create a task
    Add(AddArgs),
    /// Edit a task
    Edit(EditArgs),
    /// Flip the done flag of one task
    Toggle { id: u64 },
    /// Mark tasks as completed
    Done(SelectArgs),
    /// Mark tasks as due to finish
    Undone(SelectArgs),
    /// Delete one task, or several with --checked/--all
    Delete(DeleteArgs),
    /// Write the selected tasks to an .xlsx workbook
    Export(ExportArgs),
    /// Append every row of an .xlsx workbook as new tasks
    Import { file: PathBuf },
    /// List distinct tags
    Tags,
    /// Print the effective configuration
    Config,
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Case-insensitive substring of the task name
    #[arg(long, short = 's', default_value = "")]
    pub search: String,

    /// Exact tag
    #[arg(long, short = 't')]
    pub tag: Option<String>,

    /// all, passed or available
    #[arg(long, short = 'd', default_value_t = DeadlineFilter::All, value_parser = parse_deadline_filter)]
    pub deadline: DeadlineFilter,
}

impl FilterArgs {
    pub fn to_filter(&self) -> ViewFilter {
        ViewFilter::new(self.search.clone(), self.tag.clone(), self.deadline)
    }
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub deadline: String,
    #[arg(long)]
    pub tag: String,
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    pub id: u64,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub deadline: Option<String>,
    #[arg(long)]
    pub tag: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long, conflicts_with = "not_done")]
    pub done: bool,
    #[arg(long)]
    pub not_done: bool,
}

/// Which tasks a bulk command targets: explicit ids, or every task in the
/// filtered view with `--all`.
#[derive(Args, Debug, Clone)]
pub struct SelectArgs {
    pub ids: Vec<u64>,

    #[arg(long, conflicts_with = "ids")]
    pub all: bool,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    pub ids: Vec<u64>,

    /// Treat the ids as a checked selection and delete them together
    #[arg(long)]
    pub checked: bool,

    #[arg(long, conflicts_with = "ids")]
    pub all: bool,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Output path (default: export.file)
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,
}

fn parse_deadline_filter(s: &str) -> anyhow::Result<DeadlineFilter> {
    s.parse()
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
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pull positional `rc.key=value` / `rc.key:value` overrides out of argv.
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
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
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

    fn argv(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_removed() {
        let pre = preprocess_args(&argv(&["todo", "rc.color=off", "list", "rc.confirm:no"]))
            .expect("preprocess");
        assert_eq!(pre.cleaned_args, argv(&["todo", "list"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.color".to_string(), "off".to_string()),
                ("rc.confirm".to_string(), "no".to_string()),
            ]
        );
    }

    #[test]
    fn list_filters_parse() {
        let cli = GlobalCli::try_parse_from(argv(&[
            "todo", "list", "--tag", "work", "--deadline", "passed", "-s", "rep",
        ]))
        .expect("parse");
        let Some(Command::List(args)) = cli.command else {
            panic!("expected list");
        };
        let filter = args.to_filter();
        assert_eq!(filter.tag.as_deref(), Some("work"));
        assert_eq!(filter.deadline, DeadlineFilter::Passed);
        assert_eq!(filter.search, "rep");
    }

    #[test]
    fn select_all_conflicts_with_ids() {
        assert!(GlobalCli::try_parse_from(argv(&["todo", "done", "1", "--all"])).is_err());
        assert!(GlobalCli::try_parse_from(argv(&["todo", "done", "--all", "-t", "home"])).is_ok());
    }

    #[test]
    fn rc_flag_parses_key_value() {
        let cli = GlobalCli::try_parse_from(argv(&["todo", "--rc", "storage.key=work", "tags"]))
            .expect("parse");
        assert_eq!(cli.rc_overrides.len(), 1);
        assert_eq!(cli.rc_overrides[0].key, "storage.key");
        assert_eq!(cli.rc_overrides[0].value, "work");
    }
}
