use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Audrius Kalpokas",
    version,
    about = "alchemate - Resumable, modular workflows for alchemical free-energy simulations.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run (or resume) a workflow described by a TOML file.
    Run(RunArgs),
    /// Show which steps a saved workflow context has completed.
    Status(StatusArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the workflow file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Path to the simulation system file, overriding `system` in the workflow file.
    #[arg(short, long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Override the simulation output directory.
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Where to save (and resume from) the workflow context.
    /// Defaults to `alchemate_context.toml` inside the output directory.
    #[arg(long, value_name = "PATH")]
    pub checkpoint: Option<PathBuf>,

    /// Start from scratch, moving an existing checkpoint aside to `<checkpoint>.bak`.
    #[arg(long)]
    pub fresh: bool,

    /// Reject the workflow before running if a post-processing step precedes every base step.
    #[arg(long)]
    pub strict_ordering: bool,

    /// Set a specific configuration value, overriding the workflow file.
    /// Can be used multiple times. Example: -S simulation.runtime=2ns
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `status` subcommand.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Path to a saved workflow context.
    #[arg(long, required = true, value_name = "PATH")]
    pub checkpoint: PathBuf,
}
