use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_SETTINGS_PATH: &str = "rowsift-settings.json";

#[derive(Parser, Debug)]
#[command(
    name = "rowsift",
    version,
    about = "Filter and sort table rows with sandboxed expressions"
)]
pub struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a filter pass and write the resulting document.
    Run(RunArgs),
    /// Show variable values and filter outcomes for the first rows.
    Preview(InputArgs),
    /// Run a filter pass, then show what is cached for the given rows.
    Diagnose(DiagnoseArgs),
    /// Count matched tables and rows.
    Info(InputArgs),
    /// Manage configuration documents.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Document files (.json documents or .csv tables), in document order.
    #[arg(long = "doc", required = true)]
    pub docs: Vec<PathBuf>,

    /// Configuration file to apply.
    #[arg(long, conflicts_with = "origin")]
    pub config: Option<PathBuf>,

    /// Use the configuration saved for this origin.
    #[arg(long)]
    pub origin: Option<String>,

    #[arg(long, default_value = DEFAULT_SETTINGS_PATH)]
    pub settings: PathBuf,

    /// Per-evaluation timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 5000)]
    pub timeout_ms: u64,

    /// Print machine-readable JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Write the filtered document here instead of stdout.
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Only print the pass summary.
    #[arg(long)]
    pub summary_only: bool,
}

#[derive(Args, Debug)]
pub struct DiagnoseArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Row ids to report on. Defaults to every body row of the source tables.
    #[arg(long = "row")]
    pub rows: Vec<u64>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the default configuration.
    Default,
    /// Print the JSON schema of configuration documents.
    Schema,
    /// Check a configuration file and list non-fatal issues.
    Validate { file: PathBuf },
    /// Print (or write) the configuration saved for an origin.
    Export {
        #[arg(long)]
        origin: String,
        #[arg(long, default_value = DEFAULT_SETTINGS_PATH)]
        settings: PathBuf,
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Save a configuration file for an origin. Invalid files change nothing.
    Import {
        file: PathBuf,
        #[arg(long)]
        origin: String,
        #[arg(long, default_value = DEFAULT_SETTINGS_PATH)]
        settings: PathBuf,
    },
    /// Forget the configuration saved for an origin.
    Reset {
        #[arg(long)]
        origin: String,
        #[arg(long, default_value = DEFAULT_SETTINGS_PATH)]
        settings: PathBuf,
    },
}
