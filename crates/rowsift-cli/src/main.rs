use anyhow::Result;
use clap::Parser;
use rowsift_cli::logging::{LogConfig, init_logging};

mod cli;
mod commands;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&LogConfig::from_verbosity(cli.verbose));

    match &cli.command {
        Command::Run(args) => commands::run(args).await,
        Command::Preview(input) => commands::preview(input).await,
        Command::Diagnose(args) => commands::diagnose(args).await,
        Command::Info(input) => commands::info(input).await,
        Command::Config(command) => commands::config(command),
    }
}
