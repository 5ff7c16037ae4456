mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use log::LevelFilter;
use simple_logger::SimpleLogger;

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("error: {error}");
        std::process::exit(error.exit_code());
    }
}

async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = SimpleLogger::new().with_level(level).init();

    let command_output = commands::run(&cli).await?;
    output::render(&command_output, cli.format, cli.pretty)
}
