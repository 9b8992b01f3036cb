mod cli;
mod config;
mod docker;
mod error;
mod launch;
mod utils;

use clap::Parser;
use cli::Cli;
use colored::Colorize;

#[tokio::main]
async fn main() {
    // Parse CLI arguments first so --verbose can shape logging
    let cli = Cli::parse();

    if let Err(e) = utils::logger::init(cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let code = match cli.execute().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", "✗".red().bold(), err);
            error::exit_code_for(&err)
        }
    };

    std::process::exit(code);
}
