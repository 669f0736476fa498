//! # Tally CLI Entry Point
//!
//! The actual setup is in lib.rs for better testability.

use clap::Parser;
use std::process::ExitCode;
use tally_cli::{init_tracing, run, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let json = cli.json;
    match run(cli).await {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            if json {
                match serde_json::to_string_pretty(&err) {
                    Ok(body) => eprintln!("{}", body),
                    Err(_) => eprintln!("{}", err),
                }
            } else {
                eprintln!("{}", err);
            }
            ExitCode::FAILURE
        }
    }
}
