#![forbid(unsafe_code)]

//! m2j — Maven cache janitor CLI entry point.

use clap::Parser;

mod cli_app;

fn main() {
    let args = cli_app::Cli::parse();
    if let Err(e) = cli_app::run(&args) {
        eprintln!("m2j: {e}");
        std::process::exit(e.exit_code());
    }
}
