//! evc CLI entry point
//!
//! Parses arguments, runs one command against the snapshot store, and exits
//! with non-zero status on failure. All logic lives in the CLI module.

use evc::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
