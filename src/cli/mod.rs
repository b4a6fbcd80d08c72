//! Operator CLI
//!
//! Drives the branchable service over a `JsonFileStore` of free-form JSON
//! documents. Each invocation runs one command in one unit of work.

mod args;
mod commands;
mod document;
mod io;

pub use args::{Cli, Command};
pub use commands::{run, run_command};
pub use document::{parse_object, Document};
pub use io::{write_error, write_response};
