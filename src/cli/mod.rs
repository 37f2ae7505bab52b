//! Command-line interface.

mod commands;

pub use commands::{is_log_json, is_verbose, run};
