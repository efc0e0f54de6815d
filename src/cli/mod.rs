//! Command-line interface
//!
//! Read-only inspection of persisted scope snapshots and configuration.

pub mod commands;
pub mod output;
pub mod table;
pub mod types;

pub use types::{Cli, Commands, ConfigCommands, ScopesCommands};

/// Print an error in the selected output mode and exit with status 1.
pub fn handle_error(err: anyhow::Error, json: bool) -> ! {
    if json {
        let body = serde_json::json!({
            "error": err.to_string(),
            "causes": err.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>(),
        });
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
    }
    std::process::exit(1)
}
