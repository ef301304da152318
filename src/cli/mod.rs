//! Command-line interface for soundshelf.
//!
//! Browse the catalog, resolve audio references and play tracks through
//! the same coordinator the UI uses, without a UI.

mod commands;

pub use commands::{Cli, Commands, run_command};
