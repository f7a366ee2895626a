//! CLI module for kiln
//!
//! Provides command-line interface with the following subcommands:
//! - `build` - Compile stale sources and link
//! - `stale` - Show the stale set
//! - `format` - Run the formatter over changed files
//! - `compile-commands` - Write compile_commands.json
//! - `bootstrap` - Ensure pinned toolchains
//! - `clean` - Remove build outputs
//! - `config` - Show configuration

pub mod commands;
pub mod progress;

pub use commands::{Cli, Commands};
pub use progress::ConsoleHooks;
