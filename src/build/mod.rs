//! Build orchestration for one project
//!
//! Wires the configuration to the engine: source discovery, incremental
//! compilation, a single link, the formatter pass, and the compilation
//! database.

pub mod compile_commands;
pub mod format;
pub mod orchestrator;
pub mod sources;

pub use compile_commands::{CompileCommand, COMPILE_COMMANDS_FILE};
pub use format::FormatReport;
pub use orchestrator::{BuildReport, Builder};
pub use sources::discover;
