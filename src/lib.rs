//! kiln - Incremental C/C++ Build Orchestrator
//!
//! Rebuilds only what changed and runs the work in parallel:
//! - **Command templates** - `[]`, `[.stem]`, `[.filename]`, ... placeholders
//!   instantiated per file
//! - **Staleness tracking** - modification times of outputs against sources,
//!   headers from depfiles, and driver files
//! - **Parallel batches** - one shell command per item, one worker per item
//!   unless `--jobs` caps the pool; every item runs to completion and the
//!   batch fails afterwards if any item did
//! - **Toolchain bootstrap** - pinned git checkouts and release archives,
//!   reused once verified
//!
//! ## Commands
//!
//! - `build` - Compile stale sources and link the target
//! - `stale` - Show which sources would be recompiled
//! - `format` - Run the formatter over changed files
//! - `compile-commands` - Write the compilation database
//! - `bootstrap` - Ensure pinned toolchains and install manifest packages
//! - `clean` - Remove build outputs

pub mod build;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod toolchain;

pub use build::{BuildReport, Builder};
pub use cli::{Cli, Commands};
pub use config::Config;
pub use engine::{
    instantiate, run_batch, select_stale, BatchHooks, BatchOutcome, BatchRunner, CommandTemplate,
    StalenessTracker,
};
pub use error::{BatchError, BootstrapError, BuildError, ProcessError};
pub use executor::{ExecOptions, ExecResult, ProcessRunner, ShellRunner};
pub use toolchain::{Bootstrapper, ToolSpec, ToolchainHandle};
