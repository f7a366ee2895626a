//! Incremental build primitives
//!
//! - [`template`]: per-item command templates
//! - [`staleness`]: output-versus-input timestamp comparison
//! - [`depfile`]: compiler-written dependency listings
//! - [`batch`]: parallel fan-out with aggregated failure reporting

pub mod batch;
pub mod depfile;
pub mod staleness;
pub mod template;

pub use batch::{
    run_batch, BatchHooks, BatchOutcome, BatchRunner, FnHooks, ItemOutcome, ItemReport, NoHooks,
};
pub use depfile::{DepfileFormat, DepfileHandler};
pub use staleness::{select_stale, DependencyHandler, Staleness, StalenessTracker};
pub use template::{instantiate, CommandTemplate};
