//! Command execution module
//!
//! Provides blocking shell command execution with:
//! - Combined output capture
//! - Environment variable injection
//! - Working directory control
//! - A mockable [`ProcessRunner`] seam

pub mod runner;

pub use runner::*;
