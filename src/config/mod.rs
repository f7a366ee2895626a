//! Configuration module for kiln
//!
//! Provides XDG-compliant layered configuration loading with
//! environment variable interpolation of path-valued settings.

pub mod interpolate;
pub mod loader;
pub mod model;

pub use interpolate::interpolate_config;
pub use loader::{config_paths, find_config_files, load_config, PROJECT_FILE};
pub use model::*;
