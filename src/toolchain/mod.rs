//! Pinned external toolchains (package managers, compilers)
//!
//! This is the only part of kiln that touches the network, always through
//! `git` or `curl` child processes.

pub mod bootstrap;
pub mod packages;
pub mod spec;

pub use bootstrap::{Bootstrapper, ToolchainHandle, READY_MARKER};
pub use packages::{default_triplet, vcpkg_arch, vcpkg_os, InstalledPackages, PackageRequest};
pub use spec::{archive_arch, ToolKind, ToolSource, ToolSpec};
