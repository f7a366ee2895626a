//! Manifest package installation through a bootstrapped vcpkg
//!
//! `vcpkg install` reads `vcpkg.json` from the project directory and lays
//! packages out as `<install_root>/<triplet>/{include,lib,debug/lib}`.

use std::path::PathBuf;

/// One `vcpkg install` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
    /// e.g. `x64-windows-static-release`
    pub triplet: String,
    /// Passed as `--x-install-root`
    pub install_root: PathBuf,
    /// Debug builds link against `debug/lib`
    pub debug: bool,
}

impl PackageRequest {
    pub fn new(triplet: impl Into<String>, install_root: impl Into<PathBuf>) -> Self {
        Self {
            triplet: triplet.into(),
            install_root: install_root.into(),
            debug: false,
        }
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn include_dir(&self) -> PathBuf {
        self.install_root.join(&self.triplet).join("include")
    }

    pub fn lib_dir(&self) -> PathBuf {
        let triplet_dir = self.install_root.join(&self.triplet);
        if self.debug {
            triplet_dir.join("debug").join("lib")
        } else {
            triplet_dir.join("lib")
        }
    }
}

/// Directories an install produced, for compile and link commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackages {
    pub triplet: String,
    pub include: PathBuf,
    pub lib: PathBuf,
}

/// vcpkg's name for a host architecture (`std::env::consts::ARCH` spelling)
pub fn vcpkg_arch(host: &str) -> Option<&'static str> {
    match host {
        "x86_64" => Some("x64"),
        "aarch64" => Some("arm64"),
        "x86" => Some("x86"),
        "arm" => Some("arm"),
        _ => None,
    }
}

/// vcpkg's name for a host OS (`std::env::consts::OS` spelling)
pub fn vcpkg_os(host: &str) -> &str {
    match host {
        "macos" => "osx",
        other => other,
    }
}

/// Default triplet for a target
///
/// Windows triplets link dynamically unless suffixed `-static`; the other
/// platforms link statically unless suffixed `-dynamic`. Release builds use
/// the `-release` variant, which skips building debug libraries.
pub fn default_triplet(arch: &str, os: &str, static_runtime: bool, release: bool) -> String {
    let mut triplet = format!("{}-{}", arch, os);
    match (os == "windows", static_runtime) {
        (true, true) => triplet.push_str("-static"),
        (false, false) => triplet.push_str("-dynamic"),
        _ => {}
    }
    if release {
        triplet.push_str("-release");
    }
    triplet
}
