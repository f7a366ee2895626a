//! Where a toolchain comes from and what it must contain

use crate::config::ToolchainConfig;
use crate::error::{BootstrapError, BuildError};
use serde::{Deserialize, Serialize};

/// How a tool is fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// A git repository pinned to a tag or commit, plus a bootstrap step
    Git,
    /// A prebuilt archive downloaded per version
    Archive,
}

/// Fetch recipe for one tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolSource {
    Git {
        repository: String,
        /// Run inside the checkout after every version switch
        bootstrap: Option<String>,
    },
    Archive {
        /// May contain `{version}` and `{arch}`
        url: String,
    },
}

/// A tool pinned to one exact version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: String,
    pub version: String,
    pub source: ToolSource,
    /// Binary path relative to the installation directory
    pub binary: String,
}

impl ToolSpec {
    pub fn git(
        name: impl Into<String>,
        version: impl Into<String>,
        repository: impl Into<String>,
        binary: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            source: ToolSource::Git {
                repository: repository.into(),
                bootstrap: None,
            },
            binary: binary.into(),
        }
    }

    pub fn archive(
        name: impl Into<String>,
        version: impl Into<String>,
        url: impl Into<String>,
        binary: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            source: ToolSource::Archive { url: url.into() },
            binary: binary.into(),
        }
    }

    /// Set the step run after checkout (git tools only)
    pub fn with_bootstrap(mut self, command: impl Into<String>) -> Self {
        if let ToolSource::Git { bootstrap, .. } = &mut self.source {
            *bootstrap = Some(command.into());
        }
        self
    }

    /// Built-in recipe for a well-known tool name
    pub fn preset(name: &str, version: &str) -> Option<Self> {
        match name {
            "vcpkg" => Some(
                Self::git(
                    "vcpkg",
                    version,
                    "https://github.com/microsoft/vcpkg.git",
                    if cfg!(windows) { "vcpkg.exe" } else { "vcpkg" },
                )
                .with_bootstrap(if cfg!(windows) {
                    "bootstrap-vcpkg.bat -disableMetrics"
                } else {
                    "./bootstrap-vcpkg.sh -disableMetrics"
                }),
            ),
            "clang" => Some(Self::archive(
                "clang",
                version,
                if cfg!(windows) {
                    "https://github.com/llvm/llvm-project/releases/download/llvmorg-{version}/clang+llvm-{version}-{arch}-pc-windows-msvc.tar.xz"
                } else {
                    "https://github.com/llvm/llvm-project/releases/download/llvmorg-{version}/clang+llvm-{version}-{arch}-linux-gnu.tar.xz"
                },
                if cfg!(windows) { "bin/clang.exe" } else { "bin/clang" },
            )),
            _ => None,
        }
    }

    /// Resolve a `[toolchains.<name>]` table, filling gaps from the preset
    ///
    /// # Errors
    /// * `BuildError::Config` - If the tool has no preset and the table is
    ///   missing the fields its kind needs
    pub fn from_config(name: &str, config: &ToolchainConfig) -> Result<Self, BuildError> {
        let preset = Self::preset(name, &config.version);
        let kind = match (config.kind, &preset) {
            (Some(kind), _) => kind,
            (None, Some(preset)) => preset.kind(),
            (None, None) if config.url.is_some() => ToolKind::Archive,
            (None, None) => ToolKind::Git,
        };

        let missing = |field: &str| {
            BuildError::Config(format!("toolchains.{}: '{}' is required", name, field))
        };

        let preset_source = preset
            .as_ref()
            .filter(|p| p.kind() == kind)
            .map(|p| p.source.clone());

        let source = match kind {
            ToolKind::Git => {
                let (preset_repo, preset_bootstrap) = match preset_source {
                    Some(ToolSource::Git {
                        repository,
                        bootstrap,
                    }) => (Some(repository), bootstrap),
                    _ => (None, None),
                };
                ToolSource::Git {
                    repository: config
                        .repository
                        .clone()
                        .or(preset_repo)
                        .ok_or_else(|| missing("repository"))?,
                    bootstrap: config.bootstrap.clone().or(preset_bootstrap),
                }
            }
            ToolKind::Archive => {
                let preset_url = match preset_source {
                    Some(ToolSource::Archive { url }) => Some(url),
                    _ => None,
                };
                ToolSource::Archive {
                    url: config
                        .url
                        .clone()
                        .or(preset_url)
                        .ok_or_else(|| missing("url"))?,
                }
            }
        };

        let binary = config
            .binary
            .clone()
            .or_else(|| preset.as_ref().map(|p| p.binary.clone()))
            .ok_or_else(|| missing("binary"))?;

        Ok(Self {
            name: name.to_string(),
            version: config.version.clone(),
            source,
            binary,
        })
    }

    pub fn kind(&self) -> ToolKind {
        match self.source {
            ToolSource::Git { .. } => ToolKind::Git,
            ToolSource::Archive { .. } => ToolKind::Archive,
        }
    }

    /// Programs that must be on PATH to fetch this tool
    pub fn required_programs(&self) -> &'static [&'static str] {
        match self.source {
            ToolSource::Git { .. } => &["git"],
            ToolSource::Archive { .. } => &["curl", "tar"],
        }
    }

    /// Archive URL with `{version}` and `{arch}` filled in
    ///
    /// # Errors
    /// * `BootstrapError::UnsupportedArch` - If the URL needs `{arch}` and the
    ///   host is not a 64 bit x86 or ARM machine
    pub fn resolved_url(&self, url: &str) -> Result<String, BootstrapError> {
        let mut resolved = url.replace("{version}", &self.version);
        if resolved.contains("{arch}") {
            let arch = archive_arch(std::env::consts::ARCH).ok_or_else(|| {
                BootstrapError::UnsupportedArch {
                    tool: self.name.clone(),
                    arch: std::env::consts::ARCH.to_string(),
                }
            })?;
            resolved = resolved.replace("{arch}", arch);
        }
        Ok(resolved)
    }
}

/// Architecture name used in prebuilt archive file names
pub fn archive_arch(host: &str) -> Option<&'static str> {
    match host {
        "x86_64" => Some("x86_64"),
        "aarch64" => Some("aarch64"),
        _ => None,
    }
}
