//! Configuration model for kiln
//!
//! Mirrors the sections of `kiln.toml`. Command strings may reference
//! project variables (`{name}`, `{configuration}`, `{build_dir}`,
//! `{obj_dir}`, `{vcpkg_include}`, `{vcpkg_lib}`) which are substituted once
//! before per-item placeholders (`[.stem]` and friends) are resolved.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::DepfileFormat;
use crate::error::BuildError;
use crate::toolchain::{default_triplet, vcpkg_arch, vcpkg_os, PackageRequest, ToolKind};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub target: TargetConfig,

    #[serde(default)]
    pub compile: CompileConfig,

    #[serde(default)]
    pub link: LinkConfig,

    #[serde(default)]
    pub format: FormatConfig,

    /// Pinned external tools, keyed by name
    #[serde(default)]
    pub toolchains: BTreeMap<String, ToolchainConfig>,

    #[serde(default)]
    pub build: BuildSettings,
}

/// Kind of linked artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    #[default]
    Executable,
    StaticLibrary,
    DynamicLibrary,
}

impl Artifact {
    /// Platform file name of the artifact for target `name`
    pub fn file_name(self, name: &str) -> String {
        match self {
            Artifact::Executable if cfg!(windows) => format!("{}.exe", name),
            Artifact::Executable => name.to_string(),
            Artifact::StaticLibrary if cfg!(windows) => format!("{}.lib", name),
            Artifact::StaticLibrary => format!("lib{}.a", name),
            Artifact::DynamicLibrary if cfg!(windows) => format!("{}.dll", name),
            Artifact::DynamicLibrary if cfg!(target_os = "macos") => format!("lib{}.dylib", name),
            Artifact::DynamicLibrary => format!("lib{}.so", name),
        }
    }
}

/// Build configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Configuration {
    #[default]
    Release,
    Debug,
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Configuration::Release => write!(f, "release"),
            Configuration::Debug => write!(f, "debug"),
        }
    }
}

/// Runtime library linkage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    #[default]
    Static,
    Dynamic,
}

/// `[target]`: what is being built
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetConfig {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub artifact: Artifact,

    #[serde(default)]
    pub configuration: Configuration,

    /// Selects the package triplet variant
    #[serde(default)]
    pub linkage: Linkage,

    /// Glob patterns for translation units
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,

    /// Glob patterns for headers (formatting only)
    #[serde(default = "default_headers")]
    pub headers: Vec<String>,

    #[serde(default = "default_build_dir")]
    pub build_dir: String,
}

fn default_name() -> String {
    "a".to_string()
}

fn default_sources() -> Vec<String> {
    vec!["src/**/*.cpp".to_string()]
}

fn default_headers() -> Vec<String> {
    vec!["src/**/*.hpp".to_string(), "src/**/*.h".to_string()]
}

fn default_build_dir() -> String {
    "build".to_string()
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            artifact: Artifact::default(),
            configuration: Configuration::default(),
            linkage: Linkage::default(),
            sources: default_sources(),
            headers: default_headers(),
            build_dir: default_build_dir(),
        }
    }
}

/// Dependency listing format, or none
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DepfileSetting {
    #[default]
    Make,
    Msvc,
    None,
}

impl DepfileSetting {
    pub fn format(self) -> Option<DepfileFormat> {
        match self {
            DepfileSetting::Make => Some(DepfileFormat::Make),
            DepfileSetting::Msvc => Some(DepfileFormat::Msvc),
            DepfileSetting::None => None,
        }
    }
}

/// `[compile]`: one invocation per stale source
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompileConfig {
    #[serde(default = "default_compile_command")]
    pub command: String,

    /// Outputs of one compile, per source; the first is the object file
    #[serde(default = "default_check_files")]
    pub check_files: Vec<String>,

    #[serde(default)]
    pub depfile: DepfileSetting,

    /// Which check file is the dependency listing
    #[serde(default = "default_depfile_index")]
    pub depfile_index: usize,
}

fn default_compile_command() -> String {
    "c++ -std=c++20 -O2 -MMD -MF \"{obj_dir}/[.stem].d\" -c \"[]\" -o \"{obj_dir}/[.stem].o\""
        .to_string()
}

fn default_check_files() -> Vec<String> {
    vec![
        "{obj_dir}/[.stem].o".to_string(),
        "{obj_dir}/[.stem].d".to_string(),
    ]
}

fn default_depfile_index() -> usize {
    1
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            command: default_compile_command(),
            check_files: default_check_files(),
            depfile: DepfileSetting::default(),
            depfile_index: default_depfile_index(),
        }
    }
}

/// `[link]`: one invocation over every object
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinkConfig {
    /// `{objects}` and `{output}` are substituted; defaults by artifact kind
    #[serde(default)]
    pub command: Option<String>,

    /// Object path for one source
    #[serde(default = "default_object")]
    pub object: String,

    /// Artifact path; defaults to `{build_dir}/{configuration}/<artifact file>`
    #[serde(default)]
    pub output: Option<String>,
}

fn default_object() -> String {
    "{obj_dir}/[.stem].o".to_string()
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            command: None,
            object: default_object(),
            output: None,
        }
    }
}

/// `[format]`: formatter run per changed file
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct FormatConfig {
    pub command: Option<String>,
}

/// `[toolchains.<name>]`
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ToolchainConfig {
    /// Tag, commit or release version
    pub version: String,

    #[serde(default)]
    pub kind: Option<ToolKind>,

    #[serde(default)]
    pub repository: Option<String>,

    /// Step run in the checkout after each version switch
    #[serde(default)]
    pub bootstrap: Option<String>,

    /// Archive URL with `{version}` and `{arch}`
    #[serde(default)]
    pub url: Option<String>,

    /// Binary path relative to the installation
    #[serde(default)]
    pub binary: Option<String>,

    /// Run `<binary> install` for the project manifest after bootstrapping
    #[serde(default)]
    pub install: bool,

    /// Package triplet; derived from the host and target when unset
    #[serde(default)]
    pub triplet: Option<String>,
}

/// `[build]`: execution settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BuildSettings {
    /// Worker cap per batch (unset = one worker per item)
    #[serde(default)]
    pub jobs: Option<usize>,

    /// Shell used to run commands
    #[serde(default)]
    pub shell: Option<String>,

    /// Where toolchains are installed; defaults to `<build_dir>/toolchains`
    #[serde(default)]
    pub toolchain_dir: Option<String>,
}

impl Config {
    pub fn build_dir(&self) -> PathBuf {
        PathBuf::from(&self.target.build_dir)
    }

    /// `<build_dir>/<configuration>/obj`
    pub fn obj_dir(&self) -> PathBuf {
        self.build_dir()
            .join(self.target.configuration.to_string())
            .join("obj")
    }

    pub fn toolchain_dir(&self) -> PathBuf {
        self.build
            .toolchain_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.build_dir().join("toolchains"))
    }

    /// Directory of formatter completion markers
    pub fn format_marker_dir(&self) -> PathBuf {
        self.build_dir().join("format")
    }

    /// `<build_dir>/vcpkg_installed`
    pub fn packages_dir(&self) -> PathBuf {
        self.build_dir().join("vcpkg_installed")
    }

    /// The toolchain marked `install = true`, if any
    pub fn package_installer(&self) -> Option<(&str, &ToolchainConfig)> {
        self.toolchains
            .iter()
            .find(|(_, toolchain)| toolchain.install)
            .map(|(name, toolchain)| (name.as_str(), toolchain))
    }

    /// Triplet for package installs: the configured one, else derived
    pub fn package_triplet(&self) -> String {
        if let Some(triplet) = self
            .package_installer()
            .and_then(|(_, toolchain)| toolchain.triplet.clone())
        {
            return triplet;
        }
        let arch = vcpkg_arch(std::env::consts::ARCH).unwrap_or(std::env::consts::ARCH);
        default_triplet(
            arch,
            vcpkg_os(std::env::consts::OS),
            self.target.linkage == Linkage::Static,
            self.target.configuration == Configuration::Release,
        )
    }

    /// Install request for the project's packages
    pub fn package_request(&self) -> PackageRequest {
        PackageRequest::new(self.package_triplet(), self.packages_dir())
            .debug(self.target.configuration == Configuration::Debug)
    }

    /// Substitute project variables into a command or path
    pub fn expand(&self, pattern: &str) -> String {
        self.substitute(pattern, |value| value)
    }

    /// Substitute project variables into a per-item template
    ///
    /// Brackets inside substituted values are escaped so a project path
    /// like `/src/[old]` never reads as a placeholder.
    pub fn expand_template(&self, template: &str) -> String {
        self.substitute(template, |value| value.replace('[', "[[").replace(']', "]]"))
    }

    fn substitute(&self, pattern: &str, escape: impl Fn(String) -> String) -> String {
        let mut expanded = pattern
            .replace("{name}", &escape(self.target.name.clone()))
            .replace("{configuration}", &self.target.configuration.to_string())
            .replace("{obj_dir}", &escape(slash(&self.obj_dir())))
            .replace("{build_dir}", &escape(slash(&self.build_dir())));
        if expanded.contains("{vcpkg_") {
            let request = self.package_request();
            expanded = expanded
                .replace("{vcpkg_include}", &escape(slash(&request.include_dir())))
                .replace("{vcpkg_lib}", &escape(slash(&request.lib_dir())));
        }
        expanded
    }

    /// Linked artifact path
    pub fn output_path(&self) -> PathBuf {
        match &self.link.output {
            Some(output) => PathBuf::from(self.expand(output)),
            None => self
                .build_dir()
                .join(self.target.configuration.to_string())
                .join(self.target.artifact.file_name(&self.target.name)),
        }
    }

    /// Link command template (before `{objects}`/`{output}` substitution)
    pub fn link_command(&self) -> String {
        let command = self.link.command.clone().unwrap_or_else(|| {
            match self.target.artifact {
                Artifact::Executable => "c++ {objects} -o \"{output}\"",
                Artifact::StaticLibrary => "ar rcs \"{output}\" {objects}",
                Artifact::DynamicLibrary => "c++ -shared {objects} -o \"{output}\"",
            }
            .to_string()
        });
        self.expand(&command)
    }

    /// Copy with every relative location anchored at `project_dir`
    ///
    /// Build outputs, the toolchain directory, the link output and the
    /// source/header globs all become absolute.
    pub fn rooted_at(&self, project_dir: &Path) -> Config {
        let anchor = |value: &str| -> String {
            let path = Path::new(value);
            if path.is_absolute() {
                value.to_string()
            } else {
                slash(&project_dir.join(path))
            }
        };
        let anchor_glob = |pattern: &String| -> String {
            if Path::new(pattern).is_absolute() {
                pattern.clone()
            } else {
                format!(
                    "{}/{}",
                    glob::Pattern::escape(&slash(project_dir)),
                    pattern
                )
            }
        };

        let mut rooted = self.clone();
        rooted.target.build_dir = anchor(&self.target.build_dir);
        rooted.target.sources = self.target.sources.iter().map(anchor_glob).collect();
        rooted.target.headers = self.target.headers.iter().map(anchor_glob).collect();
        rooted.build.toolchain_dir = self.build.toolchain_dir.as_deref().map(anchor);
        rooted.link.output = self
            .link
            .output
            .as_deref()
            .map(|output| anchor(&self.expand(output)));
        rooted
    }

    /// Check the parts serde cannot
    ///
    /// # Errors
    /// * `BuildError::Config` - If the target has no sources or the depfile
    ///   index points past the check files
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.target.name.trim().is_empty() {
            return Err(BuildError::Config("target.name must not be empty".to_string()));
        }
        if self.target.sources.is_empty() {
            return Err(BuildError::Config("target.sources must not be empty".to_string()));
        }
        if self.compile.check_files.is_empty() {
            return Err(BuildError::Config(
                "compile.check_files must name at least the object file".to_string(),
            ));
        }
        if self.compile.depfile != DepfileSetting::None
            && self.compile.depfile_index >= self.compile.check_files.len()
        {
            return Err(BuildError::Config(format!(
                "compile.depfile_index {} is out of range ({} check file(s))",
                self.compile.depfile_index,
                self.compile.check_files.len()
            )));
        }
        for (name, toolchain) in &self.toolchains {
            if toolchain.version.trim().is_empty() {
                return Err(BuildError::Config(format!(
                    "toolchains.{}.version must not be empty",
                    name
                )));
            }
        }
        let installers: Vec<&String> = self
            .toolchains
            .iter()
            .filter(|(_, toolchain)| toolchain.install)
            .map(|(name, _)| name)
            .collect();
        if installers.len() > 1 {
            return Err(BuildError::Config(format!(
                "only one toolchain may set install = true (found {:?})",
                installers
            )));
        }
        Ok(())
    }
}

/// Path with forward slashes, safe inside shell commands on every platform
fn slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
