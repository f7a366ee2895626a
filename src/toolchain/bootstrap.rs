//! Idempotent fetch-verify-bootstrap of pinned toolchains
//!
//! Every tool moves through the same states:
//!
//! 1. **absent**: clone the repository or download the archive
//! 2. **fetched**: compare the installation's version identity with the pin,
//!    switching once on mismatch
//! 3. **checked**: run the bootstrap step unless the readiness marker already
//!    names this exact version
//! 4. **ready**: the expected binary must exist
//!
//! Git tools keep a single checkout under `<root>/<name>` whose identity is
//! the commit hash of `HEAD`. Archive tools unpack into `<root>/<name>-<version>`
//! so each version is its own installation.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::packages::{InstalledPackages, PackageRequest};
use super::spec::{ToolSource, ToolSpec};
use crate::error::BootstrapError;
use crate::executor::{ExecOptions, ExecResult, ProcessRunner};

/// File inside an installation recording the version it was prepared for
pub const READY_MARKER: &str = ".kiln-ready";

/// A ready installation of one pinned tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainHandle {
    pub name: String,
    pub version: String,
    /// Installation directory
    pub root: PathBuf,
    /// Absolute path of the tool binary
    pub binary: PathBuf,
}

impl ToolchainHandle {
    /// Directory holding the binary, for PATH injection
    pub fn bin_dir(&self) -> &Path {
        self.binary.parent().unwrap_or(&self.root)
    }
}

/// Ensures pinned toolchains exist under one root directory
///
/// Handles are cached per tool name for the lifetime of the bootstrapper and
/// reused while the requested version stays the same.
pub struct Bootstrapper<'r, R: ProcessRunner + ?Sized> {
    runner: &'r R,
    root: PathBuf,
    preflight: bool,
    cache: Mutex<HashMap<String, ToolchainHandle>>,
}

impl<'r, R: ProcessRunner + ?Sized> Bootstrapper<'r, R> {
    pub fn new(runner: &'r R, root: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            root: root.into(),
            preflight: true,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Skip the PATH lookup of `git`/`curl`/`tar`
    pub fn without_preflight(mut self) -> Self {
        self.preflight = false;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Make sure `spec` is installed at exactly its pinned version
    ///
    /// # Errors
    /// * `BootstrapError::MissingProgram` - If a fetch program is not on PATH
    /// * `BootstrapError::StepFailed` - If clone/fetch/checkout/download/extract/bootstrap exits non-zero
    /// * `BootstrapError::UnknownVersion` - If the pinned revision does not exist
    /// * `BootstrapError::VersionMismatch` - If a switch did not take effect
    /// * `BootstrapError::MissingBinary` - If the binary is absent once ready
    pub fn ensure(&self, spec: &ToolSpec) -> Result<ToolchainHandle, BootstrapError> {
        if let Some(handle) = self.cached(spec) {
            tracing::debug!("{} {} already ensured", spec.name, spec.version);
            return Ok(handle);
        }

        let root = absolute(&self.root)?;
        let handle = match &spec.source {
            ToolSource::Git {
                repository,
                bootstrap,
            } => self.ensure_git(spec, &root, repository, bootstrap.as_deref())?,
            ToolSource::Archive { url } => self.ensure_archive(spec, &root, url)?,
        };

        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(spec.name.clone(), handle.clone());
        Ok(handle)
    }

    /// Install the manifest packages of `project_dir` with a ready vcpkg
    ///
    /// # Errors
    /// * `BootstrapError::StepFailed` - If `vcpkg install` exits non-zero
    /// * `BootstrapError::MissingPackageOutputs` - If the include or lib
    ///   directory for the triplet is absent afterwards
    pub fn install_packages(
        &self,
        handle: &ToolchainHandle,
        request: &PackageRequest,
        project_dir: &Path,
    ) -> Result<InstalledPackages, BootstrapError> {
        tracing::info!("Using {} triplet: {}", handle.name, request.triplet);
        let command = format!(
            "\"{}\" install --vcpkg-root \"{}\" --triplet {} --x-install-root \"{}\"",
            handle.binary.display(),
            handle.root.display(),
            request.triplet,
            request.install_root.display()
        );
        let result = self.runner.run(&command, &ExecOptions::in_dir(project_dir))?;
        if !result.success {
            return Err(BootstrapError::StepFailed {
                tool: handle.name.clone(),
                step: "install".to_string(),
                command,
                exit_code: result.exit_code,
                output: result.output,
            });
        }

        let (include, lib) = (request.include_dir(), request.lib_dir());
        for dir in [&include, &lib] {
            if !dir.is_dir() {
                return Err(BootstrapError::MissingPackageOutputs {
                    tool: handle.name.clone(),
                    path: dir.clone(),
                });
            }
        }
        Ok(InstalledPackages {
            triplet: request.triplet.clone(),
            include,
            lib,
        })
    }

    fn cached(&self, spec: &ToolSpec) -> Option<ToolchainHandle> {
        let cache = self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        cache
            .get(&spec.name)
            .filter(|handle| handle.version == spec.version)
            .cloned()
    }

    fn ensure_git(
        &self,
        spec: &ToolSpec,
        root: &Path,
        repository: &str,
        bootstrap: Option<&str>,
    ) -> Result<ToolchainHandle, BootstrapError> {
        let dir = root.join(&spec.name);

        if !dir.join(".git").exists() {
            self.check_programs(spec)?;
            fs::create_dir_all(root)?;
            tracing::info!("Cloning {} from {}", spec.name, repository);
            self.step(
                spec,
                "clone",
                &format!("git clone \"{}\" \"{}\"", repository, spec.name),
                root,
            )?;
        }

        let current = self.rev_parse(spec, &dir, "HEAD")?;
        let target = self.target_commit(spec, &dir)?;

        if current != target {
            tracing::info!("Checking out {} {}", spec.name, spec.version);
            self.step(
                spec,
                "checkout",
                &format!("git -c advice.detachedHead=false checkout \"{}\"", spec.version),
                &dir,
            )?;
            let switched = self.rev_parse(spec, &dir, "HEAD")?;
            if switched != target {
                return Err(BootstrapError::VersionMismatch {
                    tool: spec.name.clone(),
                    expected: target,
                    found: switched,
                });
            }
        }

        if read_marker(&dir).as_deref() != Some(target.as_str()) {
            if let Some(command) = bootstrap {
                tracing::info!("Bootstrapping {}", spec.name);
                let result = self.step(spec, "bootstrap", command, &dir)?;
                if let Some(link) = first_url(&result.output) {
                    tracing::info!("{}", link);
                }
            }
            write_marker(&dir, &target)?;
        } else {
            tracing::info!("Using {} version: {}", spec.name, spec.version);
        }

        self.ready(spec, dir)
    }

    /// Commit hash the pinned version names, fetching tags once if unknown
    fn target_commit(&self, spec: &ToolSpec, dir: &Path) -> Result<String, BootstrapError> {
        let revision = format!("{}^{{commit}}", spec.version);
        if let Some(hash) = self.try_rev_parse(dir, &revision)? {
            return Ok(hash);
        }

        tracing::info!("{} {} not found locally, fetching", spec.name, spec.version);
        self.step(spec, "fetch", "git fetch --tags origin", dir)?;

        self.try_rev_parse(dir, &revision)?
            .ok_or_else(|| BootstrapError::UnknownVersion {
                tool: spec.name.clone(),
                version: spec.version.clone(),
            })
    }

    fn rev_parse(&self, spec: &ToolSpec, dir: &Path, revision: &str) -> Result<String, BootstrapError> {
        let result = self.step(
            spec,
            "version query",
            &format!("git rev-parse \"{}\"", revision),
            dir,
        )?;
        Ok(result.trimmed().to_string())
    }

    fn try_rev_parse(&self, dir: &Path, revision: &str) -> Result<Option<String>, BootstrapError> {
        let command = format!("git rev-parse --verify --quiet \"{}\"", revision);
        let result = self.runner.run(&command, &ExecOptions::in_dir(dir))?;
        if result.success && !result.trimmed().is_empty() {
            Ok(Some(result.trimmed().to_string()))
        } else {
            Ok(None)
        }
    }

    fn ensure_archive(
        &self,
        spec: &ToolSpec,
        root: &Path,
        url: &str,
    ) -> Result<ToolchainHandle, BootstrapError> {
        let dir = root.join(format!("{}-{}", spec.name, spec.version));

        if read_marker(&dir).as_deref() == Some(spec.version.as_str()) {
            tracing::info!("Using {} version: {}", spec.name, spec.version);
            return self.ready(spec, dir);
        }

        let url = spec.resolved_url(url)?;
        self.check_programs(spec)?;

        let staging = root.join(format!(".{}-{}.staging", spec.name, spec.version));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        let extract = staging.join("extract");
        fs::create_dir_all(&extract)?;

        let archive = staging.join(archive_file_name(&url));
        tracing::info!("Downloading archive at '{}'", url);
        self.step(
            spec,
            "download",
            &format!("curl -f -L -o \"{}\" \"{}\"", archive.display(), url),
            root,
        )?;

        tracing::info!("Extracting {} {}", spec.name, spec.version);
        self.step(
            spec,
            "extract",
            &format!("tar -xf \"{}\" -C \"{}\"", archive.display(), extract.display()),
            root,
        )?;

        let content = single_subdirectory(&extract)?.unwrap_or(extract);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::rename(&content, &dir)?;
        fs::remove_dir_all(&staging)?;
        write_marker(&dir, &spec.version)?;

        self.ready(spec, dir)
    }

    fn ready(&self, spec: &ToolSpec, dir: PathBuf) -> Result<ToolchainHandle, BootstrapError> {
        let binary = dir.join(&spec.binary);
        if !binary.exists() {
            return Err(BootstrapError::MissingBinary {
                tool: spec.name.clone(),
                path: binary,
            });
        }
        Ok(ToolchainHandle {
            name: spec.name.clone(),
            version: spec.version.clone(),
            root: dir,
            binary,
        })
    }

    fn check_programs(&self, spec: &ToolSpec) -> Result<(), BootstrapError> {
        if !self.preflight {
            return Ok(());
        }
        for program in spec.required_programs() {
            if which::which(program).is_err() {
                return Err(BootstrapError::MissingProgram {
                    tool: spec.name.clone(),
                    program: program.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Run one step, turning a non-zero exit into `StepFailed`
    fn step(
        &self,
        spec: &ToolSpec,
        step: &str,
        command: &str,
        dir: &Path,
    ) -> Result<ExecResult, BootstrapError> {
        let result = self.runner.run(command, &ExecOptions::in_dir(dir))?;
        if !result.success {
            return Err(BootstrapError::StepFailed {
                tool: spec.name.clone(),
                step: step.to_string(),
                command: command.to_string(),
                exit_code: result.exit_code,
                output: result.output,
            });
        }
        Ok(result)
    }
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn read_marker(dir: &Path) -> Option<String> {
    fs::read_to_string(dir.join(READY_MARKER))
        .ok()
        .map(|content| content.trim().to_string())
}

fn write_marker(dir: &Path, identity: &str) -> std::io::Result<()> {
    fs::write(dir.join(READY_MARKER), format!("{}\n", identity))
}

fn archive_file_name(url: &str) -> String {
    url.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("download.tar")
        .to_string()
}

/// The only entry of `dir`, if it is a directory
fn single_subdirectory(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    match entries.as_slice() {
        [entry] if entry.file_type()?.is_dir() => Ok(Some(entry.path())),
        _ => Ok(None),
    }
}

/// First `https://...` link in tool output, up to a trailing `...`
fn first_url(output: &str) -> Option<&str> {
    let start = output.find("https://")?;
    let rest = &output[start..];
    let end = rest
        .find("...")
        .or_else(|| rest.find(char::is_whitespace))
        .unwrap_or(rest.len());
    Some(&rest[..end])
}
