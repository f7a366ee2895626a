//! The build pipeline
//!
//! ```text
//! toolchains -> packages -> discover sources -> select stale -> compile batch -> link once
//! ```
//!
//! The builder holds an immutable, project-rooted copy of the configuration.
//! Every path it hands to commands or to the staleness tracker is absolute,
//! so the result does not depend on the caller's working directory.

use std::fs;
use std::path::{Path, PathBuf};

use super::sources::discover;
use crate::config::Config;
use crate::engine::staleness::modified;
use crate::engine::{
    BatchHooks, BatchOutcome, BatchRunner, CommandTemplate, DependencyHandler, DepfileHandler,
    Staleness, StalenessTracker,
};
use crate::error::BuildError;
use crate::executor::{ExecOptions, ProcessRunner};
use crate::toolchain::{Bootstrapper, InstalledPackages, ToolSpec, ToolchainHandle};

/// What one build did
#[derive(Debug)]
pub struct BuildReport {
    /// Number of sources considered
    pub sources: usize,
    /// Sources that were recompiled
    pub compiled: Vec<PathBuf>,
    /// The linked artifact
    pub output: PathBuf,
    /// Whether the link step ran
    pub linked: bool,
    pub toolchains: Vec<ToolchainHandle>,
    /// Set when a toolchain installs manifest packages
    pub packages: Option<InstalledPackages>,
}

/// Runs build steps for one project
pub struct Builder<'a, R: ProcessRunner + ?Sized> {
    config: Config,
    project_dir: PathBuf,
    runner: &'a R,
    drivers: Vec<PathBuf>,
    jobs: Option<usize>,
}

impl<'a, R: ProcessRunner + ?Sized> Builder<'a, R> {
    /// Anchor `config` at `project_dir`; commands run there
    pub fn new(config: &Config, project_dir: impl Into<PathBuf>, runner: &'a R) -> Self {
        let project_dir = project_dir.into();
        Self {
            config: config.rooted_at(&project_dir),
            jobs: config.build.jobs,
            project_dir,
            runner,
            drivers: Vec::new(),
        }
    }

    /// Files whose modification invalidates every output
    pub fn with_drivers(mut self, drivers: impl IntoIterator<Item = PathBuf>) -> Self {
        self.drivers = drivers.into_iter().collect();
        self
    }

    /// Override the configured worker cap
    pub fn with_jobs(mut self, jobs: Option<usize>) -> Self {
        if jobs.is_some() {
            self.jobs = jobs;
        }
        self
    }

    /// The project-rooted configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub(crate) fn drivers(&self) -> &[PathBuf] {
        &self.drivers
    }

    pub(crate) fn batch_runner(&self, options: ExecOptions) -> BatchRunner<'a, R> {
        BatchRunner::new(self.runner)
            .with_jobs(self.jobs)
            .with_options(options)
    }

    /// Translation units matched by `target.sources`
    pub fn sources(&self) -> Result<Vec<PathBuf>, BuildError> {
        discover(&self.config.target.sources)
    }

    /// Resolved recipes for every `[toolchains.*]` entry
    pub fn toolchain_specs(&self) -> Result<Vec<ToolSpec>, BuildError> {
        self.config
            .toolchains
            .iter()
            .map(|(name, table)| ToolSpec::from_config(name, table))
            .collect()
    }

    /// Ensure all configured toolchains, or only the one named `only`
    ///
    /// # Errors
    /// * `BuildError::ToolchainNotFound` - If `only` names an unconfigured tool
    /// * `BuildError::Bootstrap` - If any tool cannot be made ready
    pub fn ensure_toolchains(&self, only: Option<&str>) -> Result<Vec<ToolchainHandle>, BuildError> {
        let specs = self.toolchain_specs()?;
        if let Some(name) = only {
            if !specs.iter().any(|spec| spec.name == name) {
                return Err(BuildError::ToolchainNotFound(name.to_string()));
            }
        }

        let bootstrapper = Bootstrapper::new(self.runner, self.config.toolchain_dir());
        let mut handles = Vec::new();
        for spec in specs.iter().filter(|spec| only.map_or(true, |name| name == spec.name)) {
            handles.push(bootstrapper.ensure(spec)?);
        }
        Ok(handles)
    }

    /// Install manifest packages with the toolchain marked `install = true`
    ///
    /// Returns `None` when no toolchain installs packages or the installer is
    /// not among `toolchains`.
    ///
    /// # Errors
    /// * `BuildError::Bootstrap` - If the install fails or leaves no
    ///   include/lib directory for the triplet
    pub fn install_packages(
        &self,
        toolchains: &[ToolchainHandle],
    ) -> Result<Option<InstalledPackages>, BuildError> {
        let Some((name, _)) = self.config.package_installer() else {
            return Ok(None);
        };
        let Some(handle) = toolchains.iter().find(|handle| handle.name == name) else {
            return Ok(None);
        };

        let bootstrapper = Bootstrapper::new(self.runner, self.config.toolchain_dir());
        let installed = bootstrapper.install_packages(
            handle,
            &self.config.package_request(),
            &self.project_dir,
        )?;
        Ok(Some(installed))
    }

    /// Execution options: run in the project, toolchain binaries first on PATH
    pub fn exec_options(&self, toolchains: &[ToolchainHandle]) -> Result<ExecOptions, BuildError> {
        let options = ExecOptions::in_dir(&self.project_dir);
        if toolchains.is_empty() {
            return Ok(options);
        }

        let mut paths: Vec<PathBuf> = toolchains
            .iter()
            .map(|handle| handle.bin_dir().to_path_buf())
            .collect();
        if let Some(existing) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&existing));
        }
        let joined = std::env::join_paths(paths)
            .map_err(|e| BuildError::Config(format!("Cannot add toolchains to PATH: {}", e)))?;
        Ok(options.with_env("PATH", joined.to_string_lossy()))
    }

    fn tracker(&self) -> StalenessTracker {
        StalenessTracker::new(
            self.config
                .compile
                .check_files
                .iter()
                .map(|pattern| self.config.expand_template(pattern)),
        )
        .with_drivers(self.drivers.iter().cloned())
    }

    /// Verdict for every source, in order
    pub fn stale_sources(&self, sources: &[PathBuf]) -> Vec<(PathBuf, Staleness)> {
        let handler = self
            .config
            .compile
            .depfile
            .format()
            .map(|format| {
                DepfileHandler::new(format, self.config.compile.depfile_index)
                    .with_base_dir(&self.project_dir)
            });
        self.tracker().evaluate_all(
            sources,
            handler.as_ref().map(|h| h as &dyn DependencyHandler),
        )
    }

    /// Compile `stale` in one parallel batch
    ///
    /// # Errors
    /// * `BuildError::Batch` - If any compile could not start or failed
    pub fn compile(
        &self,
        stale: &[PathBuf],
        options: &ExecOptions,
        hooks: &dyn BatchHooks,
    ) -> Result<BatchOutcome, BuildError> {
        let tracker = self.tracker();
        for source in stale {
            for file in tracker.check_files(source) {
                if let Some(parent) = file.parent() {
                    fs::create_dir_all(parent)?;
                }
            }
        }

        let template =
            CommandTemplate::parse(&self.config.expand_template(&self.config.compile.command));
        Ok(self
            .batch_runner(options.clone())
            .run_batch("Compilation", &template, stale, hooks)?)
    }

    /// Link every source's object into the artifact
    ///
    /// # Errors
    /// * `BuildError::LinkFailed` - If the link command exits non-zero
    pub fn link(&self, sources: &[PathBuf], options: &ExecOptions) -> Result<PathBuf, BuildError> {
        let object = CommandTemplate::parse(&self.config.expand_template(&self.config.link.object));
        let objects = sources
            .iter()
            .map(|source| format!("\"{}\"", object.instantiate(source)))
            .collect::<Vec<_>>()
            .join(" ");

        let output = self.config.output_path();
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }

        let command = self
            .config
            .link_command()
            .replace("{objects}", &objects)
            .replace("{output}", &output.to_string_lossy());

        tracing::info!("Linking {}", output.display());
        let result = self.runner.run(&format!("{} 2>&1", command), options)?;
        if !result.success {
            return Err(BuildError::LinkFailed {
                command,
                exit_code: result.exit_code,
                output: result.output,
            });
        }
        Ok(output)
    }

    /// Whether the artifact is missing or older than any object
    ///
    /// Catches a link that failed after its objects were compiled: the next
    /// build has nothing stale but must still relink.
    fn link_outdated(&self, sources: &[PathBuf]) -> bool {
        let Ok(linked_at) = modified(&self.config.output_path()) else {
            return true;
        };
        let object = CommandTemplate::parse(&self.config.expand_template(&self.config.link.object));
        sources.iter().any(|source| {
            modified(&object.instantiate_path(source)).map_or(true, |time| time > linked_at)
        })
    }

    /// Full incremental build
    ///
    /// # Errors
    /// * `BuildError::NoSources` - If no file matches `target.sources`
    /// * any error of [`Self::ensure_toolchains`], [`Self::compile`] or [`Self::link`]
    pub fn build(&self, hooks: &dyn BatchHooks) -> Result<BuildReport, BuildError> {
        self.config.validate()?;

        let toolchains = self.ensure_toolchains(None)?;
        let packages = self.install_packages(&toolchains)?;
        let options = self.exec_options(&toolchains)?;

        let sources = self.sources()?;
        if sources.is_empty() {
            return Err(BuildError::NoSources);
        }

        let stale: Vec<PathBuf> = self
            .stale_sources(&sources)
            .into_iter()
            .filter(|(source, verdict)| {
                if verdict.is_stale() {
                    tracing::debug!(source = %source.display(), reason = %verdict, "stale");
                }
                verdict.is_stale()
            })
            .map(|(source, _)| source)
            .collect();

        if stale.is_empty() {
            tracing::info!("All {} source(s) up to date", sources.len());
        } else {
            self.compile(&stale, &options, hooks)?;
        }

        let output = self.config.output_path();
        let linked = if stale.is_empty() && !self.link_outdated(&sources) {
            tracing::info!("{} is up to date", output.display());
            false
        } else {
            self.link(&sources, &options)?;
            true
        };

        Ok(BuildReport {
            sources: sources.len(),
            compiled: stale,
            output,
            linked,
            toolchains,
            packages,
        })
    }

    /// Remove build outputs, keeping installed toolchains
    pub fn clean(&self) -> Result<Vec<PathBuf>, BuildError> {
        let build_dir = self.config.build_dir();
        if !build_dir.exists() {
            return Ok(Vec::new());
        }

        let toolchains = self.config.toolchain_dir();
        let mut removed = Vec::new();
        for entry in fs::read_dir(&build_dir)? {
            let path = entry?.path();
            if path == toolchains {
                continue;
            }
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
            removed.push(path);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DepfileSetting;
    use crate::engine::NoHooks;
    use crate::error::BatchError;
    use crate::executor::{ExecResult, MockProcessRunner, ShellRunner};
    use filetime::{set_file_mtime, FileTime};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    /// A project whose "compiler" copies sources and whose "linker" concatenates objects
    fn copy_project() -> (TempDir, Config) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/a.cpp"), "A\n").unwrap();
        fs::write(dir.path().join("src/b.cpp"), "B\n").unwrap();

        let mut config = Config::default();
        config.target.name = "app".to_string();
        config.compile.command = "cp \"[]\" \"{obj_dir}/[.stem].o\"".to_string();
        config.compile.check_files = vec!["{obj_dir}/[.stem].o".to_string()];
        config.compile.depfile = DepfileSetting::None;
        config.link.command = Some("cat {objects} > \"{output}\"".to_string());
        config.link.output = Some("{build_dir}/app.txt".to_string());
        (dir, config)
    }

    fn future() -> FileTime {
        FileTime::from_system_time(SystemTime::now() + Duration::from_secs(30))
    }

    #[cfg(unix)]
    #[test]
    fn test_build_then_noop_then_incremental() {
        let (dir, config) = copy_project();
        let runner = ShellRunner::new();
        let builder = Builder::new(&config, dir.path(), &runner);

        let first = builder.build(&NoHooks).unwrap();
        assert_eq!(first.sources, 2);
        assert_eq!(first.compiled.len(), 2);
        assert!(first.linked);
        assert_eq!(fs::read_to_string(&first.output).unwrap(), "A\nB\n");

        let second = builder.build(&NoHooks).unwrap();
        assert!(second.compiled.is_empty());
        assert!(!second.linked);

        fs::write(dir.path().join("src/a.cpp"), "A2\n").unwrap();
        set_file_mtime(dir.path().join("src/a.cpp"), future()).unwrap();
        let third = builder.build(&NoHooks).unwrap();
        assert_eq!(third.compiled.len(), 1);
        assert!(third.compiled[0].ends_with("a.cpp"));
        assert!(third.linked);
        assert_eq!(fs::read_to_string(&third.output).unwrap(), "A2\nB\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_artifact_relinks_without_compiling() {
        let (dir, config) = copy_project();
        let runner = ShellRunner::new();
        let builder = Builder::new(&config, dir.path(), &runner);

        let first = builder.build(&NoHooks).unwrap();
        fs::remove_file(&first.output).unwrap();

        let second = builder.build(&NoHooks).unwrap();
        assert!(second.compiled.is_empty());
        assert!(second.linked);
        assert!(second.output.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_driver_change_rebuilds_everything() {
        let (dir, config) = copy_project();
        let driver = dir.path().join("kiln.toml");
        fs::write(&driver, "").unwrap();
        let runner = ShellRunner::new();
        let builder = Builder::new(&config, dir.path(), &runner).with_drivers([driver.clone()]);

        builder.build(&NoHooks).unwrap();
        set_file_mtime(&driver, future()).unwrap();

        let report = builder.build(&NoHooks).unwrap();
        assert_eq!(report.compiled.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_compile_failure_skips_link() {
        let (dir, mut config) = copy_project();
        config.compile.command =
            "test \"[.stem]\" != b && cp \"[]\" \"{obj_dir}/[.stem].o\"".to_string();
        let runner = ShellRunner::new();
        let builder = Builder::new(&config, dir.path(), &runner);

        let result = builder.build(&NoHooks);
        match result {
            Err(BuildError::Batch(BatchError::ItemsFailed { failed, total, .. })) => {
                assert_eq!(total, 2);
                assert_eq!(failed.len(), 1);
                assert!(failed[0].ends_with("b.cpp"));
            }
            other => panic!("Expected ItemsFailed, got {:?}", other),
        }
        assert!(!builder.config().output_path().exists());
        // The successful sibling still produced its object
        assert!(builder.config().obj_dir().join("a.o").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_link_failure() {
        let (dir, mut config) = copy_project();
        config.link.command = Some("echo cannot link {objects}; exit 7".to_string());
        let runner = ShellRunner::new();
        let builder = Builder::new(&config, dir.path(), &runner);

        match builder.build(&NoHooks) {
            Err(BuildError::LinkFailed {
                exit_code, output, ..
            }) => {
                assert_eq!(exit_code, Some(7));
                assert!(output.contains("cannot link"));
            }
            other => panic!("Expected LinkFailed, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_link_is_retried_on_next_build() {
        let (dir, mut config) = copy_project();
        let runner = ShellRunner::new();
        let first = Builder::new(&config, dir.path(), &runner)
            .build(&NoHooks)
            .unwrap();
        assert_eq!(fs::read_to_string(&first.output).unwrap(), "A\nB\n");

        let object = Builder::new(&config, dir.path(), &runner)
            .config()
            .obj_dir()
            .join("a.o");
        fs::write(dir.path().join("src/a.cpp"), "A2\n").unwrap();
        set_file_mtime(&object, FileTime::from_unix_time(1_000, 0)).unwrap();
        set_file_mtime(&first.output, FileTime::from_unix_time(1_500, 0)).unwrap();
        set_file_mtime(dir.path().join("src/a.cpp"), FileTime::from_unix_time(2_000, 0)).unwrap();
        config.link.command = Some("exit 1".to_string());
        let failing = Builder::new(&config, dir.path(), &runner);
        assert!(matches!(
            failing.build(&NoHooks),
            Err(BuildError::LinkFailed { .. })
        ));

        // Nothing is stale any more, but the artifact predates the new object
        assert!(matches!(
            failing.build(&NoHooks),
            Err(BuildError::LinkFailed { .. })
        ));

        config.link.command = Some("cat {objects} > \"{output}\"".to_string());
        let report = Builder::new(&config, dir.path(), &runner)
            .build(&NoHooks)
            .unwrap();
        assert!(report.compiled.is_empty());
        assert!(report.linked);
        assert_eq!(fs::read_to_string(&report.output).unwrap(), "A2\nB\n");
    }

    #[test]
    fn test_relative_depfile_header_ignores_process_cwd() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join("include")).unwrap();
        fs::write(dir.path().join("src/a.cpp"), "").unwrap();
        fs::write(dir.path().join("include/a.h"), "").unwrap();

        let mut config = Config::default();
        config.compile.check_files = vec![
            "{obj_dir}/[.stem].o".to_string(),
            "{obj_dir}/[.stem].d".to_string(),
        ];
        let runner = MockProcessRunner::new();
        let builder = Builder::new(&config, dir.path(), &runner);

        let obj_dir = builder.config().obj_dir();
        fs::create_dir_all(&obj_dir).unwrap();
        fs::write(obj_dir.join("a.o"), "").unwrap();
        fs::write(obj_dir.join("a.d"), "a.o: src/a.cpp include/a.h\n").unwrap();

        let past = FileTime::from_unix_time(1_000, 0);
        set_file_mtime(dir.path().join("src/a.cpp"), past).unwrap();
        set_file_mtime(dir.path().join("include/a.h"), future()).unwrap();

        let sources = builder.sources().unwrap();
        let verdicts = builder.stale_sources(&sources);
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].1, Staleness::DependencyNewer);
    }

    #[test]
    fn test_no_sources() {
        let dir = TempDir::new().unwrap();
        let runner = MockProcessRunner::new();
        let builder = Builder::new(&Config::default(), dir.path(), &runner);
        assert!(matches!(builder.build(&NoHooks), Err(BuildError::NoSources)));
    }

    #[test]
    fn test_link_command_lists_every_object() {
        let (dir, config) = copy_project();
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .withf(|command, options| {
                command.starts_with("cat ")
                    && command.contains("/obj/a.o\"")
                    && command.contains("/obj/b.o\"")
                    && command.ends_with(" 2>&1")
                    && options.working_dir.is_some()
            })
            .times(1)
            .returning(|_, _| Ok(ExecResult::succeeded("")));

        let builder = Builder::new(&config, dir.path(), &runner);
        let sources = builder.sources().unwrap();
        let output = builder
            .link(&sources, &builder.exec_options(&[]).unwrap())
            .unwrap();
        assert!(output.ends_with("app.txt"));
    }

    #[test]
    fn test_install_packages_uses_marked_toolchain() {
        let (dir, mut config) = copy_project();
        config.toolchains.insert(
            "vcpkg".to_string(),
            crate::config::ToolchainConfig {
                version: "2024.11.16".to_string(),
                install: true,
                triplet: Some("x64-linux-release".to_string()),
                ..Default::default()
            },
        );
        let packages = dir.path().join("build/vcpkg_installed/x64-linux-release");
        let created = packages.clone();

        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .withf(|command, _| {
                command.contains("install --vcpkg-root")
                    && command.contains("--triplet x64-linux-release")
                    && command.contains("/build/vcpkg_installed\"")
            })
            .times(1)
            .returning(move |_, _| {
                fs::create_dir_all(created.join("include")).unwrap();
                fs::create_dir_all(created.join("lib")).unwrap();
                Ok(ExecResult::succeeded(""))
            });

        let builder = Builder::new(&config, dir.path(), &runner);
        let handle = ToolchainHandle {
            name: "vcpkg".to_string(),
            version: "2024.11.16".to_string(),
            root: dir.path().join("build/toolchains/vcpkg"),
            binary: dir.path().join("build/toolchains/vcpkg/vcpkg"),
        };

        let installed = builder.install_packages(&[handle]).unwrap().unwrap();
        assert_eq!(installed.include, packages.join("include"));
        assert_eq!(installed.lib, packages.join("lib"));
        assert_eq!(
            builder.config().expand("-I{vcpkg_include}"),
            format!("-I{}", packages.join("include").to_string_lossy().replace('\\', "/"))
        );
    }

    #[test]
    fn test_install_packages_without_installer() {
        let (dir, config) = copy_project();
        let runner = MockProcessRunner::new();
        let builder = Builder::new(&config, dir.path(), &runner);
        assert!(builder.install_packages(&[]).unwrap().is_none());
    }

    #[test]
    fn test_unknown_toolchain() {
        let (dir, config) = copy_project();
        let runner = MockProcessRunner::new();
        let builder = Builder::new(&config, dir.path(), &runner);
        assert!(matches!(
            builder.ensure_toolchains(Some("vcpkg")),
            Err(BuildError::ToolchainNotFound(_))
        ));
    }

    #[test]
    fn test_exec_options_prepend_toolchain_bin() {
        let (dir, config) = copy_project();
        let runner = MockProcessRunner::new();
        let builder = Builder::new(&config, dir.path(), &runner);
        let handle = ToolchainHandle {
            name: "clang".to_string(),
            version: "19.1.0".to_string(),
            root: dir.path().join("clang-19.1.0"),
            binary: dir.path().join("clang-19.1.0").join("bin").join("clang"),
        };

        let options = builder.exec_options(&[handle]).unwrap();
        let path = options.env.get("PATH").unwrap();
        let first = std::env::split_paths(path).next().unwrap();
        assert_eq!(first, dir.path().join("clang-19.1.0").join("bin"));
        assert_eq!(options.working_dir.as_deref(), Some(dir.path()));
    }

    #[test]
    fn test_clean_keeps_toolchains() {
        let (dir, config) = copy_project();
        let runner = MockProcessRunner::new();
        let builder = Builder::new(&config, dir.path(), &runner);

        fs::create_dir_all(builder.config().obj_dir()).unwrap();
        fs::create_dir_all(builder.config().toolchain_dir().join("vcpkg")).unwrap();
        fs::write(builder.config().build_dir().join("app.txt"), "").unwrap();

        let removed = builder.clean().unwrap();
        assert_eq!(removed.len(), 2);
        assert!(builder.config().toolchain_dir().join("vcpkg").exists());
        assert!(!builder.config().obj_dir().exists());
    }
}
