//! Formatter pass over sources and headers
//!
//! A file needs formatting when its marker `<build_dir>/format/<filename>.formatted`
//! is missing or older than the file (or than a driver). Markers are written
//! after each successful formatter run, so a failed batch still records the
//! files that were formatted.

use std::fs;
use std::path::PathBuf;

use super::orchestrator::Builder;
use super::sources::discover;
use crate::engine::{BatchHooks, CommandTemplate, ItemOutcome, StalenessTracker};
use crate::error::BuildError;
use crate::executor::ProcessRunner;

/// What one formatter pass did
#[derive(Debug, Default)]
pub struct FormatReport {
    /// Files considered
    pub checked: usize,
    /// Files the formatter ran on successfully
    pub formatted: Vec<PathBuf>,
}

impl<R: ProcessRunner + ?Sized> Builder<'_, R> {
    /// Sources followed by headers, de-duplicated
    pub fn format_files(&self) -> Result<Vec<PathBuf>, BuildError> {
        let target = &self.config().target;
        let patterns: Vec<String> = target
            .sources
            .iter()
            .chain(target.headers.iter())
            .cloned()
            .collect();
        discover(&patterns)
    }

    fn format_tracker(&self) -> StalenessTracker {
        let marker = self.config().expand_template("{build_dir}/format/[.filename].formatted");
        StalenessTracker::new([marker]).with_drivers(self.drivers().iter().cloned())
    }

    /// Run the configured formatter over every changed file
    ///
    /// # Errors
    /// * `BuildError::Config` - If `format.command` is not set
    /// * `BuildError::Batch` - If the formatter failed for any file
    pub fn format(&self, hooks: &dyn BatchHooks) -> Result<FormatReport, BuildError> {
        let command = self
            .config()
            .format
            .command
            .as_deref()
            .ok_or_else(|| BuildError::Config("format.command is not set".to_string()))?;

        let files = self.format_files()?;
        let tracker = self.format_tracker();
        let stale = tracker.select_stale(&files, None);
        if stale.is_empty() {
            tracing::info!("All {} file(s) already formatted", files.len());
            return Ok(FormatReport {
                checked: files.len(),
                formatted: Vec::new(),
            });
        }

        fs::create_dir_all(self.config().format_marker_dir())?;
        let toolchains = self.ensure_toolchains(None)?;
        let options = self.exec_options(&toolchains)?;
        let template = CommandTemplate::parse(&self.config().expand_template(command));

        let outcome = self
            .batch_runner(options)
            .execute("Formatting", &template, &stale, hooks)?;

        let mut formatted = Vec::new();
        for report in &outcome.reports {
            if matches!(report.outcome, ItemOutcome::Succeeded { .. }) {
                for marker in tracker.check_files(&report.item) {
                    fs::write(&marker, "")?;
                }
                formatted.push(report.item.clone());
            }
        }
        outcome.into_result("Formatting")?;

        Ok(FormatReport {
            checked: files.len(),
            formatted,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::build::Builder;
    use crate::config::Config;
    use crate::engine::NoHooks;
    use crate::error::{BatchError, BuildError};
    use crate::executor::{ExecResult, MockProcessRunner};
    use std::fs;
    use tempfile::TempDir;

    fn project() -> (TempDir, Config) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.cpp"), "int main() {}\n").unwrap();
        fs::write(dir.path().join("src/util.hpp"), "#pragma once\n").unwrap();

        let mut config = Config::default();
        config.format.command = Some("clang-format -i \"[]\"".to_string());
        (dir, config)
    }

    #[test]
    fn test_format_requires_command() {
        let (dir, mut config) = project();
        config.format.command = None;
        let runner = MockProcessRunner::new();
        let builder = Builder::new(&config, dir.path(), &runner);
        assert!(matches!(builder.format(&NoHooks), Err(BuildError::Config(_))));
    }

    #[test]
    fn test_format_writes_markers_and_skips_second_run() {
        let (dir, config) = project();
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .withf(|command, _| command.starts_with("clang-format -i "))
            .times(2)
            .returning(|_, _| Ok(ExecResult::succeeded("")));

        let builder = Builder::new(&config, dir.path(), &runner);
        let first = builder.format(&NoHooks).unwrap();
        assert_eq!(first.checked, 2);
        assert_eq!(first.formatted.len(), 2);

        let markers = builder.config().format_marker_dir();
        assert!(markers.join("main.cpp.formatted").exists());
        assert!(markers.join("util.hpp.formatted").exists());

        let second = builder.format(&NoHooks).unwrap();
        assert!(second.formatted.is_empty());
    }

    #[test]
    fn test_format_failure_keeps_successful_markers() {
        let (dir, config) = project();
        let mut runner = MockProcessRunner::new();
        runner.expect_run().times(2).returning(|command, _| {
            if command.contains("util.hpp") {
                Ok(ExecResult::failed(Some(1), "error: invalid\n"))
            } else {
                Ok(ExecResult::succeeded(""))
            }
        });

        let builder = Builder::new(&config, dir.path(), &runner);
        let result = builder.format(&NoHooks);
        assert!(matches!(
            result,
            Err(BuildError::Batch(BatchError::ItemsFailed { .. }))
        ));

        let markers = builder.config().format_marker_dir();
        assert!(markers.join("main.cpp.formatted").exists());
        assert!(!markers.join("util.hpp.formatted").exists());
    }
}
