//! Staleness detection for incremental builds
//!
//! A candidate (usually a source file) is up to date only when every one of
//! its check files exists, none of them is older than the candidate or the
//! build's driver files, and the optional dependency handler reports nothing
//! newer. Everything else is stale.
//!
//! Verdicts are recomputed on every call from filesystem timestamps; nothing
//! is persisted besides the check files themselves.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::template::CommandTemplate;
use crate::error::DependencyError;

/// Last-modified time of a path
pub fn modified(path: &Path) -> std::io::Result<SystemTime> {
    std::fs::metadata(path)?.modified()
}

/// Inspects auxiliary dependency metadata for one candidate
///
/// Returns `Ok(true)` when a recorded dependency is newer than the primary
/// check file. Errors are never fatal; the tracker treats them as stale.
pub trait DependencyHandler {
    fn is_outdated(&self, item: &Path, check_files: &[PathBuf]) -> Result<bool, DependencyError>;
}

impl<F> DependencyHandler for F
where
    F: Fn(&Path, &[PathBuf]) -> Result<bool, DependencyError>,
{
    fn is_outdated(&self, item: &Path, check_files: &[PathBuf]) -> Result<bool, DependencyError> {
        self(item, check_files)
    }
}

/// Why a candidate was (or was not) selected for rebuild
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    UpToDate,
    /// A check file does not exist
    MissingOutput(PathBuf),
    /// The candidate itself changed after its outputs
    SourceNewer,
    /// A driver file changed after the outputs
    DriverNewer,
    /// The dependency handler found a newer dependency
    DependencyNewer,
    /// Timestamps or dependency metadata could not be read
    Unreadable(String),
}

impl Staleness {
    pub fn is_stale(&self) -> bool {
        !matches!(self, Staleness::UpToDate)
    }
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Staleness::UpToDate => write!(f, "up to date"),
            Staleness::MissingOutput(path) => write!(f, "missing {}", path.display()),
            Staleness::SourceNewer => write!(f, "source changed"),
            Staleness::DriverNewer => write!(f, "build definition changed"),
            Staleness::DependencyNewer => write!(f, "dependency changed"),
            Staleness::Unreadable(reason) => write!(f, "unreadable ({})", reason),
        }
    }
}

/// Decides which candidates need reprocessing
#[derive(Debug, Clone)]
pub struct StalenessTracker {
    check_patterns: Vec<CommandTemplate>,
    drivers: Vec<PathBuf>,
}

impl StalenessTracker {
    /// Track outputs named by `check_patterns` (templated per candidate)
    pub fn new<I, S>(check_patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            check_patterns: check_patterns
                .into_iter()
                .map(|p| CommandTemplate::parse(p.as_ref()))
                .collect(),
            drivers: Vec::new(),
        }
    }

    /// Files defining the build itself; touching one invalidates every output
    pub fn with_drivers<I, P>(mut self, drivers: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.drivers = drivers.into_iter().map(Into::into).collect();
        self
    }

    /// Resolve the check files of one candidate, in pattern order
    pub fn check_files(&self, candidate: &Path) -> Vec<PathBuf> {
        self.check_patterns
            .iter()
            .map(|p| p.instantiate_path(candidate))
            .collect()
    }

    /// Newest driver modification time; missing drivers count as oldest
    fn driver_time(&self) -> Option<SystemTime> {
        self.drivers.iter().filter_map(|d| modified(d).ok()).max()
    }

    /// Evaluate one candidate
    pub fn evaluate(
        &self,
        candidate: &Path,
        handler: Option<&dyn DependencyHandler>,
    ) -> Staleness {
        self.evaluate_with(candidate, self.driver_time(), handler)
    }

    fn evaluate_with(
        &self,
        candidate: &Path,
        driver_time: Option<SystemTime>,
        handler: Option<&dyn DependencyHandler>,
    ) -> Staleness {
        let check_files = self.check_files(candidate);
        if let Some(missing) = check_files.iter().find(|p| !p.exists()) {
            return Staleness::MissingOutput(missing.clone());
        }

        let mut oldest_output: Option<SystemTime> = None;
        for file in &check_files {
            match modified(file) {
                Ok(time) => oldest_output = Some(oldest_output.map_or(time, |o| o.min(time))),
                Err(e) => return Staleness::Unreadable(format!("{}: {}", file.display(), e)),
            }
        }

        if let Some(oldest) = oldest_output {
            match modified(candidate) {
                Ok(source_time) if source_time > oldest => return Staleness::SourceNewer,
                Ok(_) => {}
                Err(e) => return Staleness::Unreadable(format!("{}: {}", candidate.display(), e)),
            }
            if driver_time.is_some_and(|d| d > oldest) {
                return Staleness::DriverNewer;
            }
        }

        if let Some(handler) = handler {
            match handler.is_outdated(candidate, &check_files) {
                Ok(true) => return Staleness::DependencyNewer,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        item = %candidate.display(),
                        "dependency inspection failed, rebuilding: {}",
                        e
                    );
                    return Staleness::Unreadable(e.to_string());
                }
            }
        }

        Staleness::UpToDate
    }

    /// Evaluate every candidate, preserving input order
    pub fn evaluate_all(
        &self,
        candidates: &[PathBuf],
        handler: Option<&dyn DependencyHandler>,
    ) -> Vec<(PathBuf, Staleness)> {
        let driver_time = self.driver_time();
        candidates
            .iter()
            .map(|c| (c.clone(), self.evaluate_with(c, driver_time, handler)))
            .collect()
    }

    /// The stale subset of `candidates`, in input order
    pub fn select_stale(
        &self,
        candidates: &[PathBuf],
        handler: Option<&dyn DependencyHandler>,
    ) -> Vec<PathBuf> {
        self.evaluate_all(candidates, handler)
            .into_iter()
            .filter(|(candidate, verdict)| {
                if verdict.is_stale() {
                    tracing::debug!(item = %candidate.display(), reason = %verdict, "stale");
                }
                verdict.is_stale()
            })
            .map(|(candidate, _)| candidate)
            .collect()
    }
}

/// One-shot form of [`StalenessTracker::select_stale`]
pub fn select_stale<S: AsRef<str>>(
    candidates: &[PathBuf],
    check_patterns: &[S],
    drivers: &[PathBuf],
    handler: Option<&dyn DependencyHandler>,
) -> Vec<PathBuf> {
    StalenessTracker::new(check_patterns)
        .with_drivers(drivers.iter().cloned())
        .select_stale(candidates, handler)
}
