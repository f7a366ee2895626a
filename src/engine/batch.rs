//! Parallel fan-out of one command template over independent work items
//!
//! Each item gets its own worker. Workers never return errors across the
//! concurrency boundary: each one records a typed [`ItemOutcome`] into a
//! shared, mutex-guarded collection, and the coordinating thread reduces
//! the collection into a [`BatchOutcome`] once every item has finished.
//!
//! A batch is never cancelled early. Items that fail do not stop their
//! siblings, so all diagnostics from one build attempt are visible together.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::template::CommandTemplate;
use crate::error::{BatchError, LaunchFailure, ProcessError};
use crate::executor::{ExecOptions, ProcessRunner};

/// Per-item callbacks, invoked from worker threads one at a time
///
/// Used for logging and bookkeeping, not for control flow.
pub trait BatchHooks: Sync {
    /// A batch of `items` commands is about to start
    fn on_start(&self, _task: &str, _items: usize) {}

    /// The item's process exited zero
    fn on_success(&self, _command: &str, _output: &str) {}

    /// The item's process exited non-zero (or was killed)
    fn on_failure(&self, _command: &str, _exit_code: Option<i32>, _output: &str) {}
}

/// Hooks that do nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl BatchHooks for NoHooks {}

/// Closure-backed [`BatchHooks`]
pub struct FnHooks<S, F> {
    success: S,
    failure: F,
}

impl<S, F> FnHooks<S, F>
where
    S: Fn(&str, &str) + Sync,
    F: Fn(&str, Option<i32>, &str) + Sync,
{
    pub fn new(success: S, failure: F) -> Self {
        Self { success, failure }
    }
}

impl<S, F> BatchHooks for FnHooks<S, F>
where
    S: Fn(&str, &str) + Sync,
    F: Fn(&str, Option<i32>, &str) + Sync,
{
    fn on_success(&self, command: &str, output: &str) {
        (self.success)(command, output)
    }

    fn on_failure(&self, command: &str, exit_code: Option<i32>, output: &str) {
        (self.failure)(command, exit_code, output)
    }
}

/// What happened to one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Succeeded { output: String },
    Failed { exit_code: Option<i32>, output: String },
    LaunchFailed(LaunchFailure),
}

/// One item's command and outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub item: PathBuf,
    pub command: String,
    pub outcome: ItemOutcome,
}

/// Everything one batch produced, reports in input order
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub reports: Vec<ItemReport>,
    /// At least one item exited non-zero
    pub stopped: bool,
}

impl BatchOutcome {
    /// Items whose process could not be started
    pub fn launch_failures(&self) -> Vec<LaunchFailure> {
        self.reports
            .iter()
            .filter_map(|r| match &r.outcome {
                ItemOutcome::LaunchFailed(failure) => Some(failure.clone()),
                _ => None,
            })
            .collect()
    }

    /// Items whose process exited non-zero
    pub fn failed_items(&self) -> Vec<PathBuf> {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, ItemOutcome::Failed { .. }))
            .map(|r| r.item.clone())
            .collect()
    }

    /// Number of items that exited zero
    pub fn succeeded(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, ItemOutcome::Succeeded { .. }))
            .count()
    }

    /// Reduce to pass/fail: launch failures first, then item failures
    pub fn into_result(self, task: &str) -> Result<BatchOutcome, BatchError> {
        let failures = self.launch_failures();
        if !failures.is_empty() {
            for failure in &failures {
                tracing::error!("{}", failure);
            }
            return Err(BatchError::Launch {
                task: task.to_string(),
                failures,
            });
        }
        if self.stopped {
            return Err(BatchError::ItemsFailed {
                task: task.to_string(),
                failed: self.failed_items(),
                total: self.reports.len(),
            });
        }
        Ok(self)
    }
}

#[derive(Default)]
struct Shared {
    reports: Vec<(usize, ItemReport)>,
}

/// Runs a command template across work items in parallel
pub struct BatchRunner<'r, R: ProcessRunner + ?Sized> {
    runner: &'r R,
    jobs: Option<NonZeroUsize>,
    options: ExecOptions,
}

impl<'r, R: ProcessRunner + ?Sized> BatchRunner<'r, R> {
    /// One worker per item, default execution options
    pub fn new(runner: &'r R) -> Self {
        Self {
            runner,
            jobs: None,
            options: ExecOptions::default(),
        }
    }

    /// Cap the number of concurrent workers (`None` = one per item)
    pub fn with_jobs(mut self, jobs: Option<usize>) -> Self {
        self.jobs = jobs.and_then(NonZeroUsize::new);
        self
    }

    /// Working directory and environment for every item
    pub fn with_options(mut self, options: ExecOptions) -> Self {
        self.options = options;
        self
    }

    fn worker_count(&self, items: usize) -> usize {
        match self.jobs {
            Some(cap) => cap.get().min(items),
            None => items,
        }
    }

    /// Run every item to completion and collect the outcomes
    ///
    /// Only fails when the worker pool cannot be created; item failures are
    /// recorded in the returned outcome.
    pub fn execute(
        &self,
        task: &str,
        template: &CommandTemplate,
        items: &[PathBuf],
        hooks: &dyn BatchHooks,
    ) -> Result<BatchOutcome, BatchError> {
        if items.is_empty() {
            return Ok(BatchOutcome::default());
        }
        hooks.on_start(task, items.len());

        let workers = self.worker_count(items.len());
        tracing::debug!(items = items.len(), workers, "starting batch: {}", template);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("kiln-worker-{}", i))
            .build()?;

        let shared = Mutex::new(Shared::default());
        let stop = AtomicBool::new(false);

        pool.scope(|scope| {
            for (index, item) in items.iter().enumerate() {
                let shared = &shared;
                let stop = &stop;
                scope.spawn(move |_| {
                    let report = self.run_item(template, item, hooks, shared, stop);
                    lock(shared).reports.push((index, report));
                });
            }
        });

        let mut reports = shared
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .reports;
        reports.sort_by_key(|(index, _)| *index);

        Ok(BatchOutcome {
            reports: reports.into_iter().map(|(_, report)| report).collect(),
            stopped: stop.load(Ordering::SeqCst),
        })
    }

    fn run_item(
        &self,
        template: &CommandTemplate,
        item: &Path,
        hooks: &dyn BatchHooks,
        shared: &Mutex<Shared>,
        stop: &AtomicBool,
    ) -> ItemReport {
        let command = template.instantiate(item);
        let redirected = format!("{} 2>&1", command);

        let outcome = match self.runner.run(&redirected, &self.options) {
            Err(ProcessError::SpawnFailed { error, .. }) => {
                ItemOutcome::LaunchFailed(LaunchFailure {
                    item: item.to_path_buf(),
                    command: command.clone(),
                    error,
                })
            }
            Ok(result) if result.success => {
                let _guard = lock(shared);
                hooks.on_success(&command, &result.output);
                ItemOutcome::Succeeded {
                    output: result.output,
                }
            }
            Ok(result) => {
                stop.store(true, Ordering::SeqCst);
                let _guard = lock(shared);
                hooks.on_failure(&command, result.exit_code, &result.output);
                ItemOutcome::Failed {
                    exit_code: result.exit_code,
                    output: result.output,
                }
            }
        };

        ItemReport {
            item: item.to_path_buf(),
            command,
            outcome,
        }
    }

    /// Run the batch and reduce it to a single pass/fail result
    ///
    /// # Errors
    /// * `BatchError::Launch` - If any item could not be started
    /// * `BatchError::ItemsFailed` - If any item exited non-zero
    pub fn run_batch(
        &self,
        task: &str,
        template: &CommandTemplate,
        items: &[PathBuf],
        hooks: &dyn BatchHooks,
    ) -> Result<BatchOutcome, BatchError> {
        tracing::info!("{}: {} item(s)", task, items.len());
        self.execute(task, template, items, hooks)?.into_result(task)
    }
}

fn lock(shared: &Mutex<Shared>) -> std::sync::MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One-shot batch with default options and one worker per item
pub fn run_batch<R: ProcessRunner + ?Sized>(
    runner: &R,
    task: &str,
    template: &str,
    items: &[PathBuf],
    hooks: &dyn BatchHooks,
) -> Result<BatchOutcome, BatchError> {
    BatchRunner::new(runner).run_batch(task, &CommandTemplate::parse(template), items, hooks)
}
