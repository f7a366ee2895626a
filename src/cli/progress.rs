//! Terminal reporting for batches
//!
//! A progress bar on stderr while a batch runs, and each failing command
//! printed with its captured output and, when recognizable, a fix hint.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::engine::BatchHooks;
use crate::error::suggest_fix;

/// [`BatchHooks`] that drive an indicatif progress bar
///
/// Items whose process could not be started fire no hook, so the bar stops
/// short of its length for them. Those items surface through the batch
/// error (each one is logged at `error` level) once the batch returns.
pub struct ConsoleHooks {
    bar: ProgressBar,
    verbose: bool,
}

impl ConsoleHooks {
    /// Hidden when stderr is not a terminal
    pub fn new(verbose: bool) -> Self {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        if let Ok(style) = ProgressStyle::with_template("{msg:>12.cyan.bold} [{bar:30}] {pos}/{len}") {
            bar.set_style(style.progress_chars("=> "));
        }
        Self { bar, verbose }
    }

    /// Print above the bar without tearing it
    fn print(&self, line: String) {
        self.bar.suspend(|| eprintln!("{}", line));
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl BatchHooks for ConsoleHooks {
    fn on_start(&self, task: &str, items: usize) {
        self.bar.reset();
        self.bar.set_length(items as u64);
        self.bar.set_message(task.to_string());
    }

    fn on_success(&self, command: &str, output: &str) {
        if self.verbose {
            let mut line = format!("{} {}", "ok".green(), command);
            if !output.trim().is_empty() {
                line.push('\n');
                line.push_str(output.trim_end());
            }
            self.print(line);
        }
        self.bar.inc(1);
    }

    fn on_failure(&self, command: &str, exit_code: Option<i32>, output: &str) {
        let code = exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let mut line = format!("{} ({}) {}", "failed".red().bold(), code, command);
        if !output.trim().is_empty() {
            line.push('\n');
            line.push_str(output.trim_end());
        }
        if let Some(hint) = suggest_fix(command, output) {
            line.push('\n');
            line.push_str(&format!("{}: {}", "hint".yellow(), hint));
        }
        self.print(line);
        self.bar.inc(1);
    }
}

impl Drop for ConsoleHooks {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}
