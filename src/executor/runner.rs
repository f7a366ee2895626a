//! Synchronous shell command execution
//!
//! Every command kiln runs goes through a [`ProcessRunner`]:
//! - One shell invocation per command, blocking until the child exits
//! - Combined stdout/stderr capture (or inherited stdio for live steps)
//! - Environment variable injection
//! - Working directory control
//!
//! There is no timeout. A child that never exits blocks its caller.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::ProcessError;

/// Options for a single command execution
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Working directory for the command
    pub working_dir: Option<PathBuf>,
    /// Environment variables to set on top of the inherited environment
    pub env: HashMap<String, String>,
    /// Capture output (false = inherit the terminal)
    pub capture_output: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            working_dir: None,
            env: HashMap::new(),
            capture_output: true,
        }
    }
}

impl ExecOptions {
    /// Create options with a working directory
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: Some(dir.into()),
            ..Default::default()
        }
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Stream output to the terminal instead of capturing it
    pub fn live(mut self) -> Self {
        self.capture_output = false;
        self
    }
}

/// Result of a finished command
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Whether the command succeeded (exit code 0)
    pub success: bool,
    /// Exit code if available (None when killed by a signal)
    pub exit_code: Option<i32>,
    /// Captured stdout followed by captured stderr
    pub output: String,
    /// Duration of execution
    pub duration: Duration,
}

impl ExecResult {
    /// A successful result with the given output
    pub fn succeeded(output: impl Into<String>) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            output: output.into(),
            duration: Duration::ZERO,
        }
    }

    /// A failed result with the given exit code and output
    pub fn failed(exit_code: Option<i32>, output: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code,
            output: output.into(),
            duration: Duration::ZERO,
        }
    }

    /// Output with surrounding whitespace (and the trailing newline) removed
    pub fn trimmed(&self) -> &str {
        self.output.trim()
    }
}

/// Runs one shell command line to completion
///
/// Implementations must be shareable across batch workers.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessRunner: Send + Sync {
    /// Execute `command` and wait for it to exit
    ///
    /// # Errors
    /// * `ProcessError::SpawnFailed` - If the process could not be started at all.
    ///   A command that starts and exits non-zero is `Ok` with `success == false`.
    fn run(&self, command: &str, options: &ExecOptions) -> Result<ExecResult, ProcessError>;
}

/// [`ProcessRunner`] that hands command lines to the platform shell
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
    shell_args: Vec<String>,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellRunner {
    /// Use `/bin/sh -c` on Unix and `cmd.exe /C` on Windows
    pub fn new() -> Self {
        if cfg!(windows) {
            Self {
                shell: "cmd.exe".to_string(),
                shell_args: vec!["/C".to_string()],
            }
        } else {
            Self {
                shell: "/bin/sh".to_string(),
                shell_args: vec!["-c".to_string()],
            }
        }
    }

    /// Use an explicit shell, picking the matching command flag
    pub fn with_shell(shell: impl Into<String>) -> Self {
        let shell = shell.into();
        let shell_args = if shell.contains("powershell") || shell.contains("pwsh") {
            vec!["-NoProfile".to_string(), "-Command".to_string()]
        } else if shell.contains("cmd") {
            vec!["/C".to_string()]
        } else {
            vec!["-c".to_string()]
        };
        Self { shell, shell_args }
    }

    /// The shell program this runner spawns
    pub fn shell(&self) -> &str {
        &self.shell
    }
}

impl ProcessRunner for ShellRunner {
    fn run(&self, command: &str, options: &ExecOptions) -> Result<ExecResult, ProcessError> {
        let start = Instant::now();

        let mut cmd = Command::new(&self.shell);
        cmd.args(&self.shell_args).arg(command);

        if let Some(ref dir) = options.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &options.env {
            cmd.env(key, value);
        }

        tracing::debug!(shell = %self.shell, cwd = ?options.working_dir, "Executing: {}", command);

        let spawn_failed = |e: std::io::Error| ProcessError::SpawnFailed {
            command: command.to_string(),
            error: e.to_string(),
        };

        let (status, output) = if options.capture_output {
            let output = cmd
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .map_err(spawn_failed)?;
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            (output.status, text)
        } else {
            let status = cmd.status().map_err(spawn_failed)?;
            (status, String::new())
        };

        Ok(ExecResult {
            success: status.success(),
            exit_code: status.code(),
            output,
            duration: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_options_default() {
        let options = ExecOptions::default();

        assert!(options.working_dir.is_none());
        assert!(options.env.is_empty());
        assert!(options.capture_output);
    }

    #[test]
    fn test_exec_options_builder() {
        let options = ExecOptions::in_dir("/tmp").with_env("KEY", "value").live();

        assert_eq!(options.working_dir, Some(PathBuf::from("/tmp")));
        assert_eq!(options.env.get("KEY"), Some(&"value".to_string()));
        assert!(!options.capture_output);
    }

    #[test]
    fn test_with_shell_picks_flag() {
        assert_eq!(ShellRunner::with_shell("bash").shell_args, vec!["-c"]);
        assert_eq!(ShellRunner::with_shell("cmd.exe").shell_args, vec!["/C"]);
        assert_eq!(
            ShellRunner::with_shell("pwsh").shell_args,
            vec!["-NoProfile", "-Command"]
        );
    }

    #[test]
    fn test_exec_result_trimmed() {
        let result = ExecResult::succeeded("abc123\n");
        assert_eq!(result.trimmed(), "abc123");
        assert!(result.success);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_success() {
        let result = ShellRunner::new()
            .run("echo 'hello world'", &ExecOptions::default())
            .unwrap();

        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert!(result.output.contains("hello world"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_failure_exit_code() {
        let result = ShellRunner::new()
            .run("echo oops; exit 3", &ExecOptions::default())
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
        assert!(result.output.contains("oops"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_captures_stderr() {
        let result = ShellRunner::new()
            .run("echo out; echo err >&2", &ExecOptions::default())
            .unwrap();

        assert!(result.output.contains("out"));
        assert!(result.output.contains("err"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_with_env() {
        let options = ExecOptions::default().with_env("MY_VAR", "test_value");
        let result = ShellRunner::new().run("echo $MY_VAR", &options).unwrap();

        assert!(result.success);
        assert!(result.output.contains("test_value"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_working_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let options = ExecOptions::in_dir(dir.path());
        let result = ShellRunner::new().run("pwd", &options).unwrap();

        let expected = dir.path().canonicalize().unwrap();
        let reported = PathBuf::from(result.trimmed()).canonicalize().unwrap();
        assert_eq!(reported, expected);
    }

    #[test]
    fn test_run_spawn_failed() {
        let runner = ShellRunner::with_shell("/nonexistent/shell_12345");
        let result = runner.run("echo hi", &ExecOptions::default());

        match result {
            Err(ProcessError::SpawnFailed { command, .. }) => {
                assert_eq!(command, "echo hi");
            }
            other => panic!("Expected SpawnFailed error, got {:?}", other),
        }
    }
}
