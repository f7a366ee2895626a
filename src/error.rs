//! Error types for kiln
//!
//! Failures are split by where they surface: process spawning, batch
//! aggregation, toolchain bootstrap, and the top-level build pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to start a child process at all
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The shell (or program) could not be spawned
    #[error("Failed to spawn command: {command}")]
    SpawnFailed { command: String, error: String },
}

/// One batch item whose process could not be started
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}: Failed to execute command: '{command}' ({error})", .item.display())]
pub struct LaunchFailure {
    pub item: PathBuf,
    pub command: String,
    pub error: String,
}

/// Aggregated failure of a parallel batch
#[derive(Error, Debug)]
pub enum BatchError {
    /// At least one item could not be launched
    #[error("{task}: {} command(s) could not be started", .failures.len())]
    Launch {
        task: String,
        failures: Vec<LaunchFailure>,
    },

    /// Every item launched but at least one exited non-zero
    #[error("{task} errors occurred ({} of {total} item(s) failed)", .failed.len())]
    ItemsFailed {
        task: String,
        failed: Vec<PathBuf>,
        total: usize,
    },

    /// The worker pool for the batch could not be created
    #[error("Failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Failure to inspect recorded dependencies of one source
///
/// Never fatal: the staleness tracker treats it as "needs rebuild".
#[derive(Error, Debug)]
pub enum DependencyError {
    /// Fewer check files than the handler needs
    #[error("Check file #{index} not provided")]
    MissingCheckFile { index: usize },

    /// The dependency listing could not be understood
    #[error("Malformed dependency listing {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("Invalid JSON dependency listing: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure while ensuring a pinned toolchain
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// A program needed to fetch the toolchain is not on PATH
    #[error("'{program}' is required to bootstrap {tool} but was not found on PATH")]
    MissingProgram { tool: String, program: String },

    /// A fetch/extract/build step exited non-zero
    #[error("{step} failed for {tool} (exit code {exit_code:?})")]
    StepFailed {
        tool: String,
        step: String,
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    /// The pinned version does not exist in the tool's history
    #[error("{tool} has no version '{version}'")]
    UnknownVersion { tool: String, version: String },

    /// The installation still reports another version after switching
    #[error("{tool} reports version {found} after switching to {expected}")]
    VersionMismatch {
        tool: String,
        expected: String,
        found: String,
    },

    /// Bootstrap succeeded but the expected binary is absent
    #[error("Failed to find {}", .path.display())]
    MissingBinary { tool: String, path: PathBuf },

    /// `install` succeeded but an expected package directory is absent
    #[error("{tool} outputs not found: {}", .path.display())]
    MissingPackageOutputs { tool: String, path: PathBuf },

    /// Prebuilt archives are only published for 64-bit hosts
    #[error("{tool} bootstrap only supports 64 bit architectures (host is {arch})")]
    UnsupportedArch { tool: String, arch: String },

    /// Spawning a bootstrap step failed
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error for a build invocation
#[derive(Error, Debug)]
pub enum BuildError {
    /// No source matched the configured patterns
    #[error("No source files to compile")]
    NoSources,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Toolchain not declared in configuration
    #[error("Toolchain not configured: {0}")]
    ToolchainNotFound(String),

    /// The single link step failed
    #[error("Linking errors occurred (exit code {exit_code:?})")]
    LinkFailed {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Suggest fixes for common compiler and linker output patterns
pub fn suggest_fix(command: &str, output: &str) -> Option<String> {
    // Missing headers
    if (output.contains("No such file or directory") && output.contains("#include"))
        || output.contains("Cannot open include file")
        || output.contains("file not found")
    {
        return Some(
            "Header not found. Check include directories in the compile command.".to_string(),
        );
    }

    // Linker errors
    if output.contains("undefined reference")
        || output.contains("unresolved external symbol")
        || output.contains("Undefined symbols")
    {
        return Some(
            "Unresolved symbol. Check the link command's libraries and object list.".to_string(),
        );
    }

    if output.contains("cannot find -l") || output.contains("cannot open input file") {
        return Some("Library not found. Check library directories in the link command.".to_string());
    }

    // Command not found
    if output.contains("command not found")
        || output.contains("is not recognized as an internal or external command")
    {
        if command.contains("clang") {
            return Some(
                "clang not found. Run 'kiln bootstrap clang' or check PATH.".to_string(),
            );
        }
        if command.contains("vcpkg") {
            return Some("vcpkg not found. Run 'kiln bootstrap vcpkg'.".to_string());
        }
        return Some("Required command not found. Check PATH and toolchains.".to_string());
    }

    // Permission errors
    if output.contains("Permission denied") {
        return Some(
            "Permission denied. An output file may be locked by a running process.".to_string(),
        );
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_failure_display() {
        let failure = LaunchFailure {
            item: PathBuf::from("src/main.cpp"),
            command: "clang++ -c src/main.cpp".to_string(),
            error: "No such file or directory".to_string(),
        };
        let message = failure.to_string();
        assert!(message.starts_with("src/main.cpp: Failed to execute command"));
        assert!(message.contains("'clang++ -c src/main.cpp'"));
    }

    #[test]
    fn test_batch_items_failed_display() {
        let err = BatchError::ItemsFailed {
            task: "Compilation".to_string(),
            failed: vec![PathBuf::from("a.cpp")],
            total: 5,
        };
        assert_eq!(err.to_string(), "Compilation errors occurred (1 of 5 item(s) failed)");
    }

    #[test]
    fn test_batch_launch_display() {
        let err = BatchError::Launch {
            task: "Formatting".to_string(),
            failures: vec![],
        };
        assert!(err.to_string().starts_with("Formatting:"));
    }

    #[test]
    fn test_bootstrap_missing_binary_display() {
        let err = BootstrapError::MissingBinary {
            tool: "vcpkg".to_string(),
            path: PathBuf::from("build/toolchains/vcpkg/vcpkg"),
        };
        assert_eq!(err.to_string(), "Failed to find build/toolchains/vcpkg/vcpkg");
    }

    #[test]
    fn test_build_error_from_batch() {
        let err: BuildError = BatchError::ItemsFailed {
            task: "Compilation".to_string(),
            failed: vec![],
            total: 0,
        }
        .into();
        assert!(matches!(err, BuildError::Batch(_)));
        assert!(err.to_string().contains("Compilation errors occurred"));
    }

    #[test]
    fn test_suggest_fix_missing_header() {
        let suggestion = suggest_fix(
            "clang++ -c main.cpp",
            "main.cpp:1:10: fatal error: 'foo.h' file not found",
        );
        assert!(suggestion.unwrap().contains("include directories"));
    }

    #[test]
    fn test_suggest_fix_undefined_reference() {
        let suggestion = suggest_fix("clang++ -o app a.o", "a.o: undefined reference to `foo'");
        assert!(suggestion.unwrap().contains("Unresolved symbol"));
    }

    #[test]
    fn test_suggest_fix_command_not_found() {
        let suggestion = suggest_fix("clang++ -c a.cpp", "sh: 1: clang++: command not found");
        assert!(suggestion.unwrap().contains("kiln bootstrap clang"));
    }

    #[test]
    fn test_suggest_fix_no_match() {
        assert!(suggest_fix("some command", "some random error").is_none());
    }
}
