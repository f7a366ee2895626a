//! CLI command definitions using clap
//!
//! Defines all CLI subcommands and their arguments.

use clap::{Parser, Subcommand, ValueEnum};

/// Incremental C/C++ build orchestrator.
///
/// Recompiles only what changed, compiles in parallel, links once, and
/// keeps pinned toolchains (vcpkg, clang) ready under the build directory.
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (layered over kiln.toml and the XDG paths)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true)]
    pub project: Option<String>,

    /// Log output format
    #[arg(long, value_enum, global = true, default_value = "text")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile stale sources and link the target
    Build(BuildArgs),

    /// List sources that need recompiling
    Stale(StaleArgs),

    /// Run the formatter over changed sources and headers
    Format(FormatArgs),

    /// Write compile_commands.json
    CompileCommands,

    /// Fetch and verify pinned toolchains, then install manifest packages
    Bootstrap(BootstrapArgs),

    /// Remove build outputs (toolchains are kept)
    Clean,

    /// Show the resolved configuration
    Config(ConfigArgs),
}

/// Arguments for the `build` subcommand
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Maximum parallel jobs (default: one per stale source)
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

/// Arguments for the `stale` subcommand
#[derive(Parser, Debug)]
pub struct StaleArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Include up-to-date sources
    #[arg(short, long)]
    pub all: bool,
}

/// Arguments for the `format` subcommand
#[derive(Parser, Debug)]
pub struct FormatArgs {
    /// Maximum parallel jobs (default: one per file)
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

/// Arguments for the `bootstrap` subcommand
#[derive(Parser, Debug)]
pub struct BootstrapArgs {
    /// Toolchain to bootstrap (default: all configured)
    pub tool: Option<String>,
}

/// Arguments for the `config` subcommand
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Output format options
#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format
    Table,
    /// JSON output
    Json,
    /// Plain text (one path per line)
    Plain,
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_build() {
        let cli = Cli::parse_from(["kiln", "build"]);
        if let Commands::Build(args) = cli.command {
            assert!(args.jobs.is_none());
        } else {
            panic!("Expected Build command");
        }
        assert!(!cli.verbose);
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn test_cli_parse_build_with_jobs() {
        let cli = Cli::parse_from(["kiln", "build", "-j", "8"]);
        if let Commands::Build(args) = cli.command {
            assert_eq!(args.jobs, Some(8));
        } else {
            panic!("Expected Build command");
        }
    }

    #[test]
    fn test_cli_parse_stale_json() {
        let cli = Cli::parse_from(["kiln", "stale", "-f", "json", "--all"]);
        if let Commands::Stale(args) = cli.command {
            assert!(matches!(args.format, OutputFormat::Json));
            assert!(args.all);
        } else {
            panic!("Expected Stale command");
        }
    }

    #[test]
    fn test_cli_parse_bootstrap() {
        let cli = Cli::parse_from(["kiln", "bootstrap", "vcpkg"]);
        if let Commands::Bootstrap(args) = cli.command {
            assert_eq!(args.tool, Some("vcpkg".to_string()));
        } else {
            panic!("Expected Bootstrap command");
        }

        let cli = Cli::parse_from(["kiln", "bootstrap"]);
        assert!(matches!(cli.command, Commands::Bootstrap(BootstrapArgs { tool: None })));
    }

    #[test]
    fn test_cli_parse_simple_commands() {
        assert!(matches!(
            Cli::parse_from(["kiln", "compile-commands"]).command,
            Commands::CompileCommands
        ));
        assert!(matches!(Cli::parse_from(["kiln", "clean"]).command, Commands::Clean));
        assert!(matches!(
            Cli::parse_from(["kiln", "format"]).command,
            Commands::Format(_)
        ));
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from([
            "kiln",
            "-v",
            "-c",
            "/path/to/config.toml",
            "-p",
            "/tmp/project",
            "--log-format",
            "json",
            "clean",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some("/path/to/config.toml".to_string()));
        assert_eq!(cli.project, Some("/tmp/project".to_string()));
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn test_cli_verify() {
        // Verify CLI structure is valid
        Cli::command().debug_assert();
    }
}
