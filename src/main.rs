//! kiln CLI entry point
//!
//! Usage:
//!   kiln build [-j N]          Compile stale sources and link
//!   kiln stale                 List sources that need recompiling
//!   kiln format [-j N]         Format changed sources and headers
//!   kiln compile-commands      Write compile_commands.json
//!   kiln bootstrap [TOOL]      Fetch and verify pinned toolchains, install packages
//!   kiln clean                 Remove build outputs
//!   kiln config                Show configuration

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use kiln::build::Builder;
use kiln::cli::{
    commands::{BootstrapArgs, BuildArgs, ConfigArgs, FormatArgs, LogFormat, OutputFormat, StaleArgs},
    Cli, Commands, ConsoleHooks,
};
use kiln::config::{find_config_files, load_config, Config};
use kiln::error::{suggest_fix, BuildError};
use kiln::executor::ShellRunner;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr; `RUST_LOG` overrides the level picked by `-v`
fn init_logging(verbose: bool, format: LogFormat) {
    let default = if verbose { "kiln=debug" } else { "kiln=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose);

    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if let Err(e) = result {
        eprintln!("{}: failed to initialize logging: {}", "warning".yellow(), e);
    }
}

fn run(cli: Cli) -> Result<()> {
    let project_dir = enter_project(cli.project.as_deref())?;
    let config = load_config(cli.config.as_deref())?;

    let runner = match config.build.shell.as_deref() {
        Some(shell) => ShellRunner::with_shell(shell),
        None => ShellRunner::new(),
    };

    let mut drivers: Vec<PathBuf> = find_config_files(cli.config.as_deref())
        .into_iter()
        .map(|path| project_dir.join(path))
        .collect();
    if let Ok(exe) = std::env::current_exe() {
        drivers.push(exe);
    }

    let builder = Builder::new(&config, &project_dir, &runner).with_drivers(drivers);

    match cli.command {
        Commands::Build(args) => build(builder, args, cli.verbose),
        Commands::Stale(args) => show_stale(&builder, args),
        Commands::Format(args) => format(builder, args, cli.verbose),
        Commands::CompileCommands => {
            let path = builder.write_compile_commands()?;
            println!("{}: {}", "Wrote".green(), path.display());
            Ok(())
        }
        Commands::Bootstrap(args) => bootstrap(&builder, args),
        Commands::Clean => clean(&builder),
        Commands::Config(args) => show_config(&config, &builder, args),
    }
}

/// Switch into the project directory so `kiln.toml` is found there
fn enter_project(project: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = project {
        std::env::set_current_dir(dir)
            .with_context(|| format!("Project directory '{}' not found", dir))?;
    }
    std::env::current_dir().context("Failed to get current directory")
}

/// Compile stale sources and link
fn build(builder: Builder<'_, ShellRunner>, args: BuildArgs, verbose: bool) -> Result<()> {
    let builder = builder.with_jobs(args.jobs);
    let hooks = ConsoleHooks::new(verbose);
    let result = builder.build(&hooks);
    hooks.finish();

    let report = result.map_err(report_failure)?;
    let output = relative(builder.project_dir(), &report.output);

    if let Some(ref packages) = report.packages {
        println!("{}: {}", "Packages".green(), packages.triplet);
    }
    println!(
        "{}: {} of {} source(s) compiled",
        "Compiled".green(),
        report.compiled.len(),
        report.sources
    );
    if report.linked {
        println!("{}: {}", "Linked".green(), output);
    } else {
        println!("{}: {}", "Up to date".green(), output);
    }
    Ok(())
}

/// Print the link output (batch failures were already printed by the hooks)
fn report_failure(error: BuildError) -> anyhow::Error {
    if let BuildError::LinkFailed {
        command, output, ..
    } = &error
    {
        eprintln!("{}", command.dimmed());
        if !output.trim().is_empty() {
            eprintln!("{}", output.trim_end());
        }
        if let Some(hint) = suggest_fix(command, output) {
            eprintln!("{}: {}", "hint".yellow(), hint);
        }
    }
    error.into()
}

/// Show which sources would be recompiled
fn show_stale(builder: &Builder<'_, ShellRunner>, args: StaleArgs) -> Result<()> {
    let sources = builder.sources()?;
    let verdicts: Vec<_> = builder
        .stale_sources(&sources)
        .into_iter()
        .filter(|(_, verdict)| args.all || verdict.is_stale())
        .collect();

    match args.format {
        OutputFormat::Json => {
            let entries: Vec<_> = verdicts
                .iter()
                .map(|(source, verdict)| {
                    serde_json::json!({
                        "source": relative(builder.project_dir(), source),
                        "stale": verdict.is_stale(),
                        "reason": verdict.to_string(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Plain => {
            for (source, _) in &verdicts {
                println!("{}", relative(builder.project_dir(), source));
            }
        }
        OutputFormat::Table => {
            if verdicts.is_empty() {
                println!("All {} source(s) up to date.", sources.len());
            } else {
                let width = verdicts
                    .iter()
                    .map(|(source, _)| relative(builder.project_dir(), source).len())
                    .max()
                    .unwrap_or(10);
                for (source, verdict) in &verdicts {
                    let name = relative(builder.project_dir(), source);
                    let reason = if verdict.is_stale() {
                        verdict.to_string().yellow()
                    } else {
                        verdict.to_string().green()
                    };
                    println!("  {:width$}  {}", name, reason, width = width);
                }
            }
        }
    }
    Ok(())
}

/// Run the formatter over changed files
fn format(builder: Builder<'_, ShellRunner>, args: FormatArgs, verbose: bool) -> Result<()> {
    let builder = builder.with_jobs(args.jobs);
    let hooks = ConsoleHooks::new(verbose);
    let result = builder.format(&hooks);
    hooks.finish();

    let report = result?;
    println!(
        "{}: {} of {} file(s)",
        "Formatted".green(),
        report.formatted.len(),
        report.checked
    );
    Ok(())
}

/// Ensure pinned toolchains
fn bootstrap(builder: &Builder<'_, ShellRunner>, args: BootstrapArgs) -> Result<()> {
    let handles = builder.ensure_toolchains(args.tool.as_deref())?;
    if handles.is_empty() {
        println!("No toolchains configured.");
    }
    for handle in &handles {
        println!(
            "{} {}: {}",
            handle.name.cyan(),
            handle.version,
            handle.binary.display()
        );
    }
    if let Some(packages) = builder.install_packages(&handles)? {
        println!("{} {}:", "packages".cyan(), packages.triplet);
        println!("  include: {}", packages.include.display());
        println!("  lib: {}", packages.lib.display());
    }
    Ok(())
}

/// Remove build outputs
fn clean(builder: &Builder<'_, ShellRunner>) -> Result<()> {
    let removed = builder.clean()?;
    for path in &removed {
        tracing::debug!("Removed {}", path.display());
    }
    println!("{}: {} item(s)", "Removed".green(), removed.len());
    Ok(())
}

/// Show the resolved configuration
fn show_config(config: &Config, builder: &Builder<'_, ShellRunner>, args: ConfigArgs) -> Result<()> {
    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        OutputFormat::Plain => {
            print!("{}", toml::to_string_pretty(config)?);
        }
        OutputFormat::Table => {
            let rooted = builder.config();
            println!("{}: {}", "Target".cyan(), config.target.name);
            println!("{}: {:?}", "Artifact".cyan(), config.target.artifact);
            println!("{}: {}", "Configuration".cyan(), config.target.configuration);
            println!("{}: {}", "Sources".cyan(), config.target.sources.join(", "));
            println!("{}: {}", "Build Dir".cyan(), rooted.build_dir().display());
            println!("{}: {}", "Output".cyan(), rooted.output_path().display());
            println!("{}: {}", "Compile".cyan(), config.compile.command);
            println!("{}: {}", "Link".cyan(), config.link_command());
            if let Some(ref command) = config.format.command {
                println!("{}: {}", "Format".cyan(), command);
            }
            match config.build.jobs {
                Some(jobs) => println!("{}: {}", "Jobs".cyan(), jobs),
                None => println!("{}: one per item", "Jobs".cyan()),
            }
            if !config.toolchains.is_empty() {
                println!("{}:", "Toolchains".cyan());
                for (name, toolchain) in &config.toolchains {
                    println!("  {} {}", name, toolchain.version);
                }
                if config.package_installer().is_some() {
                    println!("{}: {}", "Triplet".cyan(), config.package_triplet());
                }
            }
            let files = find_config_files(None);
            if !files.is_empty() {
                println!("{}:", "Config Files".cyan());
                for file in files {
                    println!("  - {}", file.display());
                }
            }
        }
    }
    Ok(())
}

/// Path relative to the project, for display
fn relative(project_dir: &Path, path: &Path) -> String {
    path.strip_prefix(project_dir)
        .unwrap_or(path)
        .display()
        .to_string()
}
