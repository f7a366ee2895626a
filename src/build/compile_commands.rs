//! `compile_commands.json` for clangd and other editor tooling

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::orchestrator::Builder;
use crate::engine::CommandTemplate;
use crate::error::BuildError;
use crate::executor::ProcessRunner;

/// File name of the compilation database
pub const COMPILE_COMMANDS_FILE: &str = "compile_commands.json";

/// One entry of a JSON compilation database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileCommand {
    pub directory: String,
    pub command: String,
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output: Option<String>,
}

impl<R: ProcessRunner + ?Sized> Builder<'_, R> {
    /// The compile command of every source, stale or not
    pub fn compile_commands(&self) -> Result<Vec<CompileCommand>, BuildError> {
        let config = self.config();
        let template = CommandTemplate::parse(&config.expand_template(&config.compile.command));
        let object = config
            .compile
            .check_files
            .first()
            .map(|pattern| CommandTemplate::parse(&config.expand_template(pattern)));
        let directory = self.project_dir().to_string_lossy().into_owned();

        Ok(self
            .sources()?
            .iter()
            .map(|source| CompileCommand {
                directory: directory.clone(),
                command: template.instantiate(source),
                file: source.to_string_lossy().into_owned(),
                output: object.as_ref().map(|o| o.instantiate(source)),
            })
            .collect())
    }

    /// Write the database to the project directory
    pub fn write_compile_commands(&self) -> Result<PathBuf, BuildError> {
        let entries = self.compile_commands()?;
        if entries.is_empty() {
            return Err(BuildError::NoSources);
        }
        let path = self.project_dir().join(COMPILE_COMMANDS_FILE);
        fs::write(&path, serde_json::to_string_pretty(&entries)? + "\n")?;
        tracing::info!("Wrote {} entries to {}", entries.len(), path.display());
        Ok(path)
    }
}
