//! Glob-based discovery of sources and headers

use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::BuildError;

/// Expand glob patterns into existing files
///
/// Files are returned in pattern order, each pattern's matches sorted, with
/// duplicates dropped after their first appearance.
///
/// # Errors
/// * `BuildError::Config` - If a pattern is not a valid glob
pub fn discover(patterns: &[String]) -> Result<Vec<PathBuf>, BuildError> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for pattern in patterns {
        let entries = glob::glob(pattern)
            .map_err(|e| BuildError::Config(format!("Invalid glob '{}': {}", pattern, e)))?;

        let mut matched: Vec<PathBuf> = entries
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!("Skipping unreadable path: {}", e);
                    None
                }
            })
            .filter(|path| path.is_file())
            .collect();
        matched.sort();

        tracing::debug!("{} matched {} file(s)", pattern, matched.len());
        for path in matched {
            if seen.insert(path.clone()) {
                files.push(path);
            }
        }
    }

    Ok(files)
}
