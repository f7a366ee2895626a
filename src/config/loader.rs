//! Configuration loader with XDG-compliant path resolution
//!
//! Loads configuration from multiple locations with layered priority:
//! 1. `/etc/kiln/config.toml` (lowest priority)
//! 2. `~/.config/kiln/config.toml`
//! 3. `~/.kiln.toml`
//! 4. `./kiln.toml` (the project file)
//! 5. `--config <file>`
//! 6. `KILN_` environment variables (highest priority)

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use super::interpolate::interpolate_config;
use super::model::Config;

/// Application name used for XDG directories
const APP_NAME: &str = "kiln";

/// Project configuration file name
pub const PROJECT_FILE: &str = "kiln.toml";

/// Get XDG config search paths in priority order (lowest to highest)
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. System-wide config (lowest priority)
    paths.push(PathBuf::from(format!("/etc/{}/config.toml", APP_NAME)));

    // 2. XDG config home
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join(APP_NAME).join("config.toml"));
    }

    // 3. Home directory
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(format!(".{}.toml", APP_NAME)));
    }

    // 4. Project file in the current directory (highest file priority)
    paths.push(PathBuf::from(PROJECT_FILE));

    paths
}

/// Load the layered project configuration
///
/// Every file from [`find_config_files`] is merged over the built-in
/// defaults, later files winning. `KILN_` variables (`KILN_BUILD__JOBS=8`
/// sets `build.jobs`) override all files.
///
/// # Errors
/// * If `override_path` names a file that does not exist
/// * If a file is not valid TOML or a value has the wrong type
pub fn load_config(override_path: Option<&str>) -> Result<Config> {
    if let Some(path) = override_path {
        if !Path::new(path).exists() {
            bail!("Config file not found: {}", path);
        }
    }

    let figment = find_config_files(override_path).iter().fold(
        Figment::from(Serialized::defaults(Config::default())),
        |figment, path| {
            tracing::debug!("Loading config from: {}", path.display());
            figment.merge(Toml::file(path))
        },
    );

    let mut config: Config = figment
        .merge(Env::prefixed("KILN_").split("__"))
        .extract()
        .context("Failed to load configuration")?;
    interpolate_config(&mut config);
    Ok(config)
}

/// Config files that exist, lowest priority first
///
/// These are also the build's driver files: touching any of them
/// invalidates every compiled output.
pub fn find_config_files(override_path: Option<&str>) -> Vec<PathBuf> {
    config_paths()
        .into_iter()
        .chain(override_path.map(PathBuf::from))
        .filter(|path| path.exists())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_config_paths_returns_expected_paths() {
        let paths = config_paths();

        assert!(paths.len() >= 2);

        // First should be system-wide
        assert!(paths[0].to_string_lossy().contains("/etc/"));

        // Last should be the project file
        assert_eq!(paths.last().unwrap(), &PathBuf::from("kiln.toml"));
    }

    #[test]
    fn test_load_config_defaults() {
        let config = load_config(None).unwrap();

        assert_eq!(config.compile.depfile_index, 1);
        assert!(!config.compile.check_files.is_empty());
    }

    #[test]
    fn test_load_config_from_override() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("test-config.toml");

        fs::write(
            &config_path,
            r#"
            [target]
            name = "demo"
            sources = ["app/*.cpp"]

            [build]
            jobs = 3
            "#,
        )
        .unwrap();

        let config = load_config(Some(config_path.to_str().unwrap())).unwrap();

        assert_eq!(config.target.name, "demo");
        assert_eq!(config.target.sources, vec!["app/*.cpp"]);
        assert_eq!(config.build.jobs, Some(3));
        // Untouched sections keep their defaults
        assert_eq!(config.compile.depfile_index, 1);
    }

    #[test]
    fn test_load_config_with_toolchains() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("test-config.toml");

        fs::write(
            &config_path,
            r#"
            [toolchains.vcpkg]
            version = "2024.11.16"

            [toolchains.ninja]
            version = "1.12.1"
            kind = "archive"
            url = "https://example.com/ninja-{version}.zip"
            binary = "ninja"
            "#,
        )
        .unwrap();

        let config = load_config(Some(config_path.to_str().unwrap())).unwrap();

        assert_eq!(config.toolchains.len(), 2);
        assert_eq!(config.toolchains["vcpkg"].version, "2024.11.16");
        assert_eq!(
            config.toolchains["ninja"].kind,
            Some(crate::toolchain::ToolKind::Archive)
        );
    }

    #[test]
    fn test_find_config_files_includes_override() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("extra.toml");
        fs::write(&config_path, "").unwrap();

        let files = find_config_files(Some(config_path.to_str().unwrap()));
        assert!(files.contains(&config_path));
        assert!(!find_config_files(Some("/nonexistent/kiln.toml"))
            .contains(&PathBuf::from("/nonexistent/kiln.toml")));
    }

    #[test]
    fn test_env_override() {
        // Unique key so parallel tests do not observe it
        std::env::set_var("KILN_TARGET__BUILD_DIR", "out-env");

        let config = load_config(None).unwrap();

        std::env::remove_var("KILN_TARGET__BUILD_DIR");

        assert_eq!(config.target.build_dir, "out-env");
    }

    #[test]
    fn test_missing_override_file_is_an_error() {
        let err = load_config(Some("/nonexistent/config.toml")).unwrap_err();

        assert!(err.to_string().contains("/nonexistent/config.toml"));
    }

    #[test]
    fn test_invalid_value_is_an_error() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("bad.toml");
        fs::write(&config_path, "[build]\njobs = \"many\"\n").unwrap();

        assert!(load_config(Some(config_path.to_str().unwrap())).is_err());
    }
}
