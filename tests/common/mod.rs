//! Common test utilities for kiln tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::TempDir;

/// A config whose "compiler" copies each source and whose "linker"
/// concatenates the objects, so builds need no C++ toolchain
pub const COPY_PROJECT_CONFIG: &str = r#"
[target]
name = "app"
sources = ["src/*.cpp"]
headers = []

[compile]
command = 'cp "[]" "{obj_dir}/[.stem].o"'
check_files = ["{obj_dir}/[.stem].o"]
depfile = "none"

[link]
command = 'cat {objects} > "{output}"'
output = "{build_dir}/app.txt"
"#;

/// Creates a temporary project with a kiln.toml and the given sources
pub fn create_project(config: &str, sources: &[(&str, &str)]) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    std::fs::write(dir.path().join("kiln.toml"), config).expect("Failed to write kiln.toml");
    for (name, content) in sources {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create source dir");
        }
        std::fs::write(&path, content).expect("Failed to write source");
    }
    let path = dir.path().to_path_buf();
    (dir, path)
}

/// Creates the copy project with two sources
pub fn create_copy_project() -> (TempDir, PathBuf) {
    create_project(
        COPY_PROJECT_CONFIG,
        &[("src/a.cpp", "A\n"), ("src/b.cpp", "B\n")],
    )
}

/// A `kiln` invocation inside `project`, isolated from user config
pub fn kiln(project: &Path) -> Command {
    let mut cmd = Command::cargo_bin("kiln").expect("kiln binary not built");
    cmd.current_dir(project)
        .env("HOME", project)
        .env("XDG_CONFIG_HOME", project.join(".config"))
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}
