//! Building testsuite examples for the emulated target.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};

/// Target triple of the emulated Cortex-M3.
const TARGET: &str = "thumbv7m-none-eabi";

/// Get the workspace root directory.
pub fn project_root() -> PathBuf {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR")
        .map(PathBuf::from)
        .or_else(|_| std::env::current_dir())
        .unwrap_or_default();

    // If we're in xtask/, go up one level.
    if manifest_dir.ends_with("xtask") {
        if let Some(parent) = manifest_dir.parent() {
            return parent.to_path_buf();
        }
    }
    manifest_dir
}

/// Build an example and return the path to the ELF.
pub fn build_example(example: &str, release: bool) -> Result<PathBuf> {
    let root = project_root();

    let mut cmd = Command::new("cargo");
    cmd.current_dir(root.join("testsuite"))
        .stderr(Stdio::inherit())
        .args(["build", "--example", example, "--target", TARGET]);

    if release {
        cmd.arg("--release");
    }

    let status = cmd.status().context("Failed to run cargo build")?;
    if !status.success() {
        bail!("cargo build failed for '{example}'");
    }

    let profile = if release { "release" } else { "debug" };
    Ok(root
        .join("target")
        .join(TARGET)
        .join(profile)
        .join("examples")
        .join(example))
}

/// Discover all examples in the testsuite.
pub fn discover_examples() -> Result<Vec<String>> {
    let examples_dir = project_root().join("testsuite").join("examples");

    let mut examples = Vec::new();
    for entry in fs::read_dir(&examples_dir)
        .with_context(|| format!("Failed to read {}", examples_dir.display()))?
    {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "rs") {
            if let Some(stem) = path.file_stem() {
                examples.push(stem.to_string_lossy().into_owned());
            }
        }
    }
    examples.sort();
    Ok(examples)
}
