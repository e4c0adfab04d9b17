//! External test runner invocation
//!
//! The generated suite is handed to whatever framework runs it. Runner
//! commands may mention `{file}` (the suite path) and `{stem}` (its file
//! name without extension); without either, the path is appended.

use crate::synthesizer::Dialect;
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Command;

/// Conventional runner for a dialect
pub fn default_runner(dialect: Dialect) -> Vec<String> {
    let parts: &[&str] = match dialect {
        Dialect::Jasmine => &["jasmine", "{file}"],
        Dialect::Rust => &["cargo", "test", "--test", "{stem}"],
    };
    parts.iter().map(|s| s.to_string()).collect()
}

/// Split a runner given as one string on whitespace
pub fn parse_runner(spec: &str) -> Result<Vec<String>> {
    let parts: Vec<String> = spec.split_whitespace().map(str::to_string).collect();
    if parts.is_empty() {
        bail!("Runner command is empty");
    }
    Ok(parts)
}

/// Substitute placeholders, appending the suite path when none is used
pub fn expand_runner(command: &[String], test_file: &Path) -> Vec<String> {
    let file = test_file.display().to_string();
    let stem = test_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut used_placeholder = false;
    let mut expanded: Vec<String> = command
        .iter()
        .map(|part| {
            if part.contains("{file}") || part.contains("{stem}") {
                used_placeholder = true;
            }
            part.replace("{file}", &file).replace("{stem}", &stem)
        })
        .collect();

    if !used_placeholder {
        expanded.push(file);
    }
    expanded
}

/// Run the generated suite, inheriting stdio. A failing run is an error.
pub fn run_tests(command: &[String], test_file: &Path) -> Result<()> {
    let expanded = expand_runner(command, test_file);
    let Some((program, args)) = expanded.split_first() else {
        bail!("Runner command is empty");
    };

    tracing::info!("running {}", expanded.join(" "));
    let status = Command::new(program)
        .args(args)
        .status()
        .with_context(|| format!("Failed to run test runner {}", program))?;

    if !status.success() {
        bail!("Test runner {} failed with {}", program, status);
    }
    Ok(())
}
