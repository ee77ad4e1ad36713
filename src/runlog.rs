//! Timestamped run logs: a markdown summary per run and an error log when
//! defects were collected.

use std::{
    collections::BTreeMap,
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::Utc;

use crate::context::Defect;

const OUTPUT_DIR_NAME: &str = "output";

/// UTC stamp used in log file names, e.g. `20251017_141503`.
pub fn timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// `logs/` next to an `output` directory, otherwise inside the output directory.
pub fn default_logs_dir(output_dir: &Path) -> PathBuf {
    let is_output = output_dir
        .file_name()
        .is_some_and(|name| name.to_string_lossy().eq_ignore_ascii_case(OUTPUT_DIR_NAME));
    match output_dir.parent() {
        Some(parent) if is_output => parent.join("logs"),
        _ => output_dir.join("logs"),
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Creating directory {parent:?}"))?;
    }
    fs::write(path, contents).with_context(|| format!("Writing log file {path:?}"))
}

/// Writes `errors/errors_<stamp>.log`. Returns `None` when there is nothing to report.
pub fn write_error_log(logs_dir: &Path, stamp: &str, defects: &[Defect]) -> Result<Option<PathBuf>> {
    if defects.is_empty() {
        return Ok(None);
    }
    let mut text = String::new();
    for defect in defects {
        let _ = writeln!(text, "=== {} ===\n{defect}\n", defect.kind());
    }
    let path = logs_dir.join("errors").join(format!("errors_{stamp}.log"));
    write_file(&path, &text)?;
    Ok(Some(path))
}

/// Writes `log_<stamp>.md` listing every rendered cube and view document.
pub fn write_run_log(
    logs_dir: &Path,
    stamp: &str,
    heading: &str,
    cubes: &BTreeMap<String, String>,
    views: &BTreeMap<String, String>,
    error_log: Option<&Path>,
) -> Result<PathBuf> {
    let mut text = format!("### {heading}\n\nTimestamp: {stamp}\n\nProcessed cubes:\n");
    if cubes.is_empty() {
        text.push_str("(none)\n");
    }
    for name in cubes.keys() {
        let _ = writeln!(text, "- {name}");
    }
    if !views.is_empty() {
        text.push_str("\nProcessed views:\n");
        for name in views.keys() {
            let _ = writeln!(text, "- {name}");
        }
    }
    text.push_str("\n--- ## Generated YAMLs\n");
    for (name, yaml) in cubes {
        let _ = write!(text, "\n### {name}\n\n```yaml\n{}\n```\n", yaml.trim());
    }
    for (name, yaml) in views {
        let _ = write!(text, "\n### View {name}\n\n```yaml\n{}\n```\n", yaml.trim());
    }
    if let Some(error_log) = error_log {
        let _ = write!(text, "\n---\nErrors were captured in: {}\n", error_log.display());
    }
    let path = logs_dir.join(format!("log_{stamp}.md"));
    write_file(&path, &text)?;
    Ok(path)
}

/// Mirrors a standards report into `log_semantic_standards_<stem>_<stamp>.txt`.
pub fn write_standards_log(logs_dir: &Path, stem: &str, stamp: &str, report: &str) -> Result<PathBuf> {
    let path = logs_dir.join(format!("log_semantic_standards_{stem}_{stamp}.txt"));
    write_file(&path, report)?;
    Ok(path)
}
