//! Naming and documentation checks for rendered cube YAML files.

use std::{
    collections::BTreeSet,
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::debug;

use crate::yaml::{self, YamlValue};

const CUBE_PLACEHOLDER: &str = "{CUBE}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub label: &'static str,
    pub passed: bool,
    pub reason: Option<&'static str>,
}

impl Check {
    fn new(label: &'static str, passed: bool) -> Self {
        Self {
            label,
            passed,
            reason: None,
        }
    }
}

fn verdict(passed: bool) -> &'static str {
    if passed { "PASS" } else { "FAIL" }
}

/// Checks of one dimension or measure entry. `None` when the entry is not a
/// mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldReport {
    pub label: String,
    pub checks: Option<Vec<Check>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CubeReport {
    pub name: Option<String>,
    pub checks: Vec<Check>,
    /// `None` when the cube has no list under the key.
    pub dimensions: Option<Vec<FieldReport>>,
    pub measures: Option<Vec<FieldReport>>,
}

impl CubeReport {
    /// Cube-level checks only; field checks are informational.
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|check| check.passed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardsReport {
    pub file_name: String,
    pub cubes: Vec<CubeReport>,
}

impl StandardsReport {
    pub fn passed(&self) -> bool {
        !self.cubes.is_empty() && self.cubes.iter().all(CubeReport::passed)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.cubes.is_empty() {
            let _ = writeln!(out, "FAIL: no cube objects found in {}", self.file_name);
            return out;
        }
        for (idx, cube) in self.cubes.iter().enumerate() {
            if self.cubes.len() > 1 {
                let _ = writeln!(out, "Cube index: {idx}");
            }
            let _ = writeln!(out, " **********  Standards Check Summary Result  ********** ");
            let _ = writeln!(out, "Filename: {}", self.file_name);
            let _ = writeln!(out, "Cube name: {}", cube.name.as_deref().unwrap_or("(missing)"));
            let _ = writeln!(out, "Standards Check Final Result: {}\n", verdict(cube.passed()));
            let _ = writeln!(out, " **********  Standards Check Detailed Result ********** ");
            for check in &cube.checks {
                match check.reason {
                    Some(reason) if !check.passed => {
                        let _ = writeln!(out, "{}: FAIL ({reason})", check.label);
                    }
                    _ => {
                        let _ = writeln!(out, "{}: {}", check.label, verdict(check.passed));
                    }
                }
            }
            let _ = writeln!(out, "Dimensions:");
            render_fields(&mut out, "dimension", "dimensions", cube.dimensions.as_deref());
            let _ = writeln!(out, "\nMeasures:");
            render_fields(&mut out, "measure", "measures", cube.measures.as_deref());
        }
        out
    }
}

fn render_fields(out: &mut String, kind: &str, key: &str, fields: Option<&[FieldReport]>) {
    let Some(fields) = fields else {
        let _ = writeln!(out, "  (No '{key}' list found)");
        return;
    };
    for field in fields {
        match &field.checks {
            None => {
                let _ = writeln!(out, "  (Invalid {kind} entry - not a mapping)");
            }
            Some(checks) => {
                let _ = writeln!(out, "  {kind} '{}':", field.label);
                for check in checks {
                    let _ = writeln!(out, "    {}: {}", check.label, verdict(check.passed));
                }
            }
        }
    }
}

fn non_empty_str<'a>(value: &'a YamlValue, key: &str) -> Option<&'a str> {
    yaml::str_field(value, key).filter(|text| !text.trim().is_empty())
}

/// `{CUBE}` must appear before the first `.` of the expression.
pub fn sql_references_cube(sql: Option<&str>) -> bool {
    let Some(sql) = sql.map(str::trim).filter(|s| !s.is_empty()) else {
        return false;
    };
    sql.find('.')
        .is_some_and(|dot| sql[..dot].contains(CUBE_PLACEHOLDER))
}

fn check_fields(cube: &YamlValue, key: &str) -> Option<Vec<FieldReport>> {
    let entries = yaml::seq_field(cube, key)?;
    Some(
        entries
            .iter()
            .map(|entry| {
                if !entry.is_mapping() {
                    return FieldReport {
                        label: String::new(),
                        checks: None,
                    };
                }
                let name = non_empty_str(entry, "name");
                FieldReport {
                    label: name.unwrap_or("(missing name)").to_string(),
                    checks: Some(vec![
                        Check::new("name check", name.is_some()),
                        Check::new("title check", non_empty_str(entry, "title").is_some()),
                        Check::new(
                            "description check",
                            non_empty_str(entry, "description").is_some(),
                        ),
                        Check::new("type check", non_empty_str(entry, "type").is_some()),
                        Check::new(
                            "sql format check",
                            sql_references_cube(yaml::str_field(entry, "sql")),
                        ),
                    ]),
                }
            })
            .collect(),
    )
}

fn cube_entries(document: &YamlValue) -> Vec<&YamlValue> {
    yaml::seq_field(document, "cubes")
        .map(|cubes| cubes.iter().filter(|c| c.is_mapping()).collect())
        .unwrap_or_default()
}

/// Stems and cube names of the other `.yml`/`.yaml` files next to `path`.
/// Files that fail to parse still contribute their stem.
fn sibling_names(path: &Path) -> Result<(BTreeSet<String>, BTreeSet<String>)> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let current = fs::canonicalize(path).with_context(|| format!("Resolving {path:?}"))?;
    let mut stems = BTreeSet::new();
    let mut names = BTreeSet::new();
    let entries = fs::read_dir(&dir).with_context(|| format!("Listing directory {dir:?}"))?;
    for entry in entries.flatten() {
        let sibling = entry.path();
        let is_yaml = sibling
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml"));
        if !is_yaml || !sibling.is_file() {
            continue;
        }
        if fs::canonicalize(&sibling).is_ok_and(|resolved| resolved == current) {
            continue;
        }
        if let Some(stem) = sibling.file_stem() {
            stems.insert(stem.to_string_lossy().into_owned());
        }
        match yaml::load_value(&sibling) {
            Ok(document) => names.extend(
                cube_entries(&document)
                    .into_iter()
                    .filter_map(|cube| non_empty_str(cube, "name"))
                    .map(str::to_string),
            ),
            Err(err) => debug!("Skipping unparsable sibling {sibling:?}: {err:#}"),
        }
    }
    Ok((stems, names))
}

/// Checks every cube in the YAML file at `path`.
pub fn check_cube_file(path: &Path) -> Result<StandardsReport> {
    let document = yaml::load_value(path)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (other_stems, other_names) = sibling_names(path)?;

    let cubes = cube_entries(&document)
        .into_iter()
        .map(|cube| {
            let name = non_empty_str(cube, "name");
            let mut unique = Check::new("Unique cube name check", true);
            if let Some(name) = name {
                if other_stems.contains(name) {
                    unique.passed = false;
                    unique.reason = Some("name matches another file name");
                } else if other_names.contains(name) {
                    unique.passed = false;
                    unique.reason = Some("name matches another cube name");
                }
            }
            CubeReport {
                name: name.map(str::to_string),
                checks: vec![
                    Check::new("Name check", name.is_some()),
                    Check::new("Description check", non_empty_str(cube, "description").is_some()),
                    Check::new("sql_table check", non_empty_str(cube, "sql_table").is_some()),
                    Check::new("Title check", non_empty_str(cube, "title").is_some()),
                    Check::new("Filename match check", name == Some(stem.as_str())),
                    unique,
                ],
                dimensions: check_fields(cube, "dimensions"),
                measures: check_fields(cube, "measures"),
            }
        })
        .collect();

    Ok(StandardsReport { file_name, cubes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const GOOD: &str = "cubes:
- name: orders
  title: Orders
  description: All orders
  sql_table: p.d.orders
  dimensions:
  - name: id
    title: ID
    description: Order id
    type: number
    sql: '{CUBE}.id'
  measures:
  - name: count
    title: Count
    description: Number of orders
    type: count
    sql: '{id}'
";

    #[test]
    fn sql_check_requires_cube_before_first_dot() {
        assert!(sql_references_cube(Some("{CUBE}.id")));
        assert!(!sql_references_cube(Some("orders.id")));
        assert!(!sql_references_cube(Some("{id}")));
        assert!(!sql_references_cube(Some("   ")));
        assert!(!sql_references_cube(None));
    }

    #[test]
    fn well_formed_cube_passes_cube_level_checks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orders.yml");
        fs::write(&path, GOOD).unwrap();
        let report = check_cube_file(&path).unwrap();
        assert!(report.passed());
        let text = report.render();
        assert!(text.contains("Standards Check Final Result: PASS"));
        assert!(text.contains("  dimension 'id':\n    name check: PASS"));
        assert!(text.contains("  measure 'count':"));
        assert!(text.contains("    sql format check: FAIL"));
    }

    #[test]
    fn mismatched_file_name_and_duplicate_names_fail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sales.yml");
        fs::write(&path, GOOD).unwrap();
        fs::write(dir.path().join("orders.yaml"), "cubes: []\n").unwrap();
        let report = check_cube_file(&path).unwrap();
        assert!(!report.passed());
        let text = report.render();
        assert!(text.contains("Filename match check: FAIL"));
        assert!(text.contains("Unique cube name check: FAIL (name matches another file name)"));
    }

    #[test]
    fn sibling_cube_names_count_as_duplicates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orders.yml");
        fs::write(&path, GOOD).unwrap();
        fs::write(dir.path().join("legacy.yml"), "cubes:\n- name: orders\n").unwrap();
        let report = check_cube_file(&path).unwrap();
        assert!(
            report
                .render()
                .contains("Unique cube name check: FAIL (name matches another cube name)")
        );
    }

    #[test]
    fn file_without_cubes_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.yml");
        fs::write(&path, "views: []\n").unwrap();
        let report = check_cube_file(&path).unwrap();
        assert!(!report.passed());
        assert_eq!(report.render(), "FAIL: no cube objects found in empty.yml\n");
    }
}
