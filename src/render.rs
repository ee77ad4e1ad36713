//! YAML text for cubes and views.
//!
//! Written by hand rather than through `serde_yaml` because the output carries
//! comment lines (the joining-keys marker and suppressed view fields) and a
//! fixed key order.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::{Cube, Field, FieldRef, Folder, JoinPath, View};

pub const JOINING_KEYS_MARKER: &str = "#----------joining keys--------------";

const INDENT2: &str = "  ";
const INDENT4: &str = "    ";

/// Key order of the cube header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CubeLayout {
    /// `description`, `name`, `sql_table`, `title`. Description is always
    /// printed.
    #[default]
    DescriptionFirst,
    /// `name`, `title`, `description`, `sql_table`.
    NameFirst,
}

fn simple_identifier() -> &'static Regex {
    static SIMPLE: OnceLock<Regex> = OnceLock::new();
    SIMPLE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"))
}

fn simple_path() -> &'static Regex {
    static PATH: OnceLock<Regex> = OnceLock::new();
    PATH.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
            .expect("valid join path regex")
    })
}

/// Plain words a YAML 1.1 reader would load as booleans or null.
const RESERVED_WORDS: [&str; 8] = ["true", "false", "null", "yes", "no", "on", "off", "y"];

pub fn is_simple_unquoted(value: &str) -> bool {
    simple_identifier().is_match(value)
        && !RESERVED_WORDS
            .iter()
            .any(|word| value.eq_ignore_ascii_case(word))
}

/// Double-quoted scalar on a single line.
pub fn dq(value: &str) -> String {
    let single_line = value.split_whitespace().collect::<Vec<_>>().join(" ");
    let escaped = single_line.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Single-quoted scalar; embedded quotes are doubled.
pub fn sq(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Bare when it is a plain identifier, double-quoted otherwise.
fn ident(value: &str) -> String {
    if is_simple_unquoted(value) {
        value.to_string()
    } else {
        dq(value)
    }
}

pub fn render_cubes(cubes: &[Cube], layout: CubeLayout) -> String {
    let mut lines = vec!["cubes:".to_string()];
    for cube in cubes {
        push_cube(&mut lines, cube, layout);
    }
    finish(lines)
}

fn push_cube(lines: &mut Vec<String>, cube: &Cube, layout: CubeLayout) {
    let name = format!("name: {}", ident(&cube.name));
    match layout {
        CubeLayout::DescriptionFirst => {
            let description = cube.description.as_deref().map(dq);
            lines.push(format!(
                "- description: {}",
                description.unwrap_or_else(|| "\"\"".to_string())
            ));
            lines.push(format!("{INDENT2}{name}"));
            if let Some(sql_table) = &cube.sql_table {
                lines.push(format!("{INDENT2}sql_table: {}", sq(sql_table)));
            }
            if let Some(title) = &cube.title {
                lines.push(format!("{INDENT2}title: {}", dq(title)));
            }
        }
        CubeLayout::NameFirst => {
            lines.push(format!("- {name}"));
            if let Some(title) = &cube.title {
                lines.push(format!("{INDENT2}title: {}", dq(title)));
            }
            if let Some(description) = &cube.description {
                lines.push(format!("{INDENT2}description: {}", dq(description)));
            }
            if let Some(sql_table) = &cube.sql_table {
                lines.push(format!("{INDENT2}sql_table: {}", sq(sql_table)));
            }
        }
    }

    if !cube.joins.is_empty() {
        lines.push(String::new());
        lines.push(format!("{INDENT2}joins:"));
        for join in &cube.joins {
            lines.push(format!("{INDENT2}- name: {}", ident(&join.name)));
            if let Some(relationship) = &join.relationship {
                lines.push(format!("{INDENT4}relationship: {}", ident(relationship)));
            }
            if let Some(sql) = &join.sql {
                lines.push(format!("{INDENT4}sql: {}", sq(sql)));
            }
        }
    }

    if !cube.dimensions.is_empty() {
        lines.push(String::new());
        lines.push(format!("{INDENT2}dimensions:"));
        lines.push(format!("{INDENT2}{JOINING_KEYS_MARKER}"));
        for dimension in &cube.dimensions {
            push_field(lines, dimension, true);
        }
    }

    if !cube.measures.is_empty() {
        lines.push(String::new());
        lines.push(format!("{INDENT2}measures:"));
        for measure in &cube.measures {
            push_field(lines, measure, false);
        }
    }
}

fn push_field(lines: &mut Vec<String>, field: &Field, is_dimension: bool) {
    lines.push(format!("{INDENT2}- name: {}", ident(&field.name)));
    if let Some(title) = &field.title {
        lines.push(format!("{INDENT4}title: {}", dq(title)));
    }
    if let Some(description) = &field.description {
        lines.push(format!("{INDENT4}description: {}", dq(description)));
    }
    if let Some(sql) = &field.sql {
        lines.push(format!("{INDENT4}sql: {}", sq(sql)));
    }
    if let (true, Some(primary_key)) = (is_dimension, field.primary_key) {
        lines.push(format!("{INDENT4}primaryKey: {primary_key}"));
    }
    if let Some(field_type) = &field.field_type {
        lines.push(format!("{INDENT4}type: {}", ident(field_type)));
    }
}

pub fn render_view(view: &View) -> String {
    let mut lines = vec![
        "views:".to_string(),
        format!("- name: {}", ident(&view.name)),
        format!("{INDENT2}title: {}", dq(&view.title)),
        format!("{INDENT2}description: {}", dq(&view.description)),
        String::new(),
        format!("{INDENT2}cubes:"),
    ];
    for path in &view.cubes {
        push_join_path(&mut lines, path);
    }
    if !view.folders.is_empty() {
        lines.push(String::new());
        lines.push(format!("{INDENT2}folders:"));
        for folder in &view.folders {
            push_folder(&mut lines, folder);
        }
    }
    finish(lines)
}

fn push_join_path(lines: &mut Vec<String>, path: &JoinPath) {
    let dotted = path.path();
    let rendered = if simple_path().is_match(&dotted) {
        dotted
    } else {
        dq(&dotted)
    };
    lines.push(format!("{INDENT2}- join_path: {rendered}"));
    push_includes(lines, &path.includes);
}

fn push_folder(lines: &mut Vec<String>, folder: &Folder) {
    lines.push(format!("{INDENT2}- name: {}", dq(&folder.name)));
    push_includes(lines, &folder.includes);
}

fn push_includes(lines: &mut Vec<String>, includes: &[FieldRef]) {
    if !includes.iter().any(FieldRef::is_live) {
        lines.push(format!("{INDENT4}includes: []"));
    } else {
        lines.push(format!("{INDENT4}includes:"));
    }
    for include in includes {
        match include {
            FieldRef::Live(name) => lines.push(format!("{INDENT4}- {}", ident(name))),
            FieldRef::Suppressed { name, first_owner } => lines.push(format!(
                "{INDENT4}# - {name}  # already included from {first_owner}"
            )),
        }
    }
}

fn finish(lines: Vec<String>) -> String {
    let mut text = lines.join("\n");
    text.push('\n');
    text
}
