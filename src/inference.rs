//! Schema-source mode: turns catalog columns into semantic store rows.
//!
//! Nested record columns are flattened into dot paths. A primary key is
//! inferred from catalog tags, column descriptions or naming conventions, and
//! when one is found a distinct-count measure over it is added.

use std::{collections::BTreeSet, sync::OnceLock};

use anyhow::Result;
use log::{debug, info};
use regex::Regex;

use crate::{
    catalog::{ColumnSchema, SchemaCatalog, TableRef},
    cell::titleize_identifier,
    store::{DIMENSION_FLAG, MEASURE_FLAG, SemanticRecord},
};

const COUNT_DISTINCT: &str = "count_distinct";

/// Maps a catalog column type onto a semantic dimension type.
pub fn semantic_type(catalog_type: &str) -> &'static str {
    match catalog_type.trim().to_ascii_uppercase().as_str() {
        "INT64" | "INTEGER" | "FLOAT64" | "FLOAT" | "NUMERIC" | "BIGNUMERIC" => "number",
        "BOOL" | "BOOLEAN" => "boolean",
        "TIMESTAMP" | "DATE" | "DATETIME" | "TIME" => "time",
        _ => "string",
    }
}

/// A non-record column reached through zero or more record parents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafColumn {
    /// Dot-separated path from the top-level column, e.g. `shipping.city`.
    pub path: String,
    pub field_type: String,
    pub description: Option<String>,
}

impl LeafColumn {
    pub fn leaf(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(self.path.as_str())
    }
}

pub fn flatten_columns(columns: &[ColumnSchema]) -> Vec<LeafColumn> {
    let mut leaves = Vec::new();
    for column in columns {
        flatten_into(column, None, &mut leaves);
    }
    leaves
}

fn flatten_into(column: &ColumnSchema, parent: Option<&str>, out: &mut Vec<LeafColumn>) {
    let path = match parent {
        Some(parent) => format!("{parent}.{}", column.name),
        None => column.name.clone(),
    };
    if column.is_record() {
        for child in &column.fields {
            flatten_into(child, Some(&path), out);
        }
    } else {
        out.push(LeafColumn {
            path,
            field_type: column.field_type.clone(),
            description: column.description.clone(),
        });
    }
}

fn pk_token() -> &'static Regex {
    static PK_TOKEN: OnceLock<Regex> = OnceLock::new();
    PK_TOKEN.get_or_init(|| Regex::new(r"\bpk\b").expect("valid pk regex"))
}

fn describes_primary_key(description: Option<&str>) -> bool {
    description.is_some_and(|text| {
        let lowered = text.to_lowercase();
        lowered.contains("primary key") || pk_token().is_match(&lowered)
    })
}

/// Runs `matches` against every dot path, then against every leaf name.
fn by_path_then_leaf<'a>(
    leaves: &'a [LeafColumn],
    matches: impl Fn(&str) -> bool,
) -> Option<&'a LeafColumn> {
    leaves
        .iter()
        .find(|leaf| matches(&leaf.path))
        .or_else(|| leaves.iter().find(|leaf| matches(leaf.leaf())))
}

/// Picks the primary key column; first matching rule wins. The naming rules
/// accept `<table>_id` and, for a plural table name, `<singular>_id` before
/// any other `_id` column.
pub fn detect_primary_key<'a>(
    table: &str,
    leaves: &'a [LeafColumn],
    tags: &BTreeSet<String>,
) -> Option<&'a LeafColumn> {
    if let Some(found) = by_path_then_leaf(leaves, |name| tags.contains(name)) {
        debug!("Primary key of '{table}' from catalog tags: {}", found.path);
        return Some(found);
    }
    if let Some(found) = leaves
        .iter()
        .find(|leaf| describes_primary_key(leaf.description.as_deref()))
    {
        debug!("Primary key of '{table}' from description: {}", found.path);
        return Some(found);
    }
    let exact = format!("{table}_id");
    let singular = table
        .strip_suffix('s')
        .filter(|stem| !stem.is_empty())
        .map(|stem| format!("{stem}_id"));
    let found = by_path_then_leaf(leaves, |name| name == exact)
        .or_else(|| {
            singular
                .as_deref()
                .and_then(|singular| by_path_then_leaf(leaves, |name| name == singular))
        })
        .or_else(|| by_path_then_leaf(leaves, |name| name.ends_with("_id")))
        .or_else(|| by_path_then_leaf(leaves, |name| name.eq_ignore_ascii_case("id")));
    match found {
        Some(found) => debug!("Primary key of '{table}' from naming: {}", found.path),
        None => debug!("No primary key found for '{table}'"),
    }
    found
}

/// Cube-level values shared by every row of one table.
#[derive(Debug, Clone, Default)]
pub struct CubeOverrides {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Store rows for one catalog table: one dimension per leaf column plus the
/// default measure when a primary key is known.
pub fn generate_records_for_table(
    catalog: &dyn SchemaCatalog,
    table: &TableRef,
    overrides: &CubeOverrides,
) -> Result<(String, Vec<SemanticRecord>)> {
    let columns = catalog.list_columns(table)?;
    let tags = catalog.primary_key_tags(table)?;
    let leaves = flatten_columns(&columns);
    let cube_name = table.table.clone();
    let primary_key = detect_primary_key(&cube_name, &leaves, &tags);

    let template = SemanticRecord {
        cube_name: Some(cube_name.clone()),
        cube_sql_table: Some(table.to_string()),
        cube_description: overrides.description.clone(),
        cube_title: Some(
            overrides
                .title
                .clone()
                .unwrap_or_else(|| titleize_identifier(&cube_name)),
        ),
        cube_data_source: Some(table.data_source().to_string()),
        join_primary_table: Some(cube_name.clone()),
        ..SemanticRecord::default()
    };

    let mut records = leaves
        .iter()
        .map(|leaf| SemanticRecord {
            dimension_name: Some(leaf.path.clone()),
            dimension_measure_flag: Some(DIMENSION_FLAG.to_string()),
            dimension_title: Some(title_for_path(&leaf.path)),
            dimension_description: leaf.description.clone(),
            dimension_sql: Some(format!("{{CUBE}}.{}", leaf.path)),
            primary_key: primary_key
                .filter(|pk| pk.path == leaf.path)
                .map(|_| "TRUE".to_string()),
            dimension_type: Some(semantic_type(&leaf.field_type).to_string()),
            ..template.clone()
        })
        .collect::<Vec<_>>();

    if let Some(pk) = primary_key {
        let pk_title = title_for_path(&pk.path);
        records.push(SemanticRecord {
            dimension_name: Some(format!("{COUNT_DISTINCT}_{}", pk.path.replace('.', "_"))),
            dimension_measure_flag: Some(MEASURE_FLAG.to_string()),
            dimension_title: Some(format!("Distinct count of {pk_title}")),
            dimension_description: Some(format!(
                "This is to get Distinct count of {pk_title} recorded in the {} application",
                table.dataset
            )),
            dimension_sql: Some(format!("{{{}}}", pk.path)),
            dimension_type: Some(COUNT_DISTINCT.to_string()),
            ..template.clone()
        });
    }

    info!(
        "Generated {} row(s) for cube '{}' (primary key: {})",
        records.len(),
        cube_name,
        primary_key.map(|pk| pk.path.as_str()).unwrap_or("none")
    );
    Ok((cube_name, records))
}

fn title_for_path(path: &str) -> String {
    titleize_identifier(&path.replace('.', "_"))
}
