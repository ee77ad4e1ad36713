//! Column classification and section routing for loosely structured sheets.
//!
//! Every input table is scored against the four section kinds of a
//! [`SectionRegistry`]. A kind's score is the number of its required canonical
//! columns present after alias remapping, plus a bonus when the table label
//! mentions one of the kind's keywords. The best kind wins if it reaches
//! [`ACCEPT_THRESHOLD`]; rows of accepted tables are accumulated per kind.
//!
//! The registry is data, not code: [`SectionRegistry::load`] reads the same
//! shape from YAML, so new header spellings are a config change.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    path::Path,
};

use anyhow::{Result, anyhow};
use log::debug;
use serde::Deserialize;

use crate::{
    cell::clean_scalar,
    context::{Defect, RunContext},
    yaml,
};

/// Minimum score a table needs before it is accepted into a section.
pub const ACCEPT_THRESHOLD: usize = 2;

const LABEL_BONUS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Cubes,
    Joins,
    Dimensions,
    Measures,
}

impl SectionKind {
    /// Fixed evaluation order; ties go to the earlier kind.
    pub const ALL: [SectionKind; 4] = [
        SectionKind::Cubes,
        SectionKind::Joins,
        SectionKind::Dimensions,
        SectionKind::Measures,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SectionKind::Cubes => "cubes",
            SectionKind::Joins => "joins",
            SectionKind::Dimensions => "dimensions",
            SectionKind::Measures => "measures",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Required columns, label keywords and header aliases for one section kind.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SectionRule {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

impl SectionRule {
    fn new(required: &[&str], keywords: &[&str], aliases: &[(&str, &str)]) -> Self {
        let mut rule = Self {
            required: required.iter().map(|s| s.to_string()).collect(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            aliases: aliases
                .iter()
                .map(|(raw, canonical)| (raw.to_string(), canonical.to_string()))
                .collect(),
        };
        rule.normalize();
        rule
    }

    fn normalize(&mut self) {
        self.aliases = std::mem::take(&mut self.aliases)
            .into_iter()
            .map(|(raw, canonical)| (normalize_header(&raw), canonical.trim().to_string()))
            .collect();
        for keyword in &mut self.keywords {
            *keyword = keyword.trim().to_lowercase();
        }
    }

    fn canonical_for(&self, header: &str) -> Option<&str> {
        self.aliases.get(header).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct SectionRegistry {
    rules: BTreeMap<SectionKind, SectionRule>,
}

impl Default for SectionRegistry {
    fn default() -> Self {
        let mut rules = BTreeMap::new();
        rules.insert(
            SectionKind::Cubes,
            SectionRule::new(
                &["table", "sql_table", "name"],
                &["cube"],
                &[
                    ("table_name", "table"),
                    ("cube_table", "table"),
                    ("sqltable", "sql_table"),
                    ("sql table", "sql_table"),
                    ("cube_name", "name"),
                    ("cube", "name"),
                    ("desc", "description"),
                    ("data source", "data_source"),
                    ("data_source", "data_source"),
                ],
            ),
        );
        rules.insert(
            SectionKind::Joins,
            SectionRule::new(
                &["primary_table", "secondary_table"],
                &["join", "relationship"],
                &[
                    ("primary table", "primary_table"),
                    ("secondary table", "secondary_table"),
                    ("relation", "relationship"),
                    ("relationship_type", "relationship"),
                    ("primary_table_key", "primary_table_key_column"),
                    ("primary key column", "primary_table_key_column"),
                    ("primary_key_column", "primary_table_key_column"),
                    ("secondary_table_key", "secondary_table_key_column"),
                    ("secondary key column", "secondary_table_key_column"),
                    ("secondary_key_column", "secondary_table_key_column"),
                    ("join_sql", "sql"),
                ],
            ),
        );
        rules.insert(
            SectionKind::Dimensions,
            SectionRule::new(
                &["name", "sql", "type"],
                &["dimension", "dim"],
                &[
                    ("primary key", "primarykey"),
                    ("primary_key", "primarykey"),
                    ("is_primary_key", "primarykey"),
                    ("pk", "primarykey"),
                    ("datatype", "type"),
                    ("data_type", "type"),
                    ("cube", "cube"),
                    ("cube_name", "cube"),
                ],
            ),
        );
        rules.insert(
            SectionKind::Measures,
            SectionRule::new(
                &["name", "sql", "type"],
                &["measure", "metric"],
                &[
                    ("aggregation", "type"),
                    ("aggregate", "type"),
                    ("agg", "type"),
                    ("cube", "cube"),
                    ("cube_name", "cube"),
                ],
            ),
        );
        Self { rules }
    }
}

impl SectionRegistry {
    /// Loads a registry from YAML keyed by section kind. Every kind must be present.
    pub fn load(path: &Path) -> Result<Self> {
        let mut rules: BTreeMap<SectionKind, SectionRule> = yaml::load_from_path(path)?;
        for kind in SectionKind::ALL {
            let rule = rules
                .get_mut(&kind)
                .ok_or_else(|| anyhow!("Section registry {path:?} does not define '{kind}'"))?;
            rule.normalize();
        }
        Ok(Self { rules })
    }

    pub fn rule(&self, kind: SectionKind) -> &SectionRule {
        // Both constructors guarantee every kind is present.
        &self.rules[&kind]
    }

    /// Every `(raw header, canonical name)` alias pair owned by `kind`.
    pub fn aliases(&self, kind: SectionKind) -> impl Iterator<Item = (&str, &str)> {
        self.rule(kind)
            .aliases
            .iter()
            .map(|(raw, canonical)| (raw.as_str(), canonical.as_str()))
    }

    /// Renames normalized headers to canonical names for `kind`.
    ///
    /// A canonical name already claimed by an earlier column is not reused;
    /// the later column keeps its normalized header.
    pub fn remap_headers(&self, kind: SectionKind, headers: &[String]) -> Vec<String> {
        let rule = self.rule(kind);
        let proposed = headers
            .iter()
            .map(|header| rule.canonical_for(header).unwrap_or(header).to_string())
            .collect::<Vec<_>>();
        let mut claimed: HashMap<&str, usize> = HashMap::new();
        for (idx, name) in proposed.iter().enumerate() {
            claimed.entry(name.as_str()).or_insert(idx);
        }
        proposed
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                if claimed.get(name.as_str()) == Some(&idx) {
                    name.clone()
                } else {
                    headers[idx].clone()
                }
            })
            .collect()
    }

    /// Scores already remapped columns for `kind`.
    pub fn score(&self, kind: SectionKind, columns: &[String], label: &str) -> usize {
        let rule = self.rule(kind);
        let present = rule
            .required
            .iter()
            .filter(|required| columns.iter().any(|c| c == *required))
            .count();
        let label = label.to_lowercase();
        let bonus = if rule.keywords.iter().any(|k| label.contains(k.as_str())) {
            LABEL_BONUS
        } else {
            0
        };
        present + bonus
    }
}

/// One input table exactly as read: a label, raw headers and string cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            headers,
            rows,
        }
    }

    /// Drops fully blank rows, then fully blank columns.
    pub fn without_blank_cells(&self) -> RawTable {
        let is_blank = |cell: &String| cell.trim().is_empty();
        let rows = self
            .rows
            .iter()
            .filter(|row| !row.iter().all(is_blank))
            .cloned()
            .collect::<Vec<_>>();
        let keep = (0..self.headers.len())
            .filter(|&col| {
                rows.iter()
                    .any(|row| row.get(col).is_some_and(|cell| !is_blank(cell)))
            })
            .collect::<Vec<_>>();
        RawTable {
            name: self.name.clone(),
            headers: keep.iter().map(|&col| self.headers[col].clone()).collect(),
            rows: rows
                .iter()
                .map(|row| {
                    keep.iter()
                        .map(|&col| row.get(col).cloned().unwrap_or_default())
                        .collect()
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.headers.is_empty()
    }
}

/// Lowercases, trims and replaces spaces with underscores.
pub fn normalize_header(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

/// Normalizes every header and suffixes repeats with `_2`, `_3`, ...
pub fn normalize_headers(headers: &[String]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    headers
        .iter()
        .map(|raw| {
            let base = normalize_header(raw);
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                base
            } else {
                format!("{base}_{count}")
            }
        })
        .collect()
}

/// An ordered mapping from canonical field name to a cleaned cell value.
/// Blank cells are omitted rather than stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    cells: Vec<(String, String)>,
}

impl Row {
    pub fn from_cells(columns: &[String], values: &[String]) -> Self {
        let mut row = Row::default();
        for (column, raw) in columns.iter().zip(values.iter()) {
            if let Some(value) = clean_scalar(raw) {
                row.insert(column, value);
            }
        }
        row
    }

    /// Adds a cell unless the key is already present.
    pub fn insert(&mut self, key: &str, value: String) {
        if self.get(key).is_none() {
            self.cells.push((key.to_string(), value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(k, _)| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Outcome of scoring one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub table: String,
    pub kind: SectionKind,
    pub score: usize,
    /// Columns after alias remapping for `kind`.
    pub columns: Vec<String>,
    /// Score of every kind, in evaluation order.
    pub scores: Vec<(SectionKind, usize)>,
}

impl Classification {
    pub fn accepted(&self) -> bool {
        self.score >= ACCEPT_THRESHOLD
    }
}

/// Scores `table` against every section kind. Returns `None` for tables
/// with no non-blank cells.
pub fn classify(table: &RawTable, registry: &SectionRegistry) -> Option<(Classification, RawTable)> {
    let trimmed = table.without_blank_cells();
    if trimmed.is_empty() {
        return None;
    }
    let normalized = normalize_headers(&trimmed.headers);
    let mut best: Option<(SectionKind, usize, Vec<String>)> = None;
    let mut scores = Vec::with_capacity(SectionKind::ALL.len());
    for kind in SectionKind::ALL {
        let columns = registry.remap_headers(kind, &normalized);
        let score = registry.score(kind, &columns, &table.name);
        scores.push((kind, score));
        if best.as_ref().is_none_or(|(_, top, _)| score > *top) {
            best = Some((kind, score, columns));
        }
    }
    let (kind, score, columns) = best?;
    Some((
        Classification {
            table: table.name.clone(),
            kind,
            score,
            columns,
            scores,
        },
        trimmed,
    ))
}

/// Rows accumulated per section across all accepted tables.
#[derive(Debug, Clone, Default)]
pub struct Sections {
    pub cubes: Vec<Row>,
    pub joins: Vec<Row>,
    pub dimensions: Vec<Row>,
    pub measures: Vec<Row>,
}

impl Sections {
    pub fn rows(&self, kind: SectionKind) -> &[Row] {
        match kind {
            SectionKind::Cubes => &self.cubes,
            SectionKind::Joins => &self.joins,
            SectionKind::Dimensions => &self.dimensions,
            SectionKind::Measures => &self.measures,
        }
    }

    fn rows_mut(&mut self, kind: SectionKind) -> &mut Vec<Row> {
        match kind {
            SectionKind::Cubes => &mut self.cubes,
            SectionKind::Joins => &mut self.joins,
            SectionKind::Dimensions => &mut self.dimensions,
            SectionKind::Measures => &mut self.measures,
        }
    }

    pub fn is_empty(&self) -> bool {
        SectionKind::ALL.iter().all(|kind| self.rows(*kind).is_empty())
    }
}

/// Classifies every table and accumulates accepted rows in source order.
/// Rejected tables are reported as classification misses.
pub fn route_tables(
    tables: &[RawTable],
    registry: &SectionRegistry,
    ctx: &mut RunContext,
) -> (Sections, Vec<Classification>) {
    let mut sections = Sections::default();
    let mut decisions = Vec::new();
    for table in tables {
        let Some((decision, trimmed)) = classify(table, registry) else {
            debug!("Skipping empty sheet '{}'", table.name);
            ctx.report(Defect::ClassificationMiss {
                table: table.name.clone(),
                score: 0,
            });
            continue;
        };
        if decision.accepted() {
            debug!(
                "Sheet '{}' => {} (score={})",
                table.name, decision.kind, decision.score
            );
            let rows = sections.rows_mut(decision.kind);
            rows.extend(
                trimmed
                    .rows
                    .iter()
                    .map(|values| Row::from_cells(&decision.columns, values))
                    .filter(|row| !row.is_empty()),
            );
        } else {
            ctx.report(Defect::ClassificationMiss {
                table: table.name.clone(),
                score: decision.score,
            });
        }
        decisions.push(decision);
    }
    (sections, decisions)
}
