//! Schema-source interface and its file-backed implementation.
//!
//! A catalog document lists tables by fully qualified id:
//!
//! ```yaml
//! tables:
//!   my-sales-prod.sales.orders:
//!     primary_key: [order_id]
//!     columns:
//!       - name: order_id
//!         type: INT64
//!       - name: shipping
//!         type: RECORD
//!         fields:
//!           - name: city
//!             type: STRING
//! ```
//!
//! JSON documents with the same shape are accepted when the file extension is
//! `.json`.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt, fs,
    path::Path,
    str::FromStr,
};

use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use serde::Deserialize;

use crate::yaml;

/// A `project.dataset.table` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let parts = raw.trim().split('.').collect::<Vec<_>>();
        match parts.as_slice() {
            [project, dataset, table]
                if !project.is_empty() && !dataset.is_empty() && !table.is_empty() =>
            {
                Ok(Self {
                    project: project.to_string(),
                    dataset: dataset.to_string(),
                    table: table.to_string(),
                })
            }
            _ => bail!("Table id '{raw}' must look like project.dataset.table"),
        }
    }

    /// Second `-` token of the project (`my-sales-prod` → `sales`), or the
    /// whole project when it has no such token.
    pub fn data_source(&self) -> &str {
        self.project
            .split('-')
            .nth(1)
            .filter(|token| !token.is_empty())
            .unwrap_or(self.project.as_str())
    }
}

impl FromStr for TableRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        TableRef::parse(s)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// One column as reported by a catalog. Record columns carry nested fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<ColumnSchema>,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_fields(mut self, fields: Vec<ColumnSchema>) -> Self {
        self.fields = fields;
        self
    }

    pub fn is_record(&self) -> bool {
        !self.fields.is_empty()
    }
}

pub trait SchemaCatalog {
    fn list_columns(&self, table: &TableRef) -> Result<Vec<ColumnSchema>>;

    /// Column names tagged as primary key. May be empty.
    fn primary_key_tags(&self, table: &TableRef) -> Result<BTreeSet<String>>;
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,
}

/// A catalog read eagerly from a YAML or JSON document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileCatalog {
    #[serde(default)]
    tables: BTreeMap<String, TableSchema>,
}

impl FileCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let catalog: FileCatalog = if is_json {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Opening catalog file {path:?}"))?;
            serde_json::from_str(&raw).with_context(|| format!("Parsing catalog file {path:?}"))?
        } else {
            yaml::load_from_path(path)?
        };
        debug!("Loaded {} table(s) from {:?}", catalog.tables.len(), path);
        Ok(catalog)
    }

    pub fn insert(&mut self, table: &TableRef, schema: TableSchema) {
        self.tables.insert(table.to_string(), schema);
    }

    fn table(&self, table: &TableRef) -> Result<&TableSchema> {
        self.tables
            .get(&table.to_string())
            .ok_or_else(|| anyhow!("Table '{table}' is not present in the catalog"))
    }
}

impl SchemaCatalog for FileCatalog {
    fn list_columns(&self, table: &TableRef) -> Result<Vec<ColumnSchema>> {
        Ok(self.table(table)?.columns.clone())
    }

    fn primary_key_tags(&self, table: &TableRef) -> Result<BTreeSet<String>> {
        Ok(self.table(table)?.primary_key.iter().cloned().collect())
    }
}
