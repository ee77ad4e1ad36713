//! The flat semantic CSV: one row per dimension or measure, keyed by cube.
//!
//! This is the durable intermediate between runs. Catalog runs upsert a cube's
//! rows into it and `from-csv` rebuilds cube YAML from it. Writing a cube
//! replaces every earlier row of that cube; rows of other cubes keep their
//! position.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::io_utils;

/// Column order of the store file.
pub const SEMANTIC_HEADERS: [&str; 21] = [
    "dimension_name",
    "dimension_measure_flag",
    "dimension_title",
    "dimension_description",
    "dimension_sql",
    "primary_key",
    "dimension_type",
    "cube_name",
    "cube_sql_table",
    "cube_description",
    "cube_title",
    "cube_data_source",
    "view_name",
    "view_title",
    "view_description",
    "visible_in_view",
    "view_folder_name",
    "join_primary_table",
    "join_secondary_table",
    "join_sql",
    "join_relationship",
];

pub const DIMENSION_FLAG: &str = "dimension";
pub const MEASURE_FLAG: &str = "measure";

/// One row of the store. Field order matches [`SEMANTIC_HEADERS`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticRecord {
    pub dimension_name: Option<String>,
    pub dimension_measure_flag: Option<String>,
    pub dimension_title: Option<String>,
    pub dimension_description: Option<String>,
    pub dimension_sql: Option<String>,
    pub primary_key: Option<String>,
    pub dimension_type: Option<String>,
    pub cube_name: Option<String>,
    pub cube_sql_table: Option<String>,
    pub cube_description: Option<String>,
    pub cube_title: Option<String>,
    pub cube_data_source: Option<String>,
    pub view_name: Option<String>,
    pub view_title: Option<String>,
    pub view_description: Option<String>,
    pub visible_in_view: Option<String>,
    pub view_folder_name: Option<String>,
    pub join_primary_table: Option<String>,
    pub join_secondary_table: Option<String>,
    pub join_sql: Option<String>,
    pub join_relationship: Option<String>,
}

impl SemanticRecord {
    pub fn is_blank(&self) -> bool {
        *self == SemanticRecord::default()
    }
}

/// Reads every record of a store file. Missing columns read as blank.
pub fn read_records(path: &Path) -> Result<Vec<SemanticRecord>> {
    let mut reader = io_utils::open_csv_reader_from_path(path, io_utils::DEFAULT_CSV_DELIMITER)?;
    let mut records = Vec::new();
    for (idx, record) in reader.deserialize::<SemanticRecord>().enumerate() {
        let record = record.with_context(|| format!("Reading row {} in {:?}", idx + 2, path))?;
        if !record.is_blank() {
            records.push(record);
        }
    }
    Ok(records)
}

fn has_all_headers(path: &Path) -> Result<bool> {
    let mut reader = io_utils::open_csv_reader_from_path(path, io_utils::DEFAULT_CSV_DELIMITER)?;
    let headers = reader
        .headers()
        .with_context(|| format!("Reading headers of {path:?}"))?;
    Ok(SEMANTIC_HEADERS
        .iter()
        .all(|required| headers.iter().any(|h| h.trim() == *required)))
}

#[derive(Debug)]
pub struct SemanticStore {
    path: PathBuf,
    records: Vec<SemanticRecord>,
}

impl SemanticStore {
    /// Opens a store, starting empty when the file is absent or lacks the
    /// expected columns.
    pub fn open(path: &Path) -> Result<Self> {
        let records = if !path.exists() {
            debug!("Semantic store {path:?} does not exist yet");
            Vec::new()
        } else if !has_all_headers(path)? {
            warn!("Semantic store {path:?} is missing expected columns; starting fresh");
            Vec::new()
        } else {
            read_records(path)?
        };
        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[SemanticRecord] {
        &self.records
    }

    /// Replaces all rows of `cube_name` with `rows`.
    pub fn upsert(&mut self, cube_name: &str, rows: Vec<SemanticRecord>) {
        self.records
            .retain(|record| record.cube_name.as_deref() != Some(cube_name));
        self.records.extend(rows);
    }

    pub fn save(&self) -> Result<()> {
        let mut writer = io_utils::open_csv_writer(&self.path, io_utils::DEFAULT_CSV_DELIMITER)?;
        if self.records.is_empty() {
            writer.write_record(SEMANTIC_HEADERS)?;
        }
        for record in &self.records {
            writer
                .serialize(record)
                .with_context(|| format!("Writing semantic store {:?}", self.path))?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(cube: &str, dimension: &str) -> SemanticRecord {
        SemanticRecord {
            cube_name: Some(cube.to_string()),
            dimension_name: Some(dimension.to_string()),
            dimension_measure_flag: Some(DIMENSION_FLAG.to_string()),
            ..SemanticRecord::default()
        }
    }

    fn dimension_names(records: &[SemanticRecord], cube: &str) -> Vec<String> {
        records
            .iter()
            .filter(|r| r.cube_name.as_deref() == Some(cube))
            .filter_map(|r| r.dimension_name.clone())
            .collect()
    }

    #[test]
    fn upsert_replaces_previous_generation_of_a_cube() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("input").join("semantic_all.csv");

        let mut store = SemanticStore::open(&path).unwrap();
        store.upsert("orders", vec![record("orders", "id"), record("orders", "status")]);
        store.upsert("customers", vec![record("customers", "id")]);
        store.save().unwrap();

        let mut store = SemanticStore::open(&path).unwrap();
        store.upsert("orders", vec![record("orders", "order_id")]);
        store.save().unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(dimension_names(&records, "orders"), vec!["order_id"]);
        assert_eq!(dimension_names(&records, "customers"), vec!["id"]);
        assert_eq!(records[0].cube_name.as_deref(), Some("customers"));
    }

    #[test]
    fn saved_file_uses_fixed_header_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("semantic.csv");
        let mut store = SemanticStore::open(&path).unwrap();
        store.upsert("orders", vec![record("orders", "id")]);
        store.save().unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let header = contents.lines().next().unwrap();
        let expected = SEMANTIC_HEADERS
            .iter()
            .map(|h| format!("\"{h}\""))
            .collect::<Vec<_>>()
            .join(",");
        assert_eq!(header, expected);
    }

    #[test]
    fn store_with_foreign_columns_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("semantic.csv");
        std::fs::write(&path, "cube_name,other\norders,x\n").unwrap();
        let store = SemanticStore::open(&path).unwrap();
        assert!(store.records().is_empty());
    }

    #[test]
    fn read_records_tolerates_partial_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("semantic.csv");
        std::fs::write(
            &path,
            "cube_name,dimension_name,dimension_measure_flag\norders,id,dimension\n,,\n",
        )
        .unwrap();
        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].dimension_name.as_deref(), Some("id"));
        assert!(records[0].cube_title.is_none());
    }
}
