//! Per-invocation run state: collected defects and rendered documents.
//!
//! A [`RunContext`] is created by each command handler and threaded through
//! the router, builders and renderer. Nothing in here is global; dropping the
//! context ends the run.

use std::collections::BTreeMap;

use log::warn;
use thiserror::Error;

/// Non-fatal problems found while compiling one run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Defect {
    #[error("source '{source_name}' could not be read: {message}")]
    SourceParse {
        source_name: String,
        message: String,
    },
    #[error("table '{table}' matched no section confidently (best score {score})")]
    ClassificationMiss { table: String, score: usize },
    #[error("{section} row {row} is missing required field '{field}'")]
    MissingRequiredField {
        section: String,
        row: usize,
        field: String,
    },
    #[error("cube '{name}' is declared more than once; row {row} ignored")]
    DuplicateCube { name: String, row: usize },
    #[error("{section} entry '{item}' could not be attached to any cube ({reason})")]
    UnresolvedAttachment {
        section: String,
        item: String,
        reason: String,
    },
    #[error("no cube available to anchor view '{view}'")]
    RootNotFound { view: String },
}

impl Defect {
    /// Short label used when grouping defects in the error log.
    pub fn kind(&self) -> &'static str {
        match self {
            Defect::SourceParse { .. } => "source-parse",
            Defect::ClassificationMiss { .. } => "classification-miss",
            Defect::MissingRequiredField { .. } => "missing-required-field",
            Defect::DuplicateCube { .. } => "duplicate-cube",
            Defect::UnresolvedAttachment { .. } => "unresolved-attachment",
            Defect::RootNotFound { .. } => "root-not-found",
        }
    }
}

#[derive(Debug, Default)]
pub struct RunContext {
    defects: Vec<Defect>,
    documents: BTreeMap<String, String>,
    views: BTreeMap<String, String>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, defect: Defect) {
        warn!("{defect}");
        self.defects.push(defect);
    }

    pub fn defects(&self) -> &[Defect] {
        &self.defects
    }

    pub fn has_defects(&self) -> bool {
        !self.defects.is_empty()
    }

    /// Records rendered cube YAML under the cube name.
    pub fn record_document(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.documents.insert(name.into(), text.into());
    }

    pub fn documents(&self) -> &BTreeMap<String, String> {
        &self.documents
    }

    /// Records rendered view YAML. Views have their own namespace, so a view
    /// named like a cube never replaces that cube's document.
    pub fn record_view(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.views.insert(name.into(), text.into());
    }

    pub fn views(&self) -> &BTreeMap<String, String> {
        &self.views
    }
}
