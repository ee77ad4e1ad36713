//! Thin serde_yaml wrappers used for configuration and cube documents.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

pub use serde_yaml::Value as YamlValue;

pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Opening YAML file {path:?}"))
}

pub fn parse_value(input: &str) -> Result<YamlValue> {
    Ok(serde_yaml::from_str(input)?)
}

pub fn load_value(path: &Path) -> Result<YamlValue> {
    let raw = read_to_string(path)?;
    parse_value(&raw).with_context(|| format!("Parsing YAML file {path:?}"))
}

pub fn load_from_path<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = read_to_string(path)?;
    serde_yaml::from_str(&raw).with_context(|| format!("Parsing YAML file {path:?}"))
}

/// Returns the string stored under `key` when `value` is a mapping.
pub fn str_field<'a>(value: &'a YamlValue, key: &str) -> Option<&'a str> {
    value.get(key).and_then(YamlValue::as_str)
}

/// Returns the sequence stored under `key`, if present and a sequence.
pub fn seq_field<'a>(value: &'a YamlValue, key: &str) -> Option<&'a Vec<YamlValue>> {
    value.get(key).and_then(YamlValue::as_sequence)
}
