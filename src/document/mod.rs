//! Lazily loaded structured documents
//!
//! A [`StructuredDocument`] wraps one YAML or JSON file. Nothing is read
//! until a key is accessed; mutations are tracked so that an untouched file
//! can be copied byte for byte and a touched YAML file can be patched in
//! place rather than re-emitted.

pub mod json;
pub mod yaml;

use crate::error::{ContentError, Result};
use crate::staging::{copy_atomic, write_atomic};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub use json::JsonOptions;
pub use yaml::{DuplicateKeys, YamlOptions};

/// On-disk encoding of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    /// Format implied by the file suffix
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "yml" | "yaml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Loading and output options for both document formats
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentOptions {
    #[serde(default)]
    pub yaml: YamlOptions,

    #[serde(default)]
    pub json: JsonOptions,
}

/// A mapping-backed content file with lazy load and tracked mutation.
///
/// Not `Sync`: the first read fills the cache through a shared reference.
#[derive(Debug, Clone)]
pub struct StructuredDocument {
    path: PathBuf,
    format: DocumentFormat,
    options: DocumentOptions,
    source: OnceCell<String>,
    data: OnceCell<Map<String, Value>>,
    touched: Vec<Vec<String>>,
    dirty: bool,
}

impl StructuredDocument {
    /// Wrap `path` without reading it. The format follows the suffix.
    pub fn open(path: impl Into<PathBuf>, options: DocumentOptions) -> Result<Self> {
        let path = path.into();
        let format = DocumentFormat::from_path(&path).ok_or_else(|| ContentError::WrongKind {
            path: path.clone(),
            expected: "*.yml|*.yaml|*.json".to_string(),
        })?;
        Ok(Self {
            path,
            format,
            options,
            source: OnceCell::new(),
            data: OnceCell::new(),
            touched: Vec::new(),
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    pub fn options(&self) -> &DocumentOptions {
        &self.options
    }

    /// Whether the file has been read and parsed
    pub fn is_loaded(&self) -> bool {
        self.data.get().is_some()
    }

    /// Whether any key was set or removed since opening
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Raw text of the source file
    pub fn source(&self) -> Result<&str> {
        if let Some(text) = self.source.get() {
            return Ok(text);
        }
        debug!(path = %self.path.display(), "Reading document");
        let text = fs::read_to_string(&self.path)?;
        Ok(self.source.get_or_init(|| text))
    }

    fn data(&self) -> Result<&Map<String, Value>> {
        if let Some(data) = self.data.get() {
            return Ok(data);
        }
        let source = self.source()?;
        let parsed = match self.format {
            DocumentFormat::Yaml => yaml::parse(source, &self.path, &self.options.yaml)?,
            DocumentFormat::Json => json::parse(source, &self.path)?,
        };
        Ok(self.data.get_or_init(|| parsed))
    }

    fn data_mut(&mut self) -> Result<&mut Map<String, Value>> {
        self.data()?;
        self.data
            .get_mut()
            .ok_or_else(|| ContentError::Internal(format!("{} not loaded", self.path.display())))
    }

    /// Value at `key`, loading the file if needed
    pub fn get(&self, key: &str) -> Result<Option<&Value>> {
        Ok(self.data()?.get(key))
    }

    /// Value at `key`, or `default` when missing
    pub fn get_or(&self, key: &str, default: Value) -> Result<Value> {
        Ok(self.get(key)?.cloned().unwrap_or(default))
    }

    /// String value at `key`; non-string values count as missing
    pub fn get_str(&self, key: &str) -> Result<Option<&str>> {
        Ok(self.get(key)?.and_then(Value::as_str))
    }

    /// Value at a nested key path such as `["script", "type"]`
    pub fn get_path(&self, path: &[&str]) -> Result<Option<&Value>> {
        let Some((first, rest)) = path.split_first() else {
            return Ok(None);
        };
        let mut current = self.get(first)?;
        for key in rest {
            current = current.and_then(|v| v.get(key));
        }
        Ok(current)
    }

    /// Set a top-level key
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.set_path(&[key], value)
    }

    /// Set a nested key, creating intermediate mappings as needed
    pub fn set_path(&mut self, path: &[&str], value: impl Into<Value>) -> Result<()> {
        let Some((last, parents)) = path.split_last() else {
            return Err(ContentError::Usage("empty key path".to_string()));
        };
        let doc_path = self.path.clone();
        let mut map = self.data_mut()?;
        for key in parents {
            let entry = map
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            map = entry.as_object_mut().ok_or_else(|| {
                ContentError::Usage(format!(
                    "{}: '{}' is not a mapping",
                    doc_path.display(),
                    key
                ))
            })?;
        }
        map.insert(last.to_string(), value.into());
        self.touch(path);
        Ok(())
    }

    /// Remove a top-level key, returning its value
    pub fn remove(&mut self, key: &str) -> Result<Option<Value>> {
        let removed = self.data_mut()?.shift_remove(key);
        if removed.is_some() {
            self.touch(&[key]);
        }
        Ok(removed)
    }

    fn touch(&mut self, path: &[&str]) {
        let path: Vec<String> = path.iter().map(|k| k.to_string()).collect();
        if !self.touched.contains(&path) {
            self.touched.push(path);
        }
        self.dirty = true;
    }

    /// Snapshot of the whole mapping
    pub fn to_dict(&self) -> Result<Map<String, Value>> {
        Ok(self.data()?.clone())
    }

    /// Render the current state as text.
    ///
    /// This builds the whole file in memory; prefer [`serialize`](Self::serialize)
    /// unless a string is really needed.
    pub fn render(&self) -> Result<String> {
        match self.format {
            DocumentFormat::Json => {
                let value = Value::Object(self.data()?.clone());
                json::render(&value, &self.options.json)
                    .map_err(|e| ContentError::serialize(&self.path, e))
            }
            DocumentFormat::Yaml => {
                if self.options.yaml.sorted {
                    return self.render_sorted();
                }
                if !self.dirty {
                    return Ok(self.source()?.to_string());
                }
                let data = self.data()?;
                match yaml::patch(self.source()?, data, &self.touched) {
                    Some(text) => Ok(text),
                    None => {
                        warn!(
                            path = %self.path.display(),
                            "Layout cannot be patched in place, re-emitting without comments"
                        );
                        yaml::emit(data).map_err(|e| ContentError::serialize(&self.path, e))
                    }
                }
            }
        }
    }

    /// Render with every mapping's keys sorted, sequences left in order
    pub fn render_sorted(&self) -> Result<String> {
        let sorted = sort_keys(&Value::Object(self.data()?.clone()));
        match self.format {
            DocumentFormat::Json => json::render(&sorted, &self.options.json)
                .map_err(|e| ContentError::serialize(&self.path, e)),
            DocumentFormat::Yaml => {
                let map = match sorted {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                yaml::emit(&map).map_err(|e| ContentError::serialize(&self.path, e))
            }
        }
    }

    /// Write the current in-memory state to `dest`
    pub fn serialize(&self, dest: &Path) -> Result<()> {
        let text = self.render()?;
        write_atomic(dest, text.as_bytes())?;
        debug!(src = %self.path.display(), dest = %dest.display(), "Serialized document");
        Ok(())
    }

    /// Copy the source file to `dest` unchanged
    pub fn copy_to(&self, dest: &Path) -> Result<()> {
        copy_atomic(&self.path, dest)?;
        debug!(src = %self.path.display(), dest = %dest.display(), "Copied document");
        Ok(())
    }
}

/// Recursively reorder mapping keys; sequences keep their order
pub fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}
