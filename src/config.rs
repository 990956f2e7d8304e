//! Configuration management for the content SDK
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (content-sdk.toml)
//! - Environment variables (DEMISTO_SDK_*)
//!
//! ## Example config file (content-sdk.toml):
//! ```toml
//! content_path = "/src/content"
//!
//! [dump]
//! include_changelog = true
//! include_readme = true
//! batch = false
//!
//! [yaml]
//! sorted = false
//! duplicate_keys = "reject"
//!
//! [json]
//! indent = 4
//! escape_html = false
//!
//! [validation]
//! select = []
//! ignore = ["BA106"]
//! warning = ["DS108"]
//! ```
//!
//! `DEMISTO_SDK_CONTENT_PATH` and `DEMISTO_SDK_IGNORE_CONTENT_WARNING` map to
//! the top-level keys; nested keys use `__`, e.g. `DEMISTO_SDK_DUMP__BATCH`.

use crate::deadline::Deadline;
use crate::document::{DocumentOptions, JsonOptions, YamlOptions};
use crate::dump::DumpOptions;
use crate::error::{ContentError, Result};
use crate::git::ContentRoot;
use crate::unify::UnifyOptions;
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for the content SDK
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Content repository root, overriding discovery
    #[serde(default)]
    pub content_path: Option<PathBuf>,

    /// Silence "not in a content repository" diagnostics
    #[serde(default)]
    pub ignore_content_warning: Option<String>,

    /// Dump settings
    #[serde(default)]
    pub dump: DumpConfig,

    /// YAML loading and output
    #[serde(default)]
    pub yaml: YamlOptions,

    /// JSON output
    #[serde(default)]
    pub json: JsonOptions,

    /// Validator selection
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Dump configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpConfig {
    #[serde(default = "default_true")]
    pub include_changelog: bool,

    #[serde(default = "default_true")]
    pub include_readme: bool,

    /// Fold scripts into their primary file
    #[serde(default = "default_true")]
    pub unify: bool,

    /// Overwrite an existing image or description when unifying
    #[serde(default = "default_true")]
    pub force: bool,

    /// Collect per-item failures instead of stopping at the first
    #[serde(default)]
    pub batch: bool,

    #[serde(default = "default_image_prefix")]
    pub image_prefix: String,

    /// Whole-run limit for pack dumps
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Validation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Codes to run; empty runs everything
    #[serde(default)]
    pub select: Vec<String>,

    /// Codes never to run
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Codes reported without failing the run
    #[serde(default)]
    pub warning: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_image_prefix() -> String {
    "data:image/png;base64,".to_string()
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            include_changelog: true,
            include_readme: true,
            unify: true,
            force: true,
            batch: false,
            image_prefix: default_image_prefix(),
            timeout_secs: None,
        }
    }
}

impl ContentConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_locations = [
            "content-sdk.toml",
            ".content-sdk.toml",
            "config/content-sdk.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "content-sdk", "content-sdk") {
            let xdg_config = config_dir.config_dir().join("content-sdk.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("DEMISTO_SDK")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ContentError::serialize(path, e))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Whether the content warning is silenced; unparsable values count as false
    pub fn ignore_content_warning(&self) -> bool {
        string_to_bool(self.ignore_content_warning.as_deref(), Some(false)).unwrap_or(false)
    }

    /// Locate the content repository for `start`
    pub fn content_root(&self, start: &Path) -> ContentRoot {
        ContentRoot::discover(
            start,
            self.content_path.as_deref(),
            self.ignore_content_warning(),
        )
    }

    pub fn document_options(&self) -> DocumentOptions {
        DocumentOptions {
            yaml: self.yaml.clone(),
            json: self.json.clone(),
        }
    }

    pub fn unify_options(&self) -> UnifyOptions {
        UnifyOptions {
            image_prefix: self.dump.image_prefix.clone(),
            force: self.dump.force,
            pack_version: None,
        }
    }

    pub fn dump_options(&self) -> DumpOptions {
        DumpOptions {
            include_changelog: self.dump.include_changelog,
            include_readme: self.dump.include_readme,
            unify: self.dump.unify,
            batch: self.dump.batch,
            unify_options: self.unify_options(),
        }
    }

    /// Deadline for a whole dump run
    pub fn deadline(&self) -> Deadline {
        self.dump
            .timeout_secs
            .map(|secs| Deadline::after(Duration::from_secs(secs)))
            .unwrap_or_default()
    }
}

/// Coerce a user string to a boolean.
///
/// `y`, `yes`, `true`, `t`, `1` are true and `n`, `no`, `false`, `f`, `0`
/// are false, case-insensitively. An empty or missing value yields
/// `default_when_empty` when given.
pub fn string_to_bool(input: Option<&str>, default_when_empty: Option<bool>) -> Result<bool> {
    let raw = input.unwrap_or("");
    match raw.to_lowercase().as_str() {
        "y" | "yes" | "true" | "t" | "1" => Ok(true),
        "n" | "no" | "false" | "f" | "0" => Ok(false),
        "" if default_when_empty.is_some() => Ok(default_when_empty.unwrap_or_default()),
        _ => Err(ContentError::Usage(format!("cannot convert '{raw}' to bool"))),
    }
}

/// Interpret the `CI` environment value. Unset means not CI.
pub fn ci_mode(value: Option<&str>) -> Result<bool> {
    let Some(raw) = value else {
        return Ok(false);
    };
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ContentError::Usage(format!(
            "invalid CI value '{raw}', expected one of true, 1, yes, false, 0, no"
        ))),
    }
}

/// [`ci_mode`] for the current process environment
pub fn ci_from_env() -> Result<bool> {
    ci_mode(std::env::var("CI").ok().as_deref())
}
