//! Pack layout
//!
//! A pack is `Packs/<name>/` holding `pack_metadata.json` and one folder per
//! content kind (`Integrations/`, `Playbooks/`, ...).

use crate::document::{DocumentOptions, StructuredDocument};
use crate::error::{ContentError, Result};
use crate::git::GitStatuses;
use crate::item::ContentItem;
use crate::kind::ContentKind;
use crate::paths::resolve_primary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const PACK_METADATA: &str = "pack_metadata.json";

/// Typed view of `pack_metadata.json`.
///
/// Keys not modelled here are kept in `raw` and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackMetadata {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,

    #[serde(default)]
    pub support: String,

    #[serde(default)]
    pub author: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certification: Option<String>,

    #[serde(default, alias = "current_version")]
    pub current_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_min_version: Option<String>,

    #[serde(default)]
    pub deprecated: bool,

    #[serde(default)]
    pub hidden: bool,

    #[serde(default)]
    pub categories: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub use_cases: Vec<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub marketplaces: Vec<String>,

    #[serde(default)]
    pub dependencies: Map<String, Value>,

    #[serde(flatten)]
    pub raw: Map<String, Value>,
}

/// One pack directory
#[derive(Debug, Clone)]
pub struct Pack {
    path: PathBuf,
    name: String,
    options: DocumentOptions,
}

impl Pack {
    pub fn open(path: &Path, options: DocumentOptions) -> Result<Self> {
        if !path.is_dir() {
            return Err(ContentError::NotFound {
                path: path.to_path_buf(),
                expected: "pack directory".to_string(),
            });
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ContentError::Usage(format!("{} has no pack name", path.display())))?
            .to_string();
        Ok(Self {
            path: path.to_path_buf(),
            name,
            options,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory name, which is also the pack id
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &DocumentOptions {
        &self.options
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.path.join(PACK_METADATA)
    }

    /// `pack_metadata.json` as a lazily loaded document
    pub fn metadata_document(&self) -> Result<StructuredDocument> {
        let path = self.metadata_path();
        if !path.is_file() {
            return Err(ContentError::NotFound {
                path: self.path.clone(),
                expected: PACK_METADATA.to_string(),
            });
        }
        StructuredDocument::open(path, self.options.clone())
    }

    /// `pack_metadata.json` as an item of kind `Pack`, for validation
    pub fn metadata_item(&self) -> Result<ContentItem> {
        ContentItem::from_path(&self.metadata_path(), ContentKind::Pack, self.options.clone())
    }

    pub fn metadata(&self) -> Result<PackMetadata> {
        let doc = self.metadata_document()?;
        serde_json::from_value(Value::Object(doc.to_dict()?)).map_err(|source| {
            ContentError::JsonParse {
                path: doc.path().to_path_buf(),
                source,
            }
        })
    }

    pub fn readme(&self) -> Option<PathBuf> {
        self.existing("README.md")
    }

    pub fn pack_ignore(&self) -> Option<PathBuf> {
        self.existing(".pack-ignore")
    }

    pub fn secrets_ignore(&self) -> Option<PathBuf> {
        self.existing(".secrets-ignore")
    }

    pub fn author_image(&self) -> Option<PathBuf> {
        self.existing("Author_image.png")
    }

    fn existing(&self, name: &str) -> Option<PathBuf> {
        let path = self.path.join(name);
        path.is_file().then_some(path)
    }

    /// Content folders present in the pack, each listed once
    pub fn folders(&self) -> Vec<PathBuf> {
        let mut folders: Vec<PathBuf> = Vec::new();
        for kind in ContentKind::content_items() {
            let folder = self.path.join(kind.pack_folder());
            if folder.is_dir() && !folders.contains(&folder) {
                folders.push(folder);
            }
        }
        folders
    }

    /// Every item of `kind`, in file name order.
    ///
    /// Items are either primary files directly in the kind folder or one
    /// sub-directory per item.
    pub fn items(&self, kind: ContentKind) -> Result<Vec<ContentItem>> {
        let folder = self.path.join(kind.pack_folder());
        if !folder.is_dir() {
            return Ok(Vec::new());
        }
        let suffixes = kind.primary_suffixes();

        let mut entries: Vec<PathBuf> = fs::read_dir(&folder)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| !n.starts_with('.'))
                    .unwrap_or(false)
            })
            .collect();
        entries.sort();

        let mut items = Vec::new();
        for entry in entries {
            let primary = if entry.is_dir() {
                match item_in_directory(&entry, suffixes)? {
                    Some(primary) => primary,
                    None => continue,
                }
            } else if has_suffix(&entry, suffixes) {
                entry
            } else {
                continue;
            };

            let item = ContentItem::from_path(&primary, kind, self.options.clone())?.refine_kind()?;
            if item.kind() == kind {
                items.push(item);
            }
        }
        debug!(pack = %self.name, kind = %kind, count = items.len(), "Enumerated items");
        Ok(items)
    }

    /// Every item of every kind
    pub fn content_items(&self) -> Result<Vec<ContentItem>> {
        let mut items = Vec::new();
        for kind in ContentKind::content_items() {
            items.extend(self.items(kind)?);
        }
        Ok(items)
    }

    /// [`content_items`](Self::content_items) with each item's git status filled in
    pub fn content_items_with_status(&self, statuses: &GitStatuses) -> Result<Vec<ContentItem>> {
        let mut items = self.content_items()?;
        for item in &mut items {
            let status = statuses.status_of(item.path());
            item.set_git_status(status);
        }
        Ok(items)
    }

    /// The metadata item followed by every content item, all tagged with
    /// their git status
    pub fn validation_items(&self, statuses: &GitStatuses) -> Result<Vec<ContentItem>> {
        let mut metadata = self.metadata_item()?;
        metadata.set_git_status(statuses.status_of(metadata.path()));
        let mut items = vec![metadata];
        items.extend(self.content_items_with_status(statuses)?);
        Ok(items)
    }
}

/// Primary file of an item directory; several candidates fall back to the
/// file named after the directory
fn item_in_directory(dir: &Path, suffixes: &[&str]) -> Result<Option<PathBuf>> {
    match resolve_primary(dir, suffixes) {
        Ok(primary) => Ok(Some(primary)),
        Err(ContentError::NotFound { .. }) => {
            debug!(dir = %dir.display(), "No primary file, skipping");
            Ok(None)
        }
        Err(err @ ContentError::Ambiguous { .. }) => {
            let Some(stem) = dir.file_name() else {
                return Err(err);
            };
            suffixes
                .iter()
                .map(|suffix| {
                    let mut name = stem.to_os_string();
                    name.push(format!(".{suffix}"));
                    dir.join(name)
                })
                .find(|candidate| candidate.is_file())
                .map(Some)
                .ok_or(err)
        }
        Err(err) => Err(err),
    }
}

fn has_suffix(path: &Path, suffixes: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| suffixes.contains(&ext))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::GitStatus;
    use tempfile::tempdir;

    const METADATA: &str = r#"{
    "name": "Acme",
    "description": "Acme pack",
    "created": "2023-04-01T10:00:00Z",
    "support": "community",
    "author": "Acme Inc",
    "currentVersion": "1.2.0",
    "categories": ["Utilities"],
    "marketplaces": ["xsoar", "marketplacev2"],
    "githubUser": ["acme"]
}
"#;

    fn pack(root: &Path) -> Pack {
        let dir = root.join("Packs/Acme");
        fs::create_dir_all(dir.join("Integrations/AcmeApi")).unwrap();
        fs::create_dir_all(dir.join("Playbooks")).unwrap();
        fs::create_dir_all(dir.join("Classifiers")).unwrap();
        fs::write(dir.join(PACK_METADATA), METADATA).unwrap();
        fs::write(dir.join("README.md"), "# Acme").unwrap();
        fs::write(
            dir.join("Integrations/AcmeApi/AcmeApi.yml"),
            "commonfields:\n  id: AcmeApi\nname: AcmeApi\nscript:\n  type: python\n",
        )
        .unwrap();
        fs::write(dir.join("Integrations/AcmeApi/AcmeApi.py"), "").unwrap();
        fs::write(dir.join("Playbooks/playbook-Triage.yml"), "id: Triage\n").unwrap();
        fs::write(dir.join("Playbooks/playbook-Triage_README.md"), "").unwrap();
        fs::write(dir.join("Classifiers/classifier-Acme.json"), r#"{"id": "c", "type": "classification"}"#).unwrap();
        fs::write(dir.join("Classifiers/classifier-mapper-Acme.json"), r#"{"id": "m", "type": "mapping-incoming"}"#).unwrap();
        Pack::open(&dir, DocumentOptions::default()).unwrap()
    }

    #[test]
    fn test_metadata() {
        let root = tempdir().unwrap();
        let pack = pack(root.path());
        assert_eq!(pack.name(), "Acme");
        let metadata = pack.metadata().unwrap();
        assert_eq!(metadata.current_version, "1.2.0");
        assert_eq!(metadata.created.unwrap().to_rfc3339(), "2023-04-01T10:00:00+00:00");
        assert_eq!(metadata.marketplaces.len(), 2);
        assert!(!metadata.deprecated);
        assert_eq!(metadata.raw["githubUser"], serde_json::json!(["acme"]));
        assert!(pack.readme().is_some());
        assert!(pack.pack_ignore().is_none());
    }

    #[test]
    fn test_pack_level_files() {
        let root = tempdir().unwrap();
        let pack = pack(root.path());
        assert!(pack.secrets_ignore().is_none());
        assert!(pack.author_image().is_none());

        fs::write(pack.path().join(".secrets-ignore"), "acme.example\n").unwrap();
        fs::write(pack.path().join("Author_image.png"), [0x89, b'P', b'N', b'G']).unwrap();
        assert_eq!(pack.secrets_ignore(), Some(pack.path().join(".secrets-ignore")));
        assert_eq!(pack.author_image(), Some(pack.path().join("Author_image.png")));
    }

    #[test]
    fn test_validation_items_carry_git_status() {
        let root = tempdir().unwrap();
        git2::Repository::init(root.path()).unwrap();
        let pack = pack(root.path());
        let statuses = GitStatuses::collect(root.path()).unwrap();

        let items = pack.validation_items(&statuses).unwrap();
        assert_eq!(items[0].kind(), ContentKind::Pack);
        assert_eq!(items.len(), pack.content_items().unwrap().len() + 1);
        assert!(items.iter().all(|i| i.git_status() == GitStatus::Added));
    }

    #[test]
    fn test_items_without_git_changes_are_unchanged() {
        let root = tempdir().unwrap();
        let pack = pack(root.path());
        let items = pack.content_items_with_status(&GitStatuses::default()).unwrap();
        assert!(!items.is_empty());
        assert!(items.iter().all(|i| i.git_status() == GitStatus::Unchanged));
    }

    #[test]
    fn test_folders_listed_once() {
        let root = tempdir().unwrap();
        let pack = pack(root.path());
        let names: Vec<_> = pack
            .folders()
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.iter().filter(|n| *n == "Classifiers").count(), 1);
        assert!(names.contains(&"Integrations".to_string()));
        assert!(names.contains(&"Playbooks".to_string()));
    }

    #[test]
    fn test_items_by_kind() {
        let root = tempdir().unwrap();
        let pack = pack(root.path());

        let integrations = pack.items(ContentKind::Integration).unwrap();
        assert_eq!(integrations.len(), 1);
        assert_eq!(integrations[0].id().unwrap(), Some("AcmeApi"));

        let playbooks = pack.items(ContentKind::Playbook).unwrap();
        assert_eq!(playbooks.len(), 1);
        assert!(playbooks[0].readme().is_some());

        let classifiers = pack.items(ContentKind::Classifier).unwrap();
        let mappers = pack.items(ContentKind::Mapper).unwrap();
        assert_eq!(classifiers.len(), 1);
        assert_eq!(mappers.len(), 1);
        assert_eq!(mappers[0].id().unwrap(), Some("m"));

        assert_eq!(pack.content_items().unwrap().len(), 4);
        assert!(pack.items(ContentKind::Layout).unwrap().is_empty());
    }

    #[test]
    fn test_item_directory_falls_back_to_own_name() {
        let root = tempdir().unwrap();
        let dir = root.path().join("Foo");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Foo.yml"), "id: Foo\n").unwrap();
        fs::write(dir.join("Foo_unified.yml"), "id: Foo\n").unwrap();
        let primary = item_in_directory(&dir, &["yml"]).unwrap().unwrap();
        assert_eq!(primary.file_name().unwrap(), "Foo.yml");

        fs::remove_file(dir.join("Foo.yml")).unwrap();
        fs::write(dir.join("Bar.yml"), "id: Bar\n").unwrap();
        assert!(matches!(
            item_in_directory(&dir, &["yml"]),
            Err(ContentError::Ambiguous { .. })
        ));
    }

    #[test]
    fn test_missing_metadata() {
        let root = tempdir().unwrap();
        let pack = Pack::open(root.path(), DocumentOptions::default()).unwrap();
        assert!(matches!(pack.metadata(), Err(ContentError::NotFound { .. })));
        assert!(Pack::open(&root.path().join("nope"), DocumentOptions::default()).is_err());
    }
}
