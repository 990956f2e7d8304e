//! Content items
//!
//! A [`ContentItem`] is one primary YAML or JSON file plus the companion
//! files found next to it. Companions are looked up on every access and are
//! never owned by the item.

use crate::document::{DocumentOptions, StructuredDocument};
use crate::error::{ContentError, Result};
use crate::git::GitStatus;
use crate::kind::ContentKind;
use crate::paths::{escape, glob_sibling, resolve_primary, Companion};
use crate::version::ContentVersion;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};

/// Scripting language of a code-bearing item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptType {
    Python,
    JavaScript,
    PowerShell,
}

impl ScriptType {
    /// Parse the `type` field of a script section
    pub fn from_declared(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "python" => Some(Self::Python),
            "javascript" => Some(Self::JavaScript),
            "powershell" => Some(Self::PowerShell),
            _ => None,
        }
    }

    /// Suffix of the code file, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Python => "py",
            Self::JavaScript => "js",
            Self::PowerShell => "ps1",
        }
    }
}

/// One content item on disk
#[derive(Debug, Clone)]
pub struct ContentItem {
    document: StructuredDocument,
    kind: ContentKind,
    prefix: String,
    git_status: GitStatus,
}

impl ContentItem {
    /// Open an item of a known kind from a file or its directory
    pub fn from_path(path: &Path, kind: ContentKind, options: DocumentOptions) -> Result<Self> {
        let primary = resolve_primary(path, kind.primary_suffixes())?;
        Ok(Self {
            document: StructuredDocument::open(primary, options)?,
            kind,
            prefix: String::new(),
            git_status: GitStatus::Unchanged,
        })
    }

    /// Open an item, inferring its kind from the enclosing pack folders.
    ///
    /// Classifier files whose `type` starts with `mapping` are mappers, so
    /// those are read eagerly.
    pub fn detect(path: &Path, options: DocumentOptions) -> Result<Self> {
        let kind_path = if path.is_dir() {
            path.join("_")
        } else {
            path.to_path_buf()
        };
        let kind = ContentKind::from_path(&kind_path).ok_or_else(|| ContentError::UnknownKind {
            path: path.to_path_buf(),
        })?;
        Self::from_path(path, kind, options)?.refine_kind()
    }

    /// Split the shared `Classifiers` folder into classifiers and mappers
    pub(crate) fn refine_kind(mut self) -> Result<Self> {
        if matches!(self.kind, ContentKind::Classifier | ContentKind::Mapper) {
            let mapping = self
                .content_type()?
                .map(|t| t.starts_with("mapping"))
                .unwrap_or(false);
            self.kind = if mapping {
                ContentKind::Mapper
            } else {
                ContentKind::Classifier
            };
        }
        Ok(self)
    }

    /// Set the dump prefix, builder style
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn set_prefix(&mut self, prefix: impl Into<String>) {
        self.prefix = prefix.into();
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn with_git_status(mut self, status: GitStatus) -> Self {
        self.git_status = status;
        self
    }

    pub fn set_git_status(&mut self, status: GitStatus) {
        self.git_status = status;
    }

    pub fn git_status(&self) -> GitStatus {
        self.git_status
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    /// The canonical primary file
    pub fn path(&self) -> &Path {
        self.document.path()
    }

    pub fn document(&self) -> &StructuredDocument {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut StructuredDocument {
        &mut self.document
    }

    pub fn is_dirty(&self) -> bool {
        self.document.is_dirty()
    }

    pub fn get(&self, key: &str) -> Result<Option<&Value>> {
        self.document.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.document.set(key, value)
    }

    /// `commonfields.id`, falling back to a top-level `id`
    pub fn id(&self) -> Result<Option<&str>> {
        if let Some(id) = self
            .document
            .get_path(&["commonfields", "id"])?
            .and_then(Value::as_str)
        {
            return Ok(Some(id));
        }
        self.document.get_str("id")
    }

    pub fn name(&self) -> Result<Option<&str>> {
        self.document.get_str("name")
    }

    /// The `type` field
    pub fn content_type(&self) -> Result<Option<&str>> {
        self.document.get_str("type")
    }

    pub fn description_text(&self) -> Result<Option<&str>> {
        self.document.get_str("description")
    }

    /// `fromversion` (or `fromVersion`), parsed
    pub fn from_version(&self) -> Result<Option<ContentVersion>> {
        self.version_field(&["fromversion", "fromVersion"])
    }

    /// `toversion` (or `toVersion`), parsed
    pub fn to_version(&self) -> Result<Option<ContentVersion>> {
        self.version_field(&["toversion", "toVersion"])
    }

    fn version_field(&self, keys: &[&str]) -> Result<Option<ContentVersion>> {
        for key in keys {
            match self.document.get(key)? {
                Some(Value::String(s)) => return ContentVersion::parse(s).map(Some),
                Some(Value::Number(n)) => return ContentVersion::parse(&n.to_string()).map(Some),
                _ => {}
            }
        }
        Ok(None)
    }

    /// Name of the pack holding this item, taken from the path
    pub fn pack_name(&self) -> Option<String> {
        let mut components = self.path().components();
        while let Some(component) = components.next() {
            if component == Component::Normal("Packs".as_ref()) {
                return components
                    .next()
                    .and_then(|c| c.as_os_str().to_str())
                    .map(str::to_string);
            }
        }
        None
    }

    /// Look up a companion file; absent companions and kinds that do not
    /// carry one both yield `None`
    pub fn companion(&self, companion: Companion) -> Option<PathBuf> {
        if !self.kind.companions().contains(&companion) {
            return None;
        }
        companion.find(self.path())
    }

    pub fn changelog(&self) -> Option<PathBuf> {
        self.companion(Companion::Changelog)
    }

    pub fn readme(&self) -> Option<PathBuf> {
        self.companion(Companion::Readme)
    }

    pub fn description(&self) -> Option<PathBuf> {
        self.companion(Companion::Description)
    }

    pub fn image(&self) -> Option<PathBuf> {
        self.companion(Companion::Image)
    }

    /// Adjacent script file. When the declared script type is known the file
    /// with that suffix wins over other code files.
    pub fn code(&self) -> Option<PathBuf> {
        if !self.kind.is_code_bearing() {
            return None;
        }
        if let Ok(Some(script_type)) = self.script_type() {
            let stem = self.path().file_stem()?.to_str()?;
            let exact = format!("{}.{}", escape(stem), script_type.extension());
            if let Some(found) = glob_sibling(self.path(), &[exact]) {
                return Some(found);
            }
        }
        self.companion(Companion::Code)
    }

    pub fn unittest(&self) -> Option<PathBuf> {
        self.companion(Companion::UnitTest)
    }

    /// True once the script lives inside the primary file
    pub fn is_unified(&self) -> bool {
        self.code().is_none()
    }

    /// The `script` mapping of an integration, holding `type`, `script`
    /// and `dockerimage`. Scripts keep those keys at the top level.
    pub fn script_section(&self) -> Result<Option<&Value>> {
        match self.kind {
            ContentKind::Integration => self.document.get("script"),
            _ => Ok(None),
        }
    }

    fn script_field(&self, key: &str) -> Result<Option<&Value>> {
        match self.kind {
            ContentKind::Integration => self.document.get_path(&["script", key]),
            ContentKind::Script => self.document.get(key),
            _ => Ok(None),
        }
    }

    /// Declared scripting language
    pub fn script_type(&self) -> Result<Option<ScriptType>> {
        Ok(self
            .script_field("type")?
            .and_then(Value::as_str)
            .and_then(ScriptType::from_declared))
    }

    pub fn docker_image(&self) -> Result<Option<&str>> {
        Ok(self.script_field("dockerimage")?.and_then(Value::as_str))
    }

    /// Key path where the script body is folded in on unify
    pub fn script_key_path(&self) -> &'static [&'static str] {
        match self.kind {
            ContentKind::Integration => &["script", "script"],
            _ => &["script"],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const INTEGRATION: &str = "\
commonfields:
  id: Acme
  version: -1
name: Acme
fromversion: 6.0
script:
  type: python
  dockerimage: demisto/python3:3.10.1
  script: '-'
";

    fn integration_dir(root: &Path) -> PathBuf {
        let dir = root.join("Packs/AcmePack/Integrations/Acme");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Acme.yml"), INTEGRATION).unwrap();
        dir
    }

    #[test]
    fn test_accessors() {
        let root = tempdir().unwrap();
        let dir = integration_dir(root.path());
        let item = ContentItem::detect(&dir, DocumentOptions::default()).unwrap();

        assert_eq!(item.kind(), ContentKind::Integration);
        assert_eq!(item.path().file_name().unwrap(), "Acme.yml");
        assert_eq!(item.id().unwrap(), Some("Acme"));
        assert_eq!(item.name().unwrap(), Some("Acme"));
        assert_eq!(item.from_version().unwrap().unwrap().to_string(), "6.0.0");
        assert_eq!(item.to_version().unwrap(), None);
        assert_eq!(item.pack_name().as_deref(), Some("AcmePack"));
        assert_eq!(item.script_type().unwrap(), Some(ScriptType::Python));
        assert_eq!(item.docker_image().unwrap(), Some("demisto/python3:3.10.1"));
        assert!(item.script_section().unwrap().unwrap().is_object());
    }

    #[test]
    fn test_unified_iff_no_code() {
        let root = tempdir().unwrap();
        let dir = integration_dir(root.path());
        let item = ContentItem::detect(&dir, DocumentOptions::default()).unwrap();
        assert!(item.is_unified());

        fs::write(dir.join("Acme.js"), "// js").unwrap();
        fs::write(dir.join("Acme.py"), "print(1)").unwrap();
        assert!(!item.is_unified());
        assert_eq!(item.code().unwrap().file_name().unwrap(), "Acme.py");
    }

    #[test]
    fn test_companions_resolve_each_time() {
        let root = tempdir().unwrap();
        let dir = integration_dir(root.path());
        let item = ContentItem::detect(&dir, DocumentOptions::default()).unwrap();
        assert_eq!(item.changelog(), None);
        fs::write(dir.join("Acme_CHANGELOG.md"), "## 1.0").unwrap();
        assert!(item.changelog().is_some());
        assert_eq!(item.unittest(), None);
        fs::write(dir.join("test_acme.py"), "").unwrap();
        assert!(item.unittest().is_some());
    }

    #[test]
    fn test_non_code_kind_has_no_code() {
        let root = tempdir().unwrap();
        let dir = root.path().join("Packs/AcmePack/Classifiers");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("classifier-mapper-Acme.json"), r#"{"id": "m", "type": "mapping-incoming"}"#).unwrap();
        fs::write(dir.join("classifier-mapper-Acme.py"), "").unwrap();

        let item = ContentItem::detect(
            &dir.join("classifier-mapper-Acme.json"),
            DocumentOptions::default(),
        )
        .unwrap();
        assert_eq!(item.kind(), ContentKind::Mapper);
        assert_eq!(item.code(), None);
        assert!(item.is_unified());
        assert_eq!(item.id().unwrap(), Some("m"));
    }

    #[test]
    fn test_detect_unknown_kind() {
        let root = tempdir().unwrap();
        let path = root.path().join("loose.yml");
        fs::write(&path, "a: 1\n").unwrap();
        let err = ContentItem::detect(&path, DocumentOptions::default()).unwrap_err();
        assert!(matches!(err, ContentError::UnknownKind { .. }));
    }
}
