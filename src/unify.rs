//! Folding split code-bearing items into a single deployable file
//!
//! An integration or script is authored as a YAML file plus an adjacent code
//! file (and, for integrations, an image and a long description). Unifying
//! embeds those companions into a copy of the YAML:
//!
//! | companion | integration key | script key |
//! |-----------|-----------------|------------|
//! | code | `script.script` | `script` |
//! | image | `image` (data URI) | n/a |
//! | description | `detaileddescription` | n/a |

use crate::document::{DocumentOptions, StructuredDocument};
use crate::error::{ContentError, Result};
use crate::item::{ContentItem, ScriptType};
use crate::kind::ContentKind;
use crate::paths::prefixed_name;
use crate::staging::write_atomic;
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Options controlling how companions are folded in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifyOptions {
    /// Prepended to the base64 image payload
    pub image_prefix: String,

    /// Replace an existing `image` or `detaileddescription` value
    pub force: bool,

    /// Pack version stamped into the code. Read from the enclosing
    /// `pack_metadata.json` when unset.
    pub pack_version: Option<String>,
}

impl Default for UnifyOptions {
    fn default() -> Self {
        Self {
            image_prefix: "data:image/png;base64,".to_string(),
            force: true,
            pack_version: None,
        }
    }
}

/// Build the unified document for `item` in memory.
///
/// Items that are already unified come back unchanged.
pub fn unified_document(item: &ContentItem, options: &UnifyOptions) -> Result<StructuredDocument> {
    let mut doc = item.document().clone();
    let Some(code_path) = item.code() else {
        return Ok(doc);
    };
    let primary = item.path().to_path_buf();

    let script_type = match item.script_type()? {
        Some(t) => t,
        None => script_type_of(&code_path).ok_or_else(|| {
            ContentError::unify(&primary, format!("unknown code file {}", code_path.display()))
        })?,
    };
    let code = fs::read_to_string(&code_path).map_err(|e| ContentError::unify(&primary, e))?;

    let pack_version = match &options.pack_version {
        Some(v) => Some(v.clone()),
        None => enclosing_pack_version(&primary),
    };
    let code = match pack_version {
        Some(version) if !version.is_empty() => insert_pack_version(script_type, &code, &version),
        _ => code,
    };

    let name = item.name()?.unwrap_or_default().to_string();
    let code = clean_code(script_type, &code, &name);

    let key_path = item.script_key_path();
    match doc.get_path(key_path)? {
        Some(Value::String(existing)) if !existing.is_empty() && existing != "-" => {
            warn!(
                path = %primary.display(),
                "Script section is not empty, it should be blank or a dash (-)"
            );
        }
        _ => {}
    }
    doc.set_path(key_path, code)?;

    if item.kind() == ContentKind::Integration {
        if let Some(image) = item.image() {
            let bytes = fs::read(&image).map_err(|e| ContentError::unify(&primary, e))?;
            let payload = format!(
                "{}{}",
                options.image_prefix,
                base64::engine::general_purpose::STANDARD.encode(bytes)
            );
            fold_field(&mut doc, "image", payload, options.force)?;
        } else {
            debug!(path = %primary.display(), "No image to fold in");
        }

        if let Some(description) = item.description() {
            let text =
                fs::read_to_string(&description).map_err(|e| ContentError::unify(&primary, e))?;
            fold_field(&mut doc, "detaileddescription", text, options.force)?;
        }
    }

    Ok(doc)
}

/// Unify `item` into `dest_dir`, returning the written file.
///
/// The output is named after the primary file with the item prefix applied.
pub fn unify(item: &ContentItem, dest_dir: &Path, options: &UnifyOptions) -> Result<PathBuf> {
    fs::create_dir_all(dest_dir)?;
    let doc = unified_document(item, options)?;
    let dest = dest_dir.join(output_name(item)?);
    write_atomic(&dest, doc.render()?.as_bytes())?;
    info!(src = %item.path().display(), dest = %dest.display(), "Unified");
    Ok(dest)
}

/// Output file name of `item`, prefix applied
pub(crate) fn output_name(item: &ContentItem) -> Result<String> {
    let name = item
        .path()
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ContentError::serialize(item.path(), "file name is not valid UTF-8"))?;
    Ok(prefixed_name(name, item.prefix()))
}

fn fold_field(doc: &mut StructuredDocument, key: &str, value: String, force: bool) -> Result<()> {
    let occupied = matches!(doc.get(key)?, Some(Value::String(s)) if !s.is_empty());
    if occupied && !force {
        return Err(ContentError::unify(
            doc.path(),
            format!("'{key}' is already set and a companion file exists"),
        ));
    }
    doc.set(key, value)
}

fn script_type_of(code: &Path) -> Option<ScriptType> {
    match code.extension()?.to_str()? {
        "py" => Some(ScriptType::Python),
        "js" => Some(ScriptType::JavaScript),
        "ps1" => Some(ScriptType::PowerShell),
        _ => None,
    }
}

/// `currentVersion` of the pack holding `primary`, if any
fn enclosing_pack_version(primary: &Path) -> Option<String> {
    let metadata = primary
        .ancestors()
        .find(|dir| dir.parent().and_then(Path::file_name) == Some("Packs".as_ref()))?
        .join("pack_metadata.json");
    if !metadata.is_file() {
        return None;
    }
    let doc = StructuredDocument::open(metadata, DocumentOptions::default()).ok()?;
    doc.get_str("currentVersion").ok()?.map(str::to_string)
}

/// Stamp the pack version at the top of the code unless already present
pub fn insert_pack_version(script_type: ScriptType, code: &str, version: &str) -> String {
    let marker = match script_type {
        ScriptType::JavaScript => "// pack version:",
        ScriptType::Python | ScriptType::PowerShell => "### pack version:",
    };
    if code.contains(marker) {
        code.to_string()
    } else {
        format!("{marker} {version}\n{code}")
    }
}

fn python_imports() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        [
            r"import demistomock as demisto[ \t]*(#.*)?",
            r"from CommonServerPython import \*[ \t]*(#.*)?",
            r"from CommonServerUserPython import \*[ \t]*(#.*)?",
            r"from __future__ import print_function[ \t]*(#.*)?",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("import pattern is valid"))
        .collect()
    })
}

const POWERSHELL_IMPORTS: [&str; 2] = [
    ". $PSScriptRoot\\demistomock.ps1",
    ". $PSScriptRoot\\CommonServerPowerShell.ps1",
];

/// Strip the helper imports the server provides and, for Python, wrap the
/// code in `register_module_line` markers.
///
/// Removed imports leave their line break behind.
pub fn clean_code(script_type: ScriptType, code: &str, name: &str) -> String {
    match script_type {
        ScriptType::Python => {
            let mut cleaned = code.to_string();
            for re in python_imports() {
                cleaned = re.replace_all(&cleaned, "").into_owned();
            }
            if name.contains("CommonServer") {
                cleaned
            } else {
                format!(
                    "register_module_line('{name}', 'start', __line__())\n{cleaned}\nregister_module_line('{name}', 'end', __line__())\n"
                )
            }
        }
        ScriptType::PowerShell => POWERSHELL_IMPORTS
            .iter()
            .fold(code.to_string(), |acc, import| acc.replace(import, "")),
        ScriptType::JavaScript => code.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentOptions;
    use tempfile::tempdir;

    const INTEGRATION: &str = "\
# Acme integration
commonfields:
  id: Acme
  version: -1
name: Acme
script:
  type: python
  script: '-'
";

    const SCRIPT: &str = "\
commonfields:
  id: AcmeScript
name: AcmeScript
type: javascript
script: ''
";

    fn integration(root: &Path) -> ContentItem {
        let dir = root.join("Packs/AcmePack/Integrations/Acme");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Acme.yml"), INTEGRATION).unwrap();
        fs::write(
            dir.join("Acme.py"),
            "import demistomock as demisto  # noqa\nfrom CommonServerPython import *\n\ndef main():\n    pass\n",
        )
        .unwrap();
        fs::write(dir.join("Acme.png"), [0x89, b'P', b'N', b'G']).unwrap();
        fs::write(dir.join("Acme.md"), "Configure an API key.").unwrap();
        ContentItem::detect(&dir, DocumentOptions::default()).unwrap()
    }

    #[test]
    fn test_clean_python() {
        let code = "import demistomock as demisto # mock\nfrom __future__ import print_function\nx = 1\n";
        let cleaned = clean_code(ScriptType::Python, code, "Acme");
        assert_eq!(
            cleaned,
            "register_module_line('Acme', 'start', __line__())\n\n\nx = 1\n\nregister_module_line('Acme', 'end', __line__())\n"
        );
        let common = clean_code(ScriptType::Python, "x = 1\n", "CommonServerPython");
        assert_eq!(common, "x = 1\n");
    }

    #[test]
    fn test_clean_powershell() {
        let code = ". $PSScriptRoot\\demistomock.ps1\n. $PSScriptRoot\\CommonServerPowerShell.ps1\nWrite-Host 1\n";
        assert_eq!(clean_code(ScriptType::PowerShell, code, "Acme"), "\n\nWrite-Host 1\n");
    }

    #[test]
    fn test_insert_pack_version_once() {
        let js = insert_pack_version(ScriptType::JavaScript, "return 1;", "1.2.0");
        assert_eq!(js, "// pack version: 1.2.0\nreturn 1;");
        assert_eq!(insert_pack_version(ScriptType::JavaScript, &js, "9.9.9"), js);
        let py = insert_pack_version(ScriptType::Python, "x = 1", "1.2.0");
        assert!(py.starts_with("### pack version: 1.2.0\n"));
    }

    #[test]
    fn test_unify_integration() {
        let root = tempdir().unwrap();
        let item = integration(root.path());
        let out = root.path().join("out");
        let dest = unify(&item, &out, &UnifyOptions::default()).unwrap();

        assert_eq!(dest, out.join("Acme.yml"));
        let names: Vec<_> = fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["Acme.yml"]);

        let unified = ContentItem::from_path(&dest, ContentKind::Integration, DocumentOptions::default()).unwrap();
        assert!(unified.is_unified());
        let script = unified.document().get_path(&["script", "script"]).unwrap().unwrap();
        let script = script.as_str().unwrap();
        assert!(script.contains("def main():"));
        assert!(!script.contains("import demistomock"));
        assert!(script.starts_with("register_module_line('Acme', 'start'"));
        assert_eq!(
            unified.get("image").unwrap().unwrap().as_str().unwrap(),
            "data:image/png;base64,iVBORw=="
        );
        assert_eq!(
            unified.get("detaileddescription").unwrap().unwrap(),
            "Configure an API key."
        );
        assert!(fs::read_to_string(&dest).unwrap().starts_with("# Acme integration\n"));
    }

    #[test]
    fn test_unify_script_with_pack_version() {
        let root = tempdir().unwrap();
        let pack = root.path().join("Packs/AcmePack");
        let dir = pack.join("Scripts/AcmeScript");
        fs::create_dir_all(&dir).unwrap();
        fs::write(pack.join("pack_metadata.json"), r#"{"currentVersion": "1.0.3"}"#).unwrap();
        fs::write(dir.join("AcmeScript.yml"), SCRIPT).unwrap();
        fs::write(dir.join("AcmeScript.js"), "return 'ok';\n").unwrap();
        let item = ContentItem::detect(&dir, DocumentOptions::default()).unwrap();

        let doc = unified_document(&item, &UnifyOptions::default()).unwrap();
        assert_eq!(
            doc.get_str("script").unwrap(),
            Some("// pack version: 1.0.3\nreturn 'ok';\n")
        );
        assert_eq!(doc.get("image").unwrap(), None);
        // Source untouched
        assert_eq!(fs::read_to_string(dir.join("AcmeScript.yml")).unwrap(), SCRIPT);
    }

    #[test]
    fn test_existing_image_needs_force() {
        let root = tempdir().unwrap();
        let dir = root.path().join("Packs/AcmePack/Integrations/Acme");
        let item = integration(root.path());
        fs::write(
            dir.join("Acme.yml"),
            format!("{INTEGRATION}image: data:image/png;base64,AAAA\n"),
        )
        .unwrap();
        let item = ContentItem::from_path(item.path(), ContentKind::Integration, DocumentOptions::default()).unwrap();

        let strict = UnifyOptions {
            force: false,
            ..Default::default()
        };
        let err = unified_document(&item, &strict).unwrap_err();
        assert!(matches!(err, ContentError::Unify { .. }));
        assert!(unified_document(&item, &UnifyOptions::default()).is_ok());
    }

    #[test]
    fn test_prefixed_output_name() {
        let root = tempdir().unwrap();
        let item = integration(root.path()).with_prefix("integration-");
        let dest = unify(&item, &root.path().join("out"), &UnifyOptions::default()).unwrap();
        assert_eq!(dest.file_name().unwrap(), "integration-Acme.yml");
    }
}
