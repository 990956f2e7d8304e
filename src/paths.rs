//! Path resolution and companion file discovery
//!
//! Every content item has one primary file. Users may point at the file
//! itself or at the directory holding it; [`resolve_primary`] turns either
//! into the canonical file. Companion files (changelog, readme, code, ...)
//! are located next to the primary by glob, see [`Companion`].

use crate::error::{ContentError, Result};
use globset::{Glob, GlobMatcher};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Files that live next to a primary content file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Companion {
    Changelog,
    Readme,
    Description,
    Image,
    Code,
    UnitTest,
}

impl Companion {
    /// Glob patterns for this companion, in priority order.
    ///
    /// `@(a|b)` groups are accepted and behave like `{a,b}`.
    pub fn patterns(&self, stem: &str) -> Vec<String> {
        let stem = escape(stem);
        match self {
            Self::Changelog => vec![format!("{stem}_CHANGELOG.md")],
            Self::Readme => vec![format!("{stem}_README.md"), "README.md".to_string()],
            Self::Description => vec![format!("{stem}.md")],
            Self::Image => vec![format!("{stem}.png")],
            Self::Code => vec![format!("{stem}.@(ps1|js|py)")],
            Self::UnitTest => vec!["test_*.py".to_string(), "*_test.py".to_string()],
        }
    }

    /// Locate this companion for `primary`, or `None` when absent
    pub fn find(&self, primary: &Path) -> Option<PathBuf> {
        let stem = primary.file_stem()?.to_str()?;
        glob_sibling(primary, &self.patterns(stem))
    }
}

/// Resolve a user path to the canonical primary file of a content item.
///
/// A directory resolves to its single file with one of `suffixes`. A file
/// must carry one of `suffixes`.
pub fn resolve_primary(path: &Path, suffixes: &[&str]) -> Result<PathBuf> {
    let expected = suffixes
        .iter()
        .map(|s| format!("*.{s}"))
        .collect::<Vec<_>>()
        .join("|");

    if path.is_dir() {
        let mut candidates: Vec<PathBuf> = fs::read_dir(path)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && has_suffix(p, suffixes))
            .collect();
        candidates.sort();

        return match candidates.len() {
            0 => Err(ContentError::NotFound {
                path: path.to_path_buf(),
                expected,
            }),
            1 => Ok(candidates.remove(0)),
            _ => Err(ContentError::Ambiguous {
                path: path.to_path_buf(),
                candidates: candidates
                    .iter()
                    .filter_map(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .collect(),
            }),
        };
    }

    if !path.exists() {
        return Err(ContentError::NotFound {
            path: path.to_path_buf(),
            expected,
        });
    }
    if !has_suffix(path, suffixes) {
        return Err(ContentError::WrongKind {
            path: path.to_path_buf(),
            expected,
        });
    }
    Ok(path.to_path_buf())
}

/// First file next to `primary` matching any of `patterns`.
///
/// Patterns are tried in order; within a pattern the directory listing
/// order decides. Missing directories and bad patterns yield `None`.
pub fn glob_sibling(primary: &Path, patterns: &[String]) -> Option<PathBuf> {
    let parent = match primary.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let entries: Vec<PathBuf> = fs::read_dir(parent)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .collect();

    for pattern in patterns {
        let Some(matcher) = compile(pattern) else {
            continue;
        };
        let found = entries.iter().find(|p| {
            p.file_name()
                .map(|name| matcher.is_match(Path::new(name)))
                .unwrap_or(false)
        });
        if let Some(found) = found {
            debug!(pattern = %pattern, path = %found.display(), "Companion found");
            return Some(found.clone());
        }
    }
    None
}

/// File name with `prefix` prepended unless it already starts with it
pub fn prefixed_name(name: &str, prefix: &str) -> String {
    if name.starts_with(prefix) {
        name.to_string()
    } else {
        format!("{prefix}{name}")
    }
}

fn has_suffix(path: &Path, suffixes: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| suffixes.contains(&ext))
        .unwrap_or(false)
}

fn compile(pattern: &str) -> Option<GlobMatcher> {
    let translated = translate_extglob(pattern);
    match Glob::new(&translated) {
        Ok(glob) => Some(glob.compile_matcher()),
        Err(e) => {
            warn!(pattern = %pattern, error = %e, "Skipping invalid companion pattern");
            None
        }
    }
}

/// Rewrite `@(a|b)` groups into the `{a,b}` alternation globset understands.
fn translate_extglob(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    let mut depth = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '@' if chars.peek() == Some(&'(') => {
                chars.next();
                depth += 1;
                out.push('{');
            }
            '|' if depth > 0 => out.push(','),
            ')' if depth > 0 => {
                depth -= 1;
                out.push('}');
            }
            _ => out.push(c),
        }
    }
    out
}

pub(crate) fn escape(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        match c {
            '*' | '?' | '[' | ']' | '{' | '}' => {
                out.push('[');
                out.push(c);
                out.push(']');
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn test_resolve_directory() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "Acme.yml");
        touch(dir.path(), "Acme.py");

        let primary = resolve_primary(dir.path(), &["yml", "yaml"]).unwrap();
        assert_eq!(primary.file_name().unwrap(), "Acme.yml");
    }

    #[test]
    fn test_resolve_errors() {
        let dir = tempdir().unwrap();
        let err = resolve_primary(dir.path(), &["yml"]).unwrap_err();
        assert!(matches!(err, ContentError::NotFound { .. }));

        touch(dir.path(), "a.yml");
        touch(dir.path(), "b.yml");
        let err = resolve_primary(dir.path(), &["yml"]).unwrap_err();
        match err {
            ContentError::Ambiguous { candidates, .. } => {
                assert_eq!(candidates, vec!["a.yml", "b.yml"]);
            }
            other => panic!("unexpected error: {other}"),
        }

        let json = touch(dir.path(), "c.json");
        let err = resolve_primary(&json, &["yml"]).unwrap_err();
        assert!(matches!(err, ContentError::WrongKind { .. }));

        let missing = dir.path().join("missing.yml");
        let err = resolve_primary(&missing, &["yml"]).unwrap_err();
        assert!(matches!(err, ContentError::NotFound { .. }));
    }

    #[test]
    fn test_companions() {
        let dir = tempdir().unwrap();
        let primary = touch(dir.path(), "Acme.yml");
        assert_eq!(Companion::Code.find(&primary), None);
        assert_eq!(Companion::Readme.find(&primary), None);

        touch(dir.path(), "Acme.js");
        touch(dir.path(), "README.md");
        touch(dir.path(), "Acme_README.md");
        touch(dir.path(), "Acme_test.py");

        assert_eq!(
            Companion::Code.find(&primary).unwrap().file_name().unwrap(),
            "Acme.js"
        );
        assert_eq!(
            Companion::Readme.find(&primary).unwrap().file_name().unwrap(),
            "Acme_README.md"
        );
        assert_eq!(
            Companion::UnitTest.find(&primary).unwrap().file_name().unwrap(),
            "Acme_test.py"
        );
        assert_eq!(Companion::Image.find(&primary), None);
    }

    #[test]
    fn test_pack_readme_fallback() {
        let dir = tempdir().unwrap();
        let primary = touch(dir.path(), "Acme.yml");
        touch(dir.path(), "README.md");
        assert_eq!(
            Companion::Readme.find(&primary).unwrap().file_name().unwrap(),
            "README.md"
        );
    }

    #[test]
    fn test_extglob_and_escape() {
        assert_eq!(translate_extglob("a.@(ps1|js|py)"), "a.{ps1,js,py}");
        assert_eq!(translate_extglob("test_*.py"), "test_*.py");
        assert_eq!(escape("we?rd[1]"), "we[?]rd[[]1[]]");
        let matcher = compile(&format!("{}.md", escape("we?rd"))).unwrap();
        assert!(matcher.is_match("we?rd.md"));
        assert!(!matcher.is_match("weXrd.md"));
    }

    #[test]
    fn test_prefixed_name() {
        assert_eq!(prefixed_name("Foo.yml", "playbook-"), "playbook-Foo.yml");
        assert_eq!(prefixed_name("playbook-Foo.yml", "playbook-"), "playbook-Foo.yml");
        assert_eq!(prefixed_name("Foo.yml", ""), "Foo.yml");
    }
}
