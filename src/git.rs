//! Version control status and content root discovery

use crate::error::Result;
use git2::{Repository, Status, StatusOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use strum::{Display, EnumString};
use tracing::{debug, info};

/// Status of a file relative to the last commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(Display, EnumString, Serialize, Deserialize)]
pub enum GitStatus {
    Added,
    Modified,
    Renamed,
    Deleted,
    #[default]
    Unchanged,
}

impl GitStatus {
    fn from_flags(status: Status) -> Self {
        if status.intersects(Status::INDEX_RENAMED | Status::WT_RENAMED) {
            Self::Renamed
        } else if status.intersects(Status::INDEX_NEW | Status::WT_NEW) {
            Self::Added
        } else if status.intersects(Status::INDEX_DELETED | Status::WT_DELETED) {
            Self::Deleted
        } else if status.intersects(
            Status::INDEX_MODIFIED
                | Status::WT_MODIFIED
                | Status::INDEX_TYPECHANGE
                | Status::WT_TYPECHANGE,
        ) {
            Self::Modified
        } else {
            Self::Unchanged
        }
    }
}

/// Working tree status of every changed file in a repository
#[derive(Debug, Default)]
pub struct GitStatuses {
    workdir: PathBuf,
    by_path: HashMap<PathBuf, GitStatus>,
}

impl GitStatuses {
    /// Read the status of the repository enclosing `path`
    pub fn collect(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path)?;
        let workdir = repo
            .workdir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| path.to_path_buf());
        let workdir = fs::canonicalize(&workdir).unwrap_or(workdir);

        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .renames_head_to_index(true);

        let mut by_path = HashMap::new();
        for entry in repo.statuses(Some(&mut options))?.iter() {
            let status = GitStatus::from_flags(entry.status());
            if status == GitStatus::Unchanged {
                continue;
            }
            if let Some(rel) = entry.path() {
                by_path.insert(PathBuf::from(rel), status);
            }
        }
        debug!(workdir = %workdir.display(), changed = by_path.len(), "Collected git status");
        Ok(Self { workdir, by_path })
    }

    /// Status of `path`: absolute, relative to the work tree, or relative
    /// to the current directory
    pub fn status_of(&self, path: &Path) -> GitStatus {
        match std::env::current_dir() {
            Ok(cwd) => self.status_from(path, &cwd),
            Err(_) => self.by_path.get(path).copied().unwrap_or_default(),
        }
    }

    fn status_from(&self, path: &Path, cwd: &Path) -> GitStatus {
        if path.is_relative() {
            if let Some(status) = self.by_path.get(path) {
                return *status;
            }
        }
        let absolute = cwd.join(path);
        let absolute = fs::canonicalize(&absolute).unwrap_or(absolute);
        absolute
            .strip_prefix(&self.workdir)
            .ok()
            .and_then(|rel| self.by_path.get(rel))
            .copied()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

/// How a [`ContentRoot`] was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootSource {
    /// Explicit `content_path` setting
    Configured,
    /// Parent of an enclosing `Packs` directory
    PacksAncestor,
    /// Work tree of the enclosing git repository
    Repository,
    /// Nothing matched, using the current directory
    Fallback,
}

/// Root of a content repository, the directory holding `Packs/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRoot {
    pub path: PathBuf,
    pub source: RootSource,
}

impl ContentRoot {
    /// Locate the content root for `start`.
    ///
    /// `content_path` wins when set. Otherwise an enclosing `Packs` folder,
    /// then the enclosing repository are tried before falling back to `.`.
    pub fn discover(start: &Path, content_path: Option<&Path>, ignore_warning: bool) -> Self {
        if let Some(path) = content_path {
            debug!(path = %path.display(), "Using configured content path");
            return Self {
                path: path.to_path_buf(),
                source: RootSource::Configured,
            };
        }

        if let Some(path) = packs_ancestor(start) {
            return Self {
                path,
                source: RootSource::PacksAncestor,
            };
        }

        if let Ok(repo) = Repository::discover(start) {
            if let Some(workdir) = repo.workdir() {
                return Self {
                    path: workdir.to_path_buf(),
                    source: RootSource::Repository,
                };
            }
        }

        if !ignore_warning {
            info!("Not inside a content repository, using the current directory");
        }
        Self {
            path: PathBuf::from("."),
            source: RootSource::Fallback,
        }
    }

    /// `<root>/Packs`
    pub fn packs_dir(&self) -> PathBuf {
        self.path.join("Packs")
    }

    /// `<root>/Packs/<name>`
    pub fn pack_path(&self, name: &str) -> PathBuf {
        self.packs_dir().join(name)
    }
}

fn packs_ancestor(start: &Path) -> Option<PathBuf> {
    let absolute = if start.is_absolute() {
        start.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(start)
    };
    absolute
        .ancestors()
        .find(|dir| dir.components().last() == Some(Component::Normal("Packs".as_ref())))
        .and_then(Path::parent)
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_status_flags() {
        assert_eq!(GitStatus::from_flags(Status::WT_NEW), GitStatus::Added);
        assert_eq!(GitStatus::from_flags(Status::INDEX_MODIFIED), GitStatus::Modified);
        assert_eq!(
            GitStatus::from_flags(Status::INDEX_RENAMED | Status::INDEX_MODIFIED),
            GitStatus::Renamed
        );
        assert_eq!(GitStatus::from_flags(Status::WT_DELETED), GitStatus::Deleted);
        assert_eq!(GitStatus::from_flags(Status::CURRENT), GitStatus::Unchanged);
        assert_eq!(GitStatus::Added.to_string(), "Added");
    }

    #[test]
    fn test_collect_untracked() {
        let dir = tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        fs::create_dir_all(dir.path().join("Packs/Acme")).unwrap();
        fs::write(dir.path().join("Packs/Acme/pack_metadata.json"), "{}").unwrap();

        let statuses = GitStatuses::collect(dir.path()).unwrap();
        assert_eq!(
            statuses.status_of(Path::new("Packs/Acme/pack_metadata.json")),
            GitStatus::Added
        );
        assert_eq!(
            statuses.status_of(Path::new("Packs/Acme/README.md")),
            GitStatus::Unchanged
        );
    }

    #[test]
    fn test_status_of_absolute_and_cwd_relative_paths() {
        let dir = tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        fs::create_dir_all(dir.path().join("Packs/Acme")).unwrap();
        fs::write(dir.path().join("Packs/Acme/pack_metadata.json"), "{}").unwrap();

        let statuses = GitStatuses::collect(dir.path()).unwrap();
        let absolute = dir.path().join("Packs/Acme/pack_metadata.json");
        assert_eq!(statuses.status_of(&absolute), GitStatus::Added);

        let packs = dir.path().join("Packs");
        assert_eq!(
            statuses.status_from(Path::new("Acme/pack_metadata.json"), &packs),
            GitStatus::Added
        );
        assert_eq!(
            statuses.status_from(Path::new("./Acme/pack_metadata.json"), &packs),
            GitStatus::Added
        );
        assert_eq!(
            statuses.status_from(Path::new("Acme/README.md"), &packs),
            GitStatus::Unchanged
        );
    }

    #[test]
    fn test_discover_configured_and_packs() {
        let dir = tempdir().unwrap();
        let configured = ContentRoot::discover(dir.path(), Some(Path::new("/content")), true);
        assert_eq!(configured.source, RootSource::Configured);
        assert_eq!(configured.pack_path("Acme"), PathBuf::from("/content/Packs/Acme"));

        let item_dir = dir.path().join("Packs/Acme/Integrations");
        fs::create_dir_all(&item_dir).unwrap();
        let found = ContentRoot::discover(&item_dir, None, true);
        assert_eq!(found.source, RootSource::PacksAncestor);
        assert_eq!(found.path, dir.path());
    }
}
