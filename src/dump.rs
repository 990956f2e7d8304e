//! Packaging: materialising content items into an output directory
//!
//! A dump writes the primary file (copied, re-rendered or unified) and then
//! its changelog and readme. All outputs of one item are staged first and
//! committed primary first; if a commit fails the outputs already committed
//! for that item are rolled back.

use crate::deadline::Deadline;
use crate::error::{ContentError, ErrorKind, Result};
use crate::item::ContentItem;
use crate::kind::ContentKind;
use crate::pack::Pack;
use crate::staging::StagedFile;
use crate::unify::{output_name, unified_document, UnifyOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What a dump writes besides the primary file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpOptions {
    pub include_changelog: bool,
    pub include_readme: bool,
    /// Unify code-bearing items that still have a separate code file
    pub unify: bool,
    /// Collect per-item failures in pack dumps instead of stopping
    pub batch: bool,
    pub unify_options: UnifyOptions,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            include_changelog: true,
            include_readme: true,
            unify: true,
            batch: false,
            unify_options: UnifyOptions::default(),
        }
    }
}

/// An item that failed during a batch dump
#[derive(Debug)]
pub struct DumpFailure {
    pub path: PathBuf,
    pub error: ContentError,
}

/// Outcome of [`DumpEngine::dump_pack`]
#[derive(Debug, Default)]
pub struct DumpReport {
    pub created: Vec<PathBuf>,
    pub failures: Vec<DumpFailure>,
}

impl DumpReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Writes content items to output directories
#[derive(Debug, Clone, Default)]
pub struct DumpEngine {
    options: DumpOptions,
}

impl DumpEngine {
    pub fn new(options: DumpOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DumpOptions {
        &self.options
    }

    /// Dump one item into `dest_dir`, returning the files written, primary
    /// first.
    ///
    /// On failure nothing written for this item remains and files it would
    /// have replaced are restored.
    pub fn dump(&self, item: &ContentItem, dest_dir: &Path) -> Result<Vec<PathBuf>> {
        self.dump_with(item, dest_dir, &self.options.unify_options)
    }

    fn dump_with(
        &self,
        item: &ContentItem,
        dest_dir: &Path,
        unify_options: &UnifyOptions,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dest_dir)?;
        let out_name = output_name(item)?;
        let dest = dest_dir.join(&out_name);

        let primary = if self.options.unify && item.kind().is_code_bearing() && !item.is_unified() {
            debug!(path = %item.path().display(), "Unifying");
            let doc = unified_document(item, unify_options)?;
            StagedFile::new(&dest, doc.render()?.as_bytes())?
        } else if item.is_dirty() {
            StagedFile::new(&dest, item.document().render()?.as_bytes())?
        } else {
            StagedFile::copy_of(item.path(), &dest)?
        };

        let out_stem = Path::new(&out_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&out_name)
            .to_string();
        let mut staged = vec![primary];
        if self.options.include_changelog {
            if let Some(changelog) = item.changelog() {
                let dest = dest_dir.join(format!("{out_stem}_CHANGELOG.md"));
                staged.push(StagedFile::copy_of(&changelog, &dest)?);
            }
        }
        if self.options.include_readme {
            if let Some(readme) = item.readme() {
                let dest = dest_dir.join(format!("{out_stem}_README.md"));
                staged.push(StagedFile::copy_of(&readme, &dest)?);
            }
        }

        let written = commit_all(staged)?;
        info!(src = %item.path().display(), dest = %dest.display(), files = written.len(), "Dumped");
        Ok(written)
    }

    /// Dump a whole pack to `dest_root/<pack name>/`.
    ///
    /// Items are written under their kind folder with the kind's file
    /// prefix. The deadline is checked between items and aborts the run.
    pub fn dump_pack(&self, pack: &Pack, dest_root: &Path, deadline: &Deadline) -> Result<DumpReport> {
        let pack_dest = dest_root.join(pack.name());
        fs::create_dir_all(&pack_dest)?;
        let mut report = DumpReport::default();

        let mut unify_options = self.options.unify_options.clone();
        if let Ok(doc) = pack.metadata_document() {
            let dest = pack_dest.join(crate::pack::PACK_METADATA);
            doc.copy_to(&dest)?;
            report.created.push(dest);
            if unify_options.pack_version.is_none() {
                unify_options.pack_version = doc.get_str("currentVersion")?.map(str::to_string);
            }
        } else {
            warn!(pack = %pack.name(), "Pack has no metadata");
        }
        if self.options.include_readme {
            if let Some(readme) = pack.readme() {
                let dest = pack_dest.join("README.md");
                crate::staging::copy_atomic(&readme, &dest)?;
                report.created.push(dest);
            }
        }

        for kind in ContentKind::content_items() {
            let items = match pack.items(kind) {
                Ok(items) => items,
                Err(error) => {
                    self.record(&mut report, pack.path().join(kind.pack_folder()), error)?;
                    continue;
                }
            };
            let folder = pack_dest.join(kind.pack_folder());
            for mut item in items {
                deadline.check()?;
                item.set_prefix(kind.file_prefix());
                match self.dump_with(&item, &folder, &unify_options) {
                    Ok(written) => report.created.extend(written),
                    Err(error) => self.record(&mut report, item.path().to_path_buf(), error)?,
                }
            }
        }

        info!(
            pack = %pack.name(),
            created = report.created.len(),
            failed = report.failures.len(),
            "Pack dumped"
        );
        Ok(report)
    }

    /// Keep going in batch mode, otherwise surface the error
    fn record(&self, report: &mut DumpReport, path: PathBuf, error: ContentError) -> Result<()> {
        if !self.options.batch || error.kind() == ErrorKind::Internal {
            return Err(error);
        }
        warn!(path = %path.display(), error = %error, "Dump failed, continuing");
        report.failures.push(DumpFailure { path, error });
        Ok(())
    }
}

/// Commit staged files in order. A failure restores every destination
/// already committed to its previous state.
fn commit_all(staged: Vec<StagedFile>) -> Result<Vec<PathBuf>> {
    let mut committed: Vec<(PathBuf, Option<Vec<u8>>)> = Vec::new();
    for file in staged {
        let previous = match previous_bytes(file.dest()) {
            Ok(previous) => previous,
            Err(error) => {
                rollback(&committed);
                return Err(error);
            }
        };
        match file.commit() {
            Ok(dest) => committed.push((dest, previous)),
            Err(error) => {
                rollback(&committed);
                return Err(error);
            }
        }
    }
    Ok(committed.into_iter().map(|(dest, _)| dest).collect())
}

/// Current contents of `dest`, `None` when nothing is there yet
fn previous_bytes(dest: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(dest) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn rollback(committed: &[(PathBuf, Option<Vec<u8>>)]) {
    for (dest, previous) in committed.iter().rev() {
        let restored = match previous {
            Some(bytes) => crate::staging::write_atomic(dest, bytes),
            None => fs::remove_file(dest).map_err(ContentError::from),
        };
        if let Err(e) = restored {
            warn!(path = %dest.display(), error = %e, "Rollback failed");
        }
    }
}
