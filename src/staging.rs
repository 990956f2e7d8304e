//! Atomic file output
//!
//! Outputs are written to a temporary sibling of their destination and
//! renamed into place on [`StagedFile::commit`]. Dropping an uncommitted
//! [`StagedFile`] unlinks the temporary.

use crate::error::{ContentError, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// A fully written output waiting to be renamed over its destination
#[derive(Debug)]
pub struct StagedFile {
    temp: NamedTempFile,
    dest: PathBuf,
}

impl StagedFile {
    /// Stage `contents` for `dest`
    pub fn new(dest: &Path, contents: &[u8]) -> Result<Self> {
        let mut temp = temp_sibling(dest)?;
        temp.write_all(contents)
            .and_then(|_| temp.flush())
            .map_err(|e| ContentError::serialize(dest, e))?;
        Ok(Self {
            temp,
            dest: dest.to_path_buf(),
        })
    }

    /// Stage a byte-for-byte copy of `src` for `dest`
    pub fn copy_of(src: &Path, dest: &Path) -> Result<Self> {
        let mut temp = temp_sibling(dest)?;
        let mut reader = fs::File::open(src).map_err(|e| ContentError::serialize(dest, e))?;
        std::io::copy(&mut reader, &mut temp)
            .and_then(|_| temp.flush())
            .map_err(|e| ContentError::serialize(dest, e))?;
        Ok(Self {
            temp,
            dest: dest.to_path_buf(),
        })
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Rename the temporary over the destination
    pub fn commit(self) -> Result<PathBuf> {
        let dest = self.dest;
        self.temp
            .persist(&dest)
            .map_err(|e| ContentError::serialize(&dest, e.error))?;
        Ok(dest)
    }
}

/// Write `contents` to `dest` atomically
pub fn write_atomic(dest: &Path, contents: &[u8]) -> Result<()> {
    StagedFile::new(dest, contents)?.commit().map(|_| ())
}

/// Copy `src` to `dest` atomically
pub fn copy_atomic(src: &Path, dest: &Path) -> Result<()> {
    StagedFile::copy_of(src, dest)?.commit().map(|_| ())
}

fn temp_sibling(dest: &Path) -> Result<NamedTempFile> {
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    tempfile::Builder::new()
        .prefix(".staging-")
        .tempfile_in(dir)
        .map_err(|e| ContentError::serialize(dest, e))
}
