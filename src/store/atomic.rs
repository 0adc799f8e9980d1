//! All-or-nothing replacement of a group of files
//!
//! Every file of a run is first written to a temporary file in its target
//! directory and fsynced. Only when all of them are staged does [`Staging::commit`]
//! rename them over their targets. Dropping a [`Staging`] without committing
//! deletes the temporaries and leaves every target untouched.

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::DataIntegrityError;

struct StagedFile {
    target: PathBuf,
    temp: NamedTempFile,
}

/// A set of fully written, not yet visible file replacements
#[derive(Default)]
pub struct Staging {
    files: Vec<StagedFile>,
}

fn parent_dir(target: &Path) -> &Path {
    match target.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

fn write_failed(path: &Path) -> impl FnOnce(std::io::Error) -> DataIntegrityError + '_ {
    move |source| DataIntegrityError::WriteFailed {
        path: path.to_path_buf(),
        source,
    }
}

impl Staging {
    /// Empty staging area
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `contents` to a temporary file next to `target`
    pub fn stage(&mut self, target: &Path, contents: &[u8]) -> Result<(), DataIntegrityError> {
        let dir = parent_dir(target);
        std::fs::create_dir_all(dir).map_err(write_failed(target))?;

        let mut temp = NamedTempFile::new_in(dir).map_err(write_failed(target))?;
        temp.write_all(contents).map_err(write_failed(target))?;
        temp.as_file().sync_all().map_err(write_failed(target))?;

        tracing::debug!(
            target = %target.display(),
            bytes = contents.len(),
            "Staged file"
        );
        self.files.push(StagedFile {
            target: target.to_path_buf(),
            temp,
        });
        Ok(())
    }

    /// Targets staged so far, in commit order
    #[cfg(test)]
    pub(crate) fn targets(&self) -> Vec<&Path> {
        self.files.iter().map(|f| f.target.as_path()).collect()
    }

    /// Number of staged files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether nothing is staged
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Rename every staged file over its target, in staging order
    pub fn commit(self) -> Result<Vec<PathBuf>, DataIntegrityError> {
        let mut written = Vec::with_capacity(self.files.len());
        for StagedFile { target, temp } in self.files {
            temp.persist(&target).map_err(|e| DataIntegrityError::WriteFailed {
                path: target.clone(),
                source: e.error,
            })?;
            sync_dir(parent_dir(&target));
            written.push(target);
        }
        Ok(written)
    }
}

/// Flush the directory entry of a rename; not supported everywhere, so failures are ignored
fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    if let Ok(handle) = std::fs::File::open(dir) {
        let _ = handle.sync_all();
    }
    #[cfg(not(unix))]
    let _ = dir;
}
