//! Collision-free output naming

use crate::error::{PhotoPrepError, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

fn split_name(file_name: &str) -> (&str, Option<&str>) {
    let path = Path::new(file_name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(file_name);
    let extension = path.extension().and_then(|s| s.to_str());
    (stem, extension)
}

fn candidate(directory: &Path, stem: &str, extension: Option<&str>, counter: usize) -> PathBuf {
    let stem = if counter == 0 {
        stem.to_string()
    } else {
        format!("{stem}_{counter}")
    };
    match extension {
        Some(ext) => directory.join(format!("{stem}.{ext}")),
        None => directory.join(stem),
    }
}

/// First of `stem.ext`, `stem_1.ext`, `stem_2.ext`, … in `directory` for which `taken` is false
pub fn first_free(directory: &Path, file_name: &str, taken: impl Fn(&Path) -> bool) -> PathBuf {
    let (stem, extension) = split_name(file_name);
    (0..)
        .map(|counter| candidate(directory, stem, extension, counter))
        .find(|path| !taken(path))
        .unwrap_or_else(|| directory.join(file_name))
}

/// A path in `directory` that does not exist at the time of the check
///
/// Racy when several threads resolve the same stem; use [`OutputNamer`] for that.
#[must_use]
pub fn unique_path(directory: &Path, file_name: &str) -> PathBuf {
    first_free(directory, file_name, Path::exists)
}

/// Hands out output paths that are unique across every worker of a batch
///
/// A path counts as taken when it exists on disk or was handed out earlier, so two
/// workers can never be given the same name even before either has written.
#[derive(Debug, Default)]
pub struct OutputNamer {
    reserved: Mutex<HashSet<PathBuf>>,
}

impl OutputNamer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve and reserve a free path for `file_name` in `directory`
    pub fn resolve(&self, directory: &Path, file_name: &str) -> Result<PathBuf> {
        let mut reserved = self
            .reserved
            .lock()
            .map_err(|_| PhotoPrepError::internal("Output name registry poisoned"))?;
        let path = first_free(directory, file_name, |p| reserved.contains(p) || p.exists());
        reserved.insert(path.clone());
        Ok(path)
    }
}
