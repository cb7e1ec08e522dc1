//! Model cache management
//!
//! Segmentation models are stored as flat `<name>.onnx` files in a single directory,
//! `$U2NET_HOME` when set and `~/.u2net` otherwise, so caches shared with other
//! tools using the same layout are picked up as-is.

use crate::error::{PhotoPrepError, Result};
use crate::models::ModelKind;
use std::fs;
use std::path::{Path, PathBuf};

/// Information about a cached model
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    pub kind: ModelKind,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Open the default cache directory, creating it if needed
    pub fn new() -> Result<Self> {
        let cache_dir = Self::get_cache_dir()?;
        Self::with_custom_cache_dir(&cache_dir)
    }

    /// Open a cache rooted at an explicit directory, creating it if needed
    pub fn with_custom_cache_dir(cache_dir: &Path) -> Result<Self> {
        if !cache_dir.exists() {
            fs::create_dir_all(cache_dir).map_err(|e| {
                PhotoPrepError::file_io_error("create model directory", cache_dir, &e)
            })?;
        }

        Ok(Self {
            cache_dir: cache_dir.to_path_buf(),
        })
    }

    fn get_cache_dir() -> Result<PathBuf> {
        if let Ok(home_override) = std::env::var("U2NET_HOME") {
            if !home_override.is_empty() {
                return Ok(PathBuf::from(home_override));
            }
        }

        Ok(dirs::home_dir()
            .ok_or_else(|| {
                PhotoPrepError::provisioning(
                    "Failed to determine home directory. Set U2NET_HOME to a model directory.",
                )
            })?
            .join(".u2net"))
    }

    #[must_use]
    pub fn model_path(&self, kind: ModelKind) -> PathBuf {
        self.cache_dir.join(kind.file_name())
    }

    /// A model counts as cached when its file exists and is not empty
    #[must_use]
    pub fn is_model_cached(&self, kind: ModelKind) -> bool {
        fs::metadata(self.model_path(kind))
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    /// List catalogued models present in the cache, in catalogue order
    pub fn scan_cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();
        for kind in ModelKind::ALL {
            let path = self.model_path(kind);
            match fs::metadata(&path) {
                Ok(meta) if meta.is_file() && meta.len() > 0 => models.push(CachedModelInfo {
                    kind,
                    path,
                    size_bytes: meta.len(),
                }),
                Ok(_) => {},
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                Err(e) => return Err(PhotoPrepError::file_io_error("inspect model", &path, &e)),
            }
        }
        Ok(models)
    }

    /// Remove every catalogued model file, returning the names removed
    pub fn clear_all_models(&self) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for cached in self.scan_cached_models()? {
            fs::remove_file(&cached.path)
                .map_err(|e| PhotoPrepError::file_io_error("remove model", &cached.path, &e))?;
            log::info!("Removed cached model {}", cached.kind);
            removed.push(cached.kind.name().to_string());
        }
        Ok(removed)
    }

    #[must_use]
    pub fn get_current_cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }
}

/// Human readable byte count
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS.get(unit).copied().unwrap_or("GB"))
    }
}
