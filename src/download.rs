//! Model downloading
//!
//! Missing models are fetched once, before any worker starts, into a temporary file
//! inside the cache directory and then atomically renamed into place. A half-written
//! download therefore never looks like a cached model.

use crate::cache::ModelCache;
use crate::error::{PhotoPrepError, Result};
use crate::models::ModelKind;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;

const CHUNK_SIZE: usize = 64 * 1024;

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }

    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {
                let _ = len;
            },
        }
    }

    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {
                let _ = pos;
            },
        }
    }

    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }
}

/// Model downloader
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

impl ModelDownloader {
    pub fn new(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .user_agent(concat!("photoprep/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                PhotoPrepError::provisioning(format!("Failed to create HTTP client: {e}"))
            })?;
        Ok(Self { client, cache })
    }

    /// Return the path of a cached model, downloading it first if needed
    pub fn ensure_model(&self, kind: ModelKind, show_progress: bool) -> Result<PathBuf> {
        if self.cache.is_model_cached(kind) {
            log::debug!("Model {kind} already cached");
            return Ok(self.cache.model_path(kind));
        }
        self.download_model(kind, show_progress)
    }

    /// Download a model into the cache, replacing any previous copy
    pub fn download_model(&self, kind: ModelKind, show_progress: bool) -> Result<PathBuf> {
        let url = kind.download_url();
        let destination = self.cache.model_path(kind);
        tracing::info!(model = %kind, url = %url, "📦 Downloading model");

        let mut response = self
            .client
            .get(&url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(|e| {
                PhotoPrepError::provisioning(format!("Failed to download model '{kind}': {e}"))
            })?;

        let progress = if show_progress {
            Self::create_progress_indicator()
        } else {
            ProgressIndicator::NoOp
        };
        if let Some(total) = response.content_length() {
            progress.set_length(total);
        }
        progress.set_message(kind.file_name());

        let mut temp_file = tempfile::NamedTempFile::new_in(self.cache.get_current_cache_dir())
            .map_err(|e| {
                PhotoPrepError::file_io_error(
                    "create temporary file in",
                    self.cache.get_current_cache_dir(),
                    &e,
                )
            })?;

        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut downloaded: u64 = 0;
        loop {
            let read = response.read(&mut buffer).map_err(|e| {
                PhotoPrepError::provisioning(format!("Download of '{kind}' interrupted: {e}"))
            })?;
            if read == 0 {
                break;
            }
            let chunk = buffer.get(..read).unwrap_or_default();
            temp_file
                .write_all(chunk)
                .map_err(|e| PhotoPrepError::file_io_error("write", temp_file.path(), &e))?;
            downloaded += read as u64;
            progress.set_position(downloaded);
        }

        if downloaded == 0 {
            return Err(PhotoPrepError::provisioning(format!(
                "Download of '{kind}' returned an empty body"
            )));
        }

        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| PhotoPrepError::file_io_error("flush", temp_file.path(), &e))?;
        temp_file
            .persist(&destination)
            .map_err(|e| PhotoPrepError::file_io_error("persist model to", &destination, &e.error))?;

        progress.finish_with_message(format!("{kind} ready"));
        log::debug!(
            "Downloaded {} bytes to {}",
            downloaded,
            destination.display()
        );
        Ok(destination)
    }

    fn create_progress_indicator() -> ProgressIndicator {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(0);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            ProgressIndicator::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            ProgressIndicator::NoOp
        }
    }

    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }
}
