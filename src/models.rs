//! Segmentation model catalogue and loading

use crate::cache::ModelCache;
use crate::error::{PhotoPrepError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

/// Preprocessing parameters for a segmentation model
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    /// Model input size as `[width, height]`
    pub target_size: [u32; 2],
    /// Per-channel mean subtracted after scaling to 0..1
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation
    pub normalization_std: [f32; 3],
}

/// Model information and metadata
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub size_bytes: usize,
    pub input_shape: (usize, usize, usize, usize), // NCHW format
    pub output_shape: (usize, usize, usize, usize),
}

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

const RELEASE_BASE_URL: &str = "https://github.com/danielgatis/rembg/releases/download/v0.0.0";

/// Named segmentation models understood by the background remover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelKind {
    /// General purpose model that keeps small detached parts (screws, cables)
    #[serde(rename = "u2net")]
    U2Net,
    /// Lightweight variant of `U2Net`
    #[serde(rename = "u2netp")]
    U2NetP,
    /// `U2Net` trained for human segmentation
    #[serde(rename = "u2net_human_seg")]
    U2NetHumanSeg,
    /// Compressed `U2Net`
    #[serde(rename = "silueta")]
    Silueta,
    /// Clean single-subject cutout; drops everything but the main object
    #[serde(rename = "isnet-general-use")]
    IsNetGeneralUse,
}

impl ModelKind {
    pub const ALL: [ModelKind; 5] = [
        ModelKind::U2Net,
        ModelKind::U2NetP,
        ModelKind::U2NetHumanSeg,
        ModelKind::Silueta,
        ModelKind::IsNetGeneralUse,
    ];

    /// Model picked by `auto` for shots containing several sizable objects
    pub const DETAIL: ModelKind = ModelKind::U2Net;

    /// Model picked by `auto` for single-subject shots, and the default
    pub const SINGLE_SUBJECT: ModelKind = ModelKind::IsNetGeneralUse;

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::U2Net => "u2net",
            Self::U2NetP => "u2netp",
            Self::U2NetHumanSeg => "u2net_human_seg",
            Self::Silueta => "silueta",
            Self::IsNetGeneralUse => "isnet-general-use",
        }
    }

    #[must_use]
    pub fn file_name(self) -> String {
        format!("{}.onnx", self.name())
    }

    #[must_use]
    pub fn download_url(self) -> String {
        format!("{RELEASE_BASE_URL}/{}", self.file_name())
    }

    #[must_use]
    pub fn preprocessing(self) -> PreprocessingConfig {
        match self {
            Self::U2Net | Self::U2NetP | Self::U2NetHumanSeg | Self::Silueta => {
                PreprocessingConfig {
                    target_size: [320, 320],
                    normalization_mean: IMAGENET_MEAN,
                    normalization_std: IMAGENET_STD,
                }
            },
            Self::IsNetGeneralUse => PreprocessingConfig {
                target_size: [1024, 1024],
                normalization_mean: [0.5, 0.5, 0.5],
                normalization_std: [1.0, 1.0, 1.0],
            },
        }
    }

    #[must_use]
    pub fn known_names() -> String {
        Self::ALL
            .iter()
            .map(|kind| kind.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = PhotoPrepError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| {
                PhotoPrepError::invalid_input(format!(
                    "Unknown model '{s}'. Available models: {}, auto",
                    Self::known_names()
                ))
            })
    }
}

/// Loads the weights of one catalogued model from the model cache
#[derive(Debug, Clone)]
pub struct ModelManager {
    kind: ModelKind,
    model_path: PathBuf,
}

impl ModelManager {
    #[must_use]
    pub fn new(kind: ModelKind, cache: &ModelCache) -> Self {
        Self {
            kind,
            model_path: cache.model_path(kind),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    #[must_use]
    pub fn model_path(&self) -> &PathBuf {
        &self.model_path
    }

    /// Read the ONNX weights from disk
    ///
    /// A missing file is a provisioning problem, not a per-image one.
    pub fn load_model(&self) -> Result<Vec<u8>> {
        if !self.model_path.exists() {
            return Err(PhotoPrepError::provisioning(format!(
                "Model '{}' not found at {}. Run with downloads enabled or place the file there.",
                self.kind,
                self.model_path.display()
            )));
        }
        fs::read(&self.model_path)
            .map_err(|e| PhotoPrepError::file_io_error("read model", &self.model_path, &e))
    }

    #[must_use]
    pub fn get_preprocessing_config(&self) -> PreprocessingConfig {
        self.kind.preprocessing()
    }

    pub fn get_info(&self) -> Result<ModelInfo> {
        let size_bytes = fs::metadata(&self.model_path)
            .map(|m| m.len() as usize)
            .unwrap_or(0);
        let [width, height] = self.kind.preprocessing().target_size;
        let (width, height) = (width as usize, height as usize);
        Ok(ModelInfo {
            name: self.kind.name().to_string(),
            size_bytes,
            input_shape: (1, 3, height, width),
            output_shape: (1, 1, height, width),
        })
    }
}
