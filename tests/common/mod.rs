//! Shared helpers for integration tests
//!
//! `DarkSubjectBackend` stands in for a segmentation model: anything darker than mid
//! grey is foreground. Paired with white canvases carrying dark squares it drives the
//! whole pipeline without model files.

#![allow(dead_code)]

use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use ndarray::Array4;
use photoprep::{
    BackendFactory, BackendType, BatchJob, CatalogPublisher, CodeScanner, Detection,
    InferenceBackend, ModelInfo, ModelKind, ModelManager, OutputLayout, PreprocessingConfig,
    Region, RemovalSettings, Result,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub struct DarkSubjectBackend {
    kind: ModelKind,
    initialized: bool,
}

impl InferenceBackend for DarkSubjectBackend {
    fn initialize(&mut self, _settings: &RemovalSettings) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::ZERO))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let config = self.kind.preprocessing();
        let threshold = (0.5 - config.normalization_mean[0]) / config.normalization_std[0];
        let (batch, _, height, width) = input.dim();
        Ok(Array4::from_shape_fn((batch, 1, height, width), |(b, _, y, x)| {
            if input[[b, 0, y, x]] < threshold {
                1.0
            } else {
                0.0
            }
        }))
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        let [width, height] = self.kind.preprocessing().target_size;
        (1, 3, height as usize, width as usize)
    }

    fn get_preprocessing_config(&self) -> PreprocessingConfig {
        self.kind.preprocessing()
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        let (n, c, h, w) = self.input_shape();
        Ok(ModelInfo {
            name: self.kind.name().to_string(),
            size_bytes: 0,
            input_shape: (n, c, h, w),
            output_shape: (n, 1, h, w),
        })
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Factory handing out [`DarkSubjectBackend`]s and remembering which models were built
#[derive(Default)]
pub struct DarkSubjectFactory {
    pub created: Mutex<Vec<ModelKind>>,
}

impl BackendFactory for DarkSubjectFactory {
    fn create_backend(
        &self,
        _backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        let kind = model_manager.kind();
        self.created.lock().unwrap().push(kind);
        Ok(Box::new(DarkSubjectBackend {
            kind,
            initialized: false,
        }))
    }

    fn available_backends(&self) -> Vec<BackendType> {
        vec![BackendType::Onnx]
    }
}

/// Scanner returning one label per file, looked up by the image width
///
/// Integration images are generated with distinct widths so the scanner can tell
/// them apart without decoding anything.
#[derive(Default)]
pub struct WidthKeyedScanner {
    pub labels: Vec<(u32, String)>,
}

impl CodeScanner for WidthKeyedScanner {
    fn scan(&self, image: &GrayImage) -> Result<Vec<Detection>> {
        Ok(self
            .labels
            .iter()
            .filter(|(width, _)| *width == image.width())
            .map(|(_, payload)| Detection {
                region: Region {
                    left: 0,
                    top: 0,
                    width: 10,
                    height: 10,
                },
                payload: payload.as_bytes().to_vec(),
            })
            .collect())
    }
}

/// Publisher recording every identifier it is asked to publish
#[derive(Default)]
pub struct RecordingPublisher {
    pub identifiers: Mutex<Vec<String>>,
    next_id: AtomicUsize,
}

impl CatalogPublisher for RecordingPublisher {
    fn publish(&self, identifier: &str, _image: &DynamicImage) -> Result<i64> {
        self.identifiers.lock().unwrap().push(identifier.to_string());
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1)
    }
}

/// White canvas with solid black squares at the given `(x, y, size)` positions
pub fn product_shot(width: u32, height: u32, squares: &[(u32, u32, u32)]) -> DynamicImage {
    let mut image = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    for &(left, top, size) in squares {
        for y in top..(top + size).min(height) {
            for x in left..(left + size).min(width) {
                image.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
    }
    DynamicImage::ImageRgb8(image)
}

/// Scratch layout: a source card, four output dirs and a model dir under one temp root
pub struct Workspace {
    pub temp: TempDir,
    pub card: PathBuf,
    pub layout: OutputLayout,
    pub models: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let card = temp.path().join("EOS_DIGITAL");
        std::fs::create_dir_all(card.join("DCIM/100CANON")).unwrap();
        let layout = OutputLayout::under(&temp.path().join("eBay Pics"));
        let models = temp.path().join("models");
        Self {
            temp,
            card,
            layout,
            models,
        }
    }

    /// Write a JPEG onto the card
    pub fn add_photo(&self, relative: &str, image: &DynamicImage) -> PathBuf {
        let path = self.card.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        image.to_rgb8().save_with_format(&path, image::ImageFormat::Jpeg).unwrap();
        path
    }

    pub fn job(&self) -> photoprep::BatchJobBuilder {
        BatchJob::builder(&self.card)
            .layout(self.layout.clone())
            .workers(2)
            .removal(RemovalSettings {
                model_dir: Some(self.models.clone()),
                allow_download: false,
                ..RemovalSettings::default()
            })
    }
}

pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(std::result::Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
