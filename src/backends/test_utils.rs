//! Test utilities and mock backends
//!
//! The mock segments by brightness: a pixel is foreground when its red channel is
//! darker than mid grey. That is enough to drive the whole pipeline on synthetic
//! images without model files or a native runtime.

use crate::{
    config::{BackendType, RemovalSettings},
    error::{PhotoPrepError, Result},
    inference::InferenceBackend,
    models::{ModelInfo, ModelKind, ModelManager, PreprocessingConfig},
    processor::BackendFactory,
};
use image::{DynamicImage, Rgb, RgbImage};
use ndarray::Array4;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock inference backend for one model
#[derive(Debug, Clone)]
pub struct MockBackend {
    kind: ModelKind,
    initialized: bool,
    /// Call history for verification in tests
    call_history: Arc<Mutex<Vec<String>>>,
    should_fail_init: bool,
    should_fail_inference: bool,
}

impl MockBackend {
    #[must_use]
    pub fn new(kind: ModelKind) -> Self {
        Self {
            kind,
            initialized: false,
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail_init: false,
            should_fail_inference: false,
        }
    }

    #[must_use]
    pub fn new_failing_init(kind: ModelKind) -> Self {
        Self {
            should_fail_init: true,
            ..Self::new(kind)
        }
    }

    #[must_use]
    pub fn new_failing_inference(kind: ModelKind) -> Self {
        Self {
            should_fail_inference: true,
            ..Self::new(kind)
        }
    }

    #[must_use]
    pub fn with_history(mut self, history: Arc<Mutex<Vec<String>>>) -> Self {
        self.call_history = history;
        self
    }

    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(format!("{}:{method}", self.kind));
        }
    }

    /// Foreground wherever the normalised red channel sits below mid grey
    fn generate_mock_output(&self, input: &Array4<f32>) -> Array4<f32> {
        let config = self.kind.preprocessing();
        let threshold = (0.5 - config.normalization_mean[0]) / config.normalization_std[0];
        let (batch, _, height, width) = input.dim();

        let mut output = Array4::<f32>::zeros((batch, 1, height, width));
        for b in 0..batch {
            for y in 0..height {
                for x in 0..width {
                    if input[[b, 0, y, x]] < threshold {
                        output[[b, 0, y, x]] = 1.0;
                    }
                }
            }
        }
        output
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _settings: &RemovalSettings) -> Result<Option<Duration>> {
        self.record_call("initialize");
        if self.should_fail_init {
            return Err(PhotoPrepError::model("Mock backend initialization failed"));
        }
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(5)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.record_call("infer");
        if !self.initialized {
            return Err(PhotoPrepError::internal("Mock backend not initialized"));
        }
        if self.should_fail_inference {
            return Err(PhotoPrepError::inference("Mock backend inference failed"));
        }
        Ok(self.generate_mock_output(input))
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
            size_bytes: 1024,
            input_shape: (n, c, h, w),
            output_shape: (n, 1, h, w),
        })
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Factory producing [`MockBackend`]s that share one call history
#[derive(Debug, Default)]
pub struct MockBackendFactory {
    history: Arc<Mutex<Vec<String>>>,
    fail_creation: bool,
    fail_inference: bool,
}

impl MockBackendFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new_creation_failing() -> Self {
        Self {
            fail_creation: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn new_failing_inference() -> Self {
        Self {
            fail_inference: true,
            ..Self::default()
        }
    }

    pub fn history(&self) -> Vec<String> {
        self.history.lock().unwrap().clone()
    }
}

impl BackendFactory for MockBackendFactory {
    fn create_backend(
        &self,
        _backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        if self.fail_creation {
            return Err(PhotoPrepError::provisioning("Mock backend creation failed"));
        }
        let kind = model_manager.kind();
        let backend = if self.fail_inference {
            MockBackend::new_failing_inference(kind)
        } else {
            MockBackend::new(kind)
        };
        Ok(Box::new(backend.with_history(Arc::clone(&self.history))))
    }

    fn available_backends(&self) -> Vec<BackendType> {
        vec![BackendType::Onnx, BackendType::Tract]
    }
}

/// White canvas with solid black squares at the given `(x, y, size)` positions
pub fn create_test_image(width: u32, height: u32, squares: &[(u32, u32, u32)]) -> DynamicImage {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_backend_lifecycle() {
        let mut backend = MockBackend::new(ModelKind::U2Net);
        assert!(backend.infer(&Array4::zeros((1, 3, 4, 4))).is_err());

        backend.initialize(&RemovalSettings::default()).unwrap();
        let output = backend.infer(&Array4::from_elem((1, 3, 4, 4), -2.0)).unwrap();
        assert_eq!(output.dim(), (1, 1, 4, 4));
        assert!(output.iter().all(|&v| (v - 1.0).abs() < f32::EPSILON));

        let history = backend.get_call_history();
        assert_eq!(
            history,
            vec!["u2net:infer", "u2net:initialize", "u2net:infer"]
        );
    }

    #[test]
    fn test_mock_backend_failures() {
        let mut failing = MockBackend::new_failing_init(ModelKind::U2Net);
        assert!(failing.initialize(&RemovalSettings::default()).is_err());

        let mut failing = MockBackend::new_failing_inference(ModelKind::U2Net);
        failing.initialize(&RemovalSettings::default()).unwrap();
        assert!(matches!(
            failing.infer(&Array4::zeros((1, 3, 2, 2))),
            Err(PhotoPrepError::Inference(_))
        ));
    }

    #[test]
    fn test_create_test_image() {
        let image = create_test_image(50, 40, &[(10, 10, 5)]).to_rgb8();
        assert_eq!(image.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(image.get_pixel(12, 12), &Rgb([0, 0, 0]));
        assert_eq!(image.get_pixel(15, 15), &Rgb([255, 255, 255]));
    }
}
