//! Inference backend abstraction

use crate::config::RemovalSettings;
use crate::error::Result;
use crate::models::{ModelInfo, PreprocessingConfig};
use ndarray::Array4;
use std::time::Duration;

/// Trait for inference backends
///
/// A backend owns exactly one loaded model. Backends are not shared between
/// threads; each worker builds its own.
pub trait InferenceBackend: Send {
    /// Initialize the backend with the given settings
    ///
    /// Returns the model load time, or `None` if the backend was already initialized.
    ///
    /// # Errors
    /// - Model file missing or unreadable
    /// - Session creation failures
    fn initialize(&mut self, settings: &RemovalSettings) -> Result<Option<Duration>>;

    /// Run inference on a `1×3×H×W` input tensor, returning the raw mask tensor
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Tensor conversion errors
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Get the expected input shape for this backend
    fn input_shape(&self) -> (usize, usize, usize, usize);

    /// Get preprocessing configuration for this backend
    fn get_preprocessing_config(&self) -> PreprocessingConfig;

    /// Get model information for this backend
    ///
    /// # Errors
    /// - Model metadata unavailable
    fn get_model_info(&self) -> Result<ModelInfo>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;
}
