//! Background removal processor
//!
//! One `BackgroundRemovalProcessor` lives inside each worker. It loads a model the
//! first time that model is asked for and keeps the session for every later image
//! the worker handles. Sessions are never shared between workers; dropping the
//! processor releases them.

use crate::{
    cache::ModelCache,
    config::{BackendType, ModelSelector, RemovalSettings},
    error::{PhotoPrepError, Result},
    inference::InferenceBackend,
    models::{ModelKind, ModelManager},
    selection,
    utils::ImagePreprocessor,
};
use image::{DynamicImage, RgbaImage};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create an uninitialized backend of the given type for one model
    ///
    /// # Errors
    /// - Backend type not compiled into this build
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Backend factory for the engines compiled into this build
#[derive(Debug, Default)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(crate::backends::OnnxBackend::with_model_manager(
                model_manager,
            ))),
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(
                crate::backends::TractBackend::with_model_manager(model_manager),
            )),
            #[allow(unreachable_patterns)]
            other => {
                let _ = model_manager;
                Err(PhotoPrepError::provisioning(format!(
                    "{other:?} backend is not compiled into this build"
                )))
            },
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        #[cfg(feature = "onnx")]
        backends.push(BackendType::Onnx);
        #[cfg(feature = "tract")]
        backends.push(BackendType::Tract);
        backends
    }
}

/// Per-worker background remover with a lazily populated session cache
pub struct BackgroundRemovalProcessor {
    factory: Arc<dyn BackendFactory>,
    cache: ModelCache,
    settings: RemovalSettings,
    backends: HashMap<ModelKind, Box<dyn InferenceBackend>>,
}

impl BackgroundRemovalProcessor {
    #[must_use]
    pub fn new(
        factory: Arc<dyn BackendFactory>,
        cache: ModelCache,
        settings: RemovalSettings,
    ) -> Self {
        Self {
            factory,
            cache,
            settings,
            backends: HashMap::new(),
        }
    }

    /// Load every model the selector may need so failures surface before any file is touched
    pub fn preload(&mut self, selector: ModelSelector) -> Result<()> {
        for kind in selector.required_models() {
            self.backend_for(kind)?;
        }
        Ok(())
    }

    /// Remove the background of `image` with the model chosen by `selector`
    ///
    /// `auto` counts sizable objects in `image` to pick the model. The result is the
    /// source frame with the predicted mask as alpha.
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn remove_background(
        &mut self,
        image: &DynamicImage,
        selector: ModelSelector,
    ) -> Result<RgbaImage> {
        let kind = selection::resolve_model(image, selector);
        self.remove_with_model(image, kind)
    }

    /// Remove the background with an explicit model
    pub fn remove_with_model(&mut self, image: &DynamicImage, kind: ModelKind) -> Result<RgbaImage> {
        let start = Instant::now();
        let backend = self.backend_for(kind)?;

        let config = backend.get_preprocessing_config();
        let input = ImagePreprocessor::preprocess_for_inference(image, &config)?;
        let output = backend.infer(&input)?;
        let mask = ImagePreprocessor::tensor_to_mask(&output, image.width(), image.height())?;
        let result = ImagePreprocessor::apply_mask(image, &mask)?;

        log::debug!(
            "Background removed with {kind} in {:.0}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(result)
    }

    /// Models with a live session in this processor
    #[must_use]
    pub fn loaded_models(&self) -> Vec<ModelKind> {
        let mut kinds: Vec<_> = self.backends.keys().copied().collect();
        kinds.sort();
        kinds
    }

    fn backend_for(&mut self, kind: ModelKind) -> Result<&mut Box<dyn InferenceBackend>> {
        if !self.backends.contains_key(&kind) {
            let manager = ModelManager::new(kind, &self.cache);
            let mut backend = self
                .factory
                .create_backend(self.settings.backend_type, manager)?;
            if let Some(load_time) = backend.initialize(&self.settings)? {
                tracing::debug!(model = %kind, ms = load_time.as_millis() as u64, "model loaded");
            }
            self.backends.insert(kind, backend);
        }
        self.backends
            .get_mut(&kind)
            .ok_or_else(|| PhotoPrepError::internal(format!("Backend for {kind} missing")))
    }
}

impl std::fmt::Debug for BackgroundRemovalProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemovalProcessor")
            .field("settings", &self.settings)
            .field("loaded_models", &self.loaded_models())
            .finish_non_exhaustive()
    }
}
