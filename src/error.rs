//! Error types for the photo preparation pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PhotoPrepError>;

/// Error taxonomy for the pipeline
///
/// `Provisioning` and `InvalidInput` abort a run before any file is touched.
/// Everything else is scoped to the unit of work it happened in.
#[derive(Error, Debug)]
pub enum PhotoPrepError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// A capability the run depends on is not installed or cannot be loaded
    #[error("Provisioning error: {0}")]
    Provisioning(String),

    /// Operator input that cannot be accepted (bad colour, missing source, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Per-image processing errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// Remote catalog RPC errors
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// No catalog record matched
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PhotoPrepError {
    pub fn provisioning<S: Into<String>>(msg: S) -> Self {
        Self::Provisioning(msg.into())
    }

    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    pub fn catalog<S: Into<String>>(msg: S) -> Self {
        Self::Catalog(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {operation} '{path_display}': {error}"),
        ))
    }

    /// Create image loading error with format context
    pub fn image_load_error<P: AsRef<std::path::Path>>(path: P, error: &image::ImageError) -> Self {
        let path_display = path.as_ref().display();
        let extension = path
            .as_ref()
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown");

        Self::Processing(format!(
            "Failed to load image '{path_display}' (format: {extension}): {error}"
        ))
    }

    /// Errors that must stop a run before fan-out instead of being logged per file
    #[must_use]
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(self, Self::Provisioning(_) | Self::InvalidInput(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = PhotoPrepError::invalid_input("bad colour");
        assert!(matches!(err, PhotoPrepError::InvalidInput(_)));

        let err = PhotoPrepError::not_found("4521");
        assert!(matches!(err, PhotoPrepError::NotFound(_)));
    }

    #[test]
    fn test_error_display() {
        let err = PhotoPrepError::provisioning("QR decoder not compiled in");
        assert_eq!(
            err.to_string(),
            "Provisioning error: QR decoder not compiled in"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(PhotoPrepError::provisioning("x").is_fatal_at_startup());
        assert!(PhotoPrepError::invalid_input("x").is_fatal_at_startup());
        assert!(!PhotoPrepError::processing("x").is_fatal_at_startup());
        assert!(!PhotoPrepError::catalog("x").is_fatal_at_startup());
        assert!(!PhotoPrepError::not_found("x").is_fatal_at_startup());
    }

    #[test]
    fn test_file_io_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = PhotoPrepError::file_io_error("copy", Path::new("/Volumes/EOS/IMG_1.JPG"), &io_error);
        let message = err.to_string();
        assert!(message.contains("copy"));
        assert!(message.contains("/Volumes/EOS/IMG_1.JPG"));
    }
}
