//! Configuration types for a batch run
//!
//! Everything a run needs is captured once in an immutable [`BatchJob`] that is cloned
//! into every worker. Nothing is read from ambient global state after construction.

use crate::catalog::CatalogConfig;
use crate::error::{PhotoPrepError, Result};
use crate::models::ModelKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Inference engine used for background removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    #[default]
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
}

/// Solid colour used to flatten transparent images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub const WHITE: RgbColor = RgbColor {
        r: 255,
        g: 255,
        b: 255,
    };

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    #[must_use]
    pub fn to_rgb(self) -> image::Rgb<u8> {
        image::Rgb([self.r, self.g, self.b])
    }

    /// ITU-R 601-2 luma, used when flattening luminance-alpha images
    #[must_use]
    pub fn luma(self) -> u8 {
        let weighted =
            u32::from(self.r) * 299 + u32::from(self.g) * 587 + u32::from(self.b) * 114;
        ((weighted + 500) / 1000) as u8
    }
}

impl Default for RgbColor {
    fn default() -> Self {
        Self::WHITE
    }
}

impl fmt::Display for RgbColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.r, self.g, self.b)
    }
}

impl FromStr for RgbColor {
    type Err = PhotoPrepError;

    /// Parse `"(R,G,B)"`; every channel must be an integer in 0..=255
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            PhotoPrepError::invalid_input(format!(
                "Invalid color format: {s}. Expected format: (R,G,B) with each value between 0 and 255."
            ))
        };

        let inner = s.trim().trim_start_matches('(').trim_end_matches(')');
        let channels = inner
            .split(',')
            .map(|part| part.trim().parse::<i64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;

        let [r, g, b] = channels.as_slice() else {
            return Err(invalid());
        };
        let channel = |v: i64| u8::try_from(v).map_err(|_| invalid());
        Ok(Self::new(channel(*r)?, channel(*g)?, channel(*b)?))
    }
}

/// Which segmentation model to use for each image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelSelector {
    /// Pick per image from the number of sizable objects in the shot
    Auto,
    /// Always use the named model
    Named(ModelKind),
}

impl ModelSelector {
    /// Every model a run with this selector may need
    #[must_use]
    pub fn required_models(self) -> Vec<ModelKind> {
        match self {
            Self::Auto => vec![ModelKind::SINGLE_SUBJECT, ModelKind::DETAIL],
            Self::Named(kind) => vec![kind],
        }
    }
}

impl Default for ModelSelector {
    fn default() -> Self {
        Self::Named(ModelKind::SINGLE_SUBJECT)
    }
}

impl fmt::Display for ModelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Named(kind) => write!(f, "{kind}"),
        }
    }
}

impl FromStr for ModelSelector {
    type Err = PhotoPrepError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "auto" {
            Ok(Self::Auto)
        } else {
            s.parse::<ModelKind>().map(Self::Named)
        }
    }
}

/// The four artifact directories, each with its own naming namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLayout {
    /// Verbatim copies of the source files
    pub original: PathBuf,
    /// Background removed, full frame
    pub no_background: PathBuf,
    /// Background removed, trimmed and flattened onto the fill colour
    pub no_background_trimmed: PathBuf,
    /// Original pixels cropped to the same box
    pub trimmed: PathBuf,
}

impl OutputLayout {
    /// The conventional layout below one root directory
    #[must_use]
    pub fn under(root: &Path) -> Self {
        Self {
            original: root.join("Original"),
            no_background: root.join("NB"),
            no_background_trimmed: root.join("NB_Trimmed"),
            trimmed: root.join("Trimmed"),
        }
    }

    /// `~/Desktop/eBay Pics`
    #[must_use]
    pub fn default_root() -> PathBuf {
        dirs::desktop_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join("Desktop")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("eBay Pics")
    }

    #[must_use]
    pub fn directories(&self) -> [&Path; 4] {
        [
            &self.original,
            &self.no_background,
            &self.no_background_trimmed,
            &self.trimmed,
        ]
    }

    /// Create every output directory if it does not exist yet
    pub fn create_all(&self) -> Result<()> {
        for dir in self.directories() {
            fs::create_dir_all(dir)
                .map_err(|e| PhotoPrepError::file_io_error("create output directory", dir, &e))?;
        }
        Ok(())
    }
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self::under(&Self::default_root())
    }
}

/// Settings forwarded to the background removal capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalSettings {
    pub backend_type: BackendType,
    pub execution_provider: ExecutionProvider,
    /// Intra-op threads per worker session (0 = let the backend decide)
    pub intra_threads: usize,
    /// Override of the model directory; `None` uses `$U2NET_HOME` or `~/.u2net`
    pub model_dir: Option<PathBuf>,
    /// Fetch missing models before the batch starts
    pub allow_download: bool,
}

impl Default for RemovalSettings {
    fn default() -> Self {
        Self {
            backend_type: BackendType::Onnx,
            execution_provider: ExecutionProvider::Auto,
            intra_threads: 0,
            model_dir: None,
            allow_download: true,
        }
    }
}

/// Everything one run needs; immutable once built
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub source_root: PathBuf,
    pub layout: OutputLayout,
    pub model: ModelSelector,
    pub fill_color: RgbColor,
    /// Look for a QR label, redact it and use its content as the output name
    pub scan_codes: bool,
    /// Remove each source file once its copy has been written
    pub delete_source: bool,
    /// Eject the source medium after staging
    pub eject_media: bool,
    /// Worker threads (0 = one per available processing unit)
    pub workers: usize,
    pub removal: RemovalSettings,
    /// Catalog upload target; `None` disables publishing
    pub catalog: Option<CatalogConfig>,
}

impl BatchJob {
    #[must_use]
    pub fn builder(source_root: impl Into<PathBuf>) -> BatchJobBuilder {
        BatchJobBuilder::new(source_root)
    }

    /// Resolved worker count, never zero
    #[must_use]
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1)
        }
    }

    #[must_use]
    pub fn publishing_enabled(&self) -> bool {
        self.scan_codes && self.catalog.is_some()
    }
}

/// Builder for [`BatchJob`]
#[derive(Debug)]
pub struct BatchJobBuilder {
    job: BatchJob,
}

impl BatchJobBuilder {
    #[must_use]
    pub fn new(source_root: impl Into<PathBuf>) -> Self {
        Self {
            job: BatchJob {
                source_root: source_root.into(),
                layout: OutputLayout::default(),
                model: ModelSelector::default(),
                fill_color: RgbColor::WHITE,
                scan_codes: false,
                delete_source: true,
                eject_media: false,
                workers: 0,
                removal: RemovalSettings::default(),
                catalog: None,
            },
        }
    }

    #[must_use]
    pub fn layout(mut self, layout: OutputLayout) -> Self {
        self.job.layout = layout;
        self
    }

    #[must_use]
    pub fn model(mut self, model: ModelSelector) -> Self {
        self.job.model = model;
        self
    }

    #[must_use]
    pub fn fill_color(mut self, color: RgbColor) -> Self {
        self.job.fill_color = color;
        self
    }

    #[must_use]
    pub fn scan_codes(mut self, enabled: bool) -> Self {
        self.job.scan_codes = enabled;
        self
    }

    #[must_use]
    pub fn delete_source(mut self, enabled: bool) -> Self {
        self.job.delete_source = enabled;
        self
    }

    #[must_use]
    pub fn eject_media(mut self, enabled: bool) -> Self {
        self.job.eject_media = enabled;
        self
    }

    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.job.workers = workers;
        self
    }

    #[must_use]
    pub fn removal(mut self, removal: RemovalSettings) -> Self {
        self.job.removal = removal;
        self
    }

    #[must_use]
    pub fn catalog(mut self, catalog: Option<CatalogConfig>) -> Self {
        self.job.catalog = catalog;
        self
    }

    /// Validate and freeze the job
    pub fn build(self) -> Result<BatchJob> {
        let job = self.job;
        if !job.source_root.is_dir() {
            return Err(PhotoPrepError::invalid_input(format!(
                "Source directory not found at {}",
                job.source_root.display()
            )));
        }

        let dirs = job.layout.directories();
        for (i, a) in dirs.iter().enumerate() {
            if dirs.iter().skip(i + 1).any(|b| a == b) {
                return Err(PhotoPrepError::invalid_input(format!(
                    "Output directory {} is used for more than one artifact class",
                    a.display()
                )));
            }
        }

        if job.catalog.is_some() && !job.scan_codes {
            return Err(PhotoPrepError::invalid_input(
                "Catalog publishing needs code scanning: identifiers only come from scanned labels",
            ));
        }
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_color() {
        assert_eq!("(255,255,255)".parse::<RgbColor>().unwrap(), RgbColor::WHITE);
        assert_eq!(
            "( 12, 34 ,56 )".parse::<RgbColor>().unwrap(),
            RgbColor::new(12, 34, 56)
        );
        assert_eq!("0,0,0".parse::<RgbColor>().unwrap(), RgbColor::new(0, 0, 0));
    }

    #[test]
    fn test_parse_color_rejects_out_of_range() {
        let err = "(300,0,0)".parse::<RgbColor>().unwrap_err();
        assert!(matches!(err, PhotoPrepError::InvalidInput(_)));
        assert!(err.to_string().contains("(300,0,0)"));
        assert!("(-1,0,0)".parse::<RgbColor>().is_err());
    }

    #[test]
    fn test_parse_color_rejects_bad_shape() {
        assert!("(1,2)".parse::<RgbColor>().is_err());
        assert!("(1,2,3,4)".parse::<RgbColor>().is_err());
        assert!("red".parse::<RgbColor>().is_err());
        assert!("".parse::<RgbColor>().is_err());
    }

    #[test]
    fn test_color_display_round_trip() {
        let color = RgbColor::new(10, 20, 30);
        assert_eq!(color.to_string().parse::<RgbColor>().unwrap(), color);
    }

    #[test]
    fn test_luma() {
        assert_eq!(RgbColor::WHITE.luma(), 255);
        assert_eq!(RgbColor::new(0, 0, 0).luma(), 0);
        assert_eq!(RgbColor::new(255, 0, 0).luma(), 76);
    }

    #[test]
    fn test_model_selector_parse() {
        assert_eq!("auto".parse::<ModelSelector>().unwrap(), ModelSelector::Auto);
        assert_eq!(
            "u2net".parse::<ModelSelector>().unwrap(),
            ModelSelector::Named(ModelKind::U2Net)
        );
        assert!("AUTO".parse::<ModelSelector>().is_err());
        assert_eq!(
            ModelSelector::Auto.required_models(),
            vec![ModelKind::IsNetGeneralUse, ModelKind::U2Net]
        );
    }

    #[test]
    fn test_builder_rejects_missing_source() {
        let temp = TempDir::new().unwrap();
        let err = BatchJob::builder(temp.path().join("missing"))
            .layout(OutputLayout::under(temp.path()))
            .build()
            .unwrap_err();
        assert!(err.is_fatal_at_startup());
    }

    #[test]
    fn test_builder_rejects_shared_output_dirs() {
        let temp = TempDir::new().unwrap();
        let mut layout = OutputLayout::under(temp.path());
        layout.trimmed = layout.original.clone();
        assert!(BatchJob::builder(temp.path())
            .layout(layout)
            .build()
            .is_err());
    }

    #[test]
    fn test_builder_rejects_publish_without_scanning() {
        let temp = TempDir::new().unwrap();
        let result = BatchJob::builder(temp.path())
            .layout(OutputLayout::under(&temp.path().join("out")))
            .catalog(Some(CatalogConfig::new("https://odoo.example", "db", "u", "p")))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_layout_create_all() {
        let temp = TempDir::new().unwrap();
        let layout = OutputLayout::under(&temp.path().join("eBay Pics"));
        layout.create_all().unwrap();
        for dir in layout.directories() {
            assert!(dir.is_dir());
        }
    }

    #[test]
    fn test_worker_count_never_zero() {
        let temp = TempDir::new().unwrap();
        let job = BatchJob::builder(temp.path())
            .layout(OutputLayout::under(&temp.path().join("out")))
            .build()
            .unwrap();
        assert!(job.worker_count() >= 1);
        assert!(!job.publishing_enabled());
    }

    #[test]
    fn test_model_selector_serializes_with_model_names() {
        let named = ModelSelector::Named(ModelKind::IsNetGeneralUse);
        let json = serde_json::to_string(&named).unwrap();
        assert_eq!(json, r#"{"Named":"isnet-general-use"}"#);
        assert_eq!(serde_json::from_str::<ModelSelector>(&json).unwrap(), named);

        assert_eq!(serde_json::to_string(&ModelSelector::Auto).unwrap(), r#""Auto""#);
        for kind in ModelKind::ALL {
            let encoded = serde_json::to_string(&kind).unwrap();
            assert_eq!(encoded, format!("\"{}\"", kind.name()));
        }
    }
}
