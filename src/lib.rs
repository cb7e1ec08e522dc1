#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # photoprep
//!
//! Batch pipeline for marketplace product photos. Photos are staged off a memory card,
//! their background is removed with a segmentation model, the result is trimmed to the
//! subject and flattened onto a solid colour, and the finished shot can be attached to
//! a catalog record named by a QR label in the frame.
//!
//! ## Features
//!
//! - **Segmentation models**: `u2net`, `u2netp`, `u2net_human_seg`, `silueta` and
//!   `isnet-general-use`, plus `auto` selection by object count
//! - **Multiple Backends**: ONNX Runtime (GPU acceleration) and Tract (Pure Rust)
//! - **Label extraction**: QR decoding with redaction of the label from the output
//! - **Deterministic post-processing**: trimming and compositing never depend on the model
//! - **Parallel batches**: one model session per worker thread, collision-free naming
//! - **Catalog upload**: Odoo JSON-RPC publisher
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use photoprep::{BatchJob, ModelSelector, NoOpProgressReporter, RgbColor};
//!
//! # fn example() -> anyhow::Result<()> {
//! let job = BatchJob::builder("/Volumes/EOS_DIGITAL")
//!     .model(ModelSelector::Auto)
//!     .fill_color("(255,255,255)".parse::<RgbColor>()?)
//!     .scan_codes(true)
//!     .build()?;
//!
//! let report = photoprep::run(job, &NoOpProgressReporter::default())?;
//! println!("{} processed, {} failed", report.processed(), report.failed());
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `tract` (default): Pure Rust backend
//! - `qr` (default): QR label decoding
//! - `cli` (default): Command-line interface and progress bars
//! - `tracing-json`, `tracing-files`: extra log output formats for the CLI

pub mod backends;
pub mod batch;
pub mod cache;
pub mod catalog;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod media;
pub mod models;
pub mod pipeline;
pub mod processor;
pub mod scanner;
pub mod selection;
pub mod services;
pub mod tracing_config;
pub mod utils;

pub use backends::*;
pub use batch::{
    discover_sources, run, stage_sources, BatchReport, BatchRunner, FileFailure, SOURCE_EXTENSIONS,
};
pub use cache::{format_size, CachedModelInfo, ModelCache};
pub use catalog::{is_publishable_identifier, CatalogConfig, CatalogPublisher, OdooPublisher};
pub use config::{
    BackendType, BatchJob, BatchJobBuilder, ExecutionProvider, ModelSelector, OutputLayout,
    RemovalSettings, RgbColor,
};
pub use download::ModelDownloader;
pub use error::{PhotoPrepError, Result};
pub use inference::InferenceBackend;
pub use models::{ModelInfo, ModelKind, ModelManager, PreprocessingConfig};
pub use pipeline::{
    composite, trim, BoundingBox, ExtractedLabel, FileOutcome, FilePipeline, OutputNamer,
    PublishStatus,
};
pub use processor::{BackendFactory, BackgroundRemovalProcessor, DefaultBackendFactory};
pub use scanner::{default_scanner, CodeScanner, Detection, Region};
#[cfg(feature = "cli")]
pub use services::ConsoleProgressReporter;
pub use services::{ImageIOService, NoOpProgressReporter, ProcessingStage, ProgressReporter};
pub use utils::{ExecutionProviderManager, ImagePreprocessor, ProviderInfo};

#[cfg(feature = "cli")]
pub use tracing_config::init_cli_tracing;
pub use tracing_config::{TracingConfig, TracingFormat, TracingOutput};
