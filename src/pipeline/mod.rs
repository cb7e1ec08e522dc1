//! Per-file transformation pipeline
//!
//! One [`FilePipeline`] is built per worker and run against each staged file in turn:
//! label extraction, background removal, trimming, compositing, writing the three
//! derived artifacts and, when configured, publishing.

pub mod composite;
pub mod label;
pub mod naming;
pub mod trim;

pub use composite::composite;
pub use label::{extract, redact, sanitize, ExtractedLabel};
pub use naming::{unique_path, OutputNamer};
pub use trim::{content_box, trim, BoundingBox, TRIM_BUFFER};

use crate::catalog::{is_publishable_identifier, CatalogPublisher};
use crate::config::BatchJob;
use crate::error::Result;
use crate::processor::BackgroundRemovalProcessor;
use crate::scanner::CodeScanner;
use crate::services::{ImageIOService, ProcessingStage};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// What happened to the catalog upload for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishStatus {
    /// No publisher configured or no code was decoded
    NotAttempted,
    /// Attached as the image record with this id
    Published(i64),
    /// Not sent; the reason is logged
    Skipped(String),
    /// Sent but rejected or unreachable
    Failed(String),
}

/// Artifacts and decisions for one processed file
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub source: PathBuf,
    /// Base name used for every artifact (decoded identifier or file stem)
    pub name: String,
    pub label: Option<ExtractedLabel>,
    pub no_background: PathBuf,
    pub no_background_trimmed: Option<PathBuf>,
    pub trimmed: Option<PathBuf>,
    pub bounding_box: Option<BoundingBox>,
    pub publish: PublishStatus,
}

impl FileOutcome {
    /// Identifier recovered from a label, if any
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        self.label.as_ref().and_then(|l| l.identifier.as_deref())
    }
}

/// Runs the full transformation for single files of a batch
pub struct FilePipeline<'a> {
    job: &'a BatchJob,
    namer: &'a OutputNamer,
    scanner: Option<&'a dyn CodeScanner>,
    publisher: Option<&'a dyn CatalogPublisher>,
}

impl<'a> FilePipeline<'a> {
    #[must_use]
    pub fn new(job: &'a BatchJob, namer: &'a OutputNamer) -> Self {
        Self {
            job,
            namer,
            scanner: None,
            publisher: None,
        }
    }

    /// Scanner used when the job asks for code scanning
    #[must_use]
    pub fn with_scanner(mut self, scanner: Option<&'a dyn CodeScanner>) -> Self {
        self.scanner = scanner;
        self
    }

    /// Publisher for files whose label decodes to a catalog identifier
    #[must_use]
    pub fn with_publisher(mut self, publisher: Option<&'a dyn CatalogPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Process one staged file
    ///
    /// The background-removed artifact is always written. Trimmed artifacts are only
    /// written when foreground was found. Publishing problems never fail the file.
    #[instrument(skip(self, processor), fields(file = %path.display()))]
    pub fn process(
        &self,
        processor: &mut BackgroundRemovalProcessor,
        path: &Path,
    ) -> Result<FileOutcome> {
        tracing::debug!(stage = ProcessingStage::ImageLoading.description());
        let source = ImageIOService::load_image(path)?;

        let (label, working) = match self.scanner {
            Some(scanner) if self.job.scan_codes => {
                tracing::debug!(stage = ProcessingStage::LabelExtraction.description());
                label::extract(source, scanner)?
            },
            _ => (None, source),
        };

        let name = label
            .as_ref()
            .and_then(|l| l.identifier.clone())
            .unwrap_or_else(|| file_stem(path));
        if label.is_none() && self.job.scan_codes {
            log::info!("No code found in {}, using file name", path.display());
        }
        let file_name = format!("{name}.png");
        let layout = &self.job.layout;

        tracing::debug!(stage = ProcessingStage::BackgroundRemoval.description());
        let removed = DynamicImage::ImageRgba8(processor.remove_background(&working, self.job.model)?);

        tracing::debug!(stage = ProcessingStage::FileSaving.description());
        let no_background = self.namer.resolve(&layout.no_background, &file_name)?;
        ImageIOService::save_png(&removed, &no_background)?;

        tracing::debug!(stage = ProcessingStage::Trimming.description());
        let (trimmed_removed, bounding_box) = trim::trim(&removed);

        let (no_background_trimmed, trimmed, flattened) = match bounding_box {
            Some(bbox) => {
                tracing::debug!(stage = ProcessingStage::Compositing.description());
                let flattened = composite::composite(&trimmed_removed, self.job.fill_color);
                let nbt_path = self.namer.resolve(&layout.no_background_trimmed, &file_name)?;
                ImageIOService::save_png(&flattened, &nbt_path)?;

                // Same box as the removed image so both crops stay pixel-aligned
                let trimmed_original = bbox.crop(&working);
                let trimmed_path = self.namer.resolve(&layout.trimmed, &file_name)?;
                ImageIOService::save_png(&trimmed_original, &trimmed_path)?;

                (Some(nbt_path), Some(trimmed_path), Some(flattened))
            },
            None => {
                log::warn!(
                    "No foreground found in {}, skipping trimmed outputs",
                    path.display()
                );
                (None, None, None)
            },
        };

        let identifier = label.as_ref().and_then(|l| l.identifier.as_deref());
        let publish = self.publish(identifier, flattened.as_ref());

        Ok(FileOutcome {
            source: path.to_path_buf(),
            name,
            label,
            no_background,
            no_background_trimmed,
            trimmed,
            bounding_box,
            publish,
        })
    }

    fn publish(&self, identifier: Option<&str>, image: Option<&DynamicImage>) -> PublishStatus {
        let (Some(publisher), Some(identifier)) = (self.publisher, identifier) else {
            return PublishStatus::NotAttempted;
        };
        if !is_publishable_identifier(identifier) {
            log::warn!("Identifier '{identifier}' is not a catalog SKU, not publishing");
            return PublishStatus::Skipped(format!("'{identifier}' is not a catalog SKU"));
        }
        let Some(image) = image else {
            log::warn!("No trimmed image for SKU {identifier}, not publishing");
            return PublishStatus::Skipped("no foreground found".to_string());
        };

        tracing::debug!(stage = ProcessingStage::Publishing.description());
        match publisher.publish(identifier, image) {
            Ok(record_id) => PublishStatus::Published(record_id),
            Err(e) => {
                log::warn!("Publishing SKU {identifier} failed: {e}");
                PublishStatus::Failed(e.to_string())
            },
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{create_test_image, MockBackendFactory};
    use crate::cache::ModelCache;
    use crate::config::{ModelSelector, OutputLayout, RemovalSettings, RgbColor};
    use crate::error::PhotoPrepError;
    use crate::models::ModelKind;
    use crate::scanner::{Detection, Region};
    use image::{GenericImageView, GrayImage, Rgb};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    struct FixedScanner(Vec<Detection>);

    impl CodeScanner for FixedScanner {
        fn scan(&self, _image: &GrayImage) -> Result<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    fn label_at(payload: &str, left: u32, top: u32) -> FixedScanner {
        FixedScanner(vec![Detection {
            region: Region {
                left,
                top,
                width: 20,
                height: 20,
            },
            payload: payload.as_bytes().to_vec(),
        }])
    }

    #[derive(Default)]
    struct RecordingPublisher {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl CatalogPublisher for RecordingPublisher {
        fn publish(&self, identifier: &str, _image: &DynamicImage) -> Result<i64> {
            self.calls.lock().unwrap().push(identifier.to_string());
            if self.fail {
                Err(PhotoPrepError::not_found(format!("No product found with SKU: {identifier}")))
            } else {
                Ok(7)
            }
        }
    }

    struct Fixture {
        _temp: TempDir,
        job: BatchJob,
        namer: OutputNamer,
        processor: BackgroundRemovalProcessor,
    }

    fn fixture(scan_codes: bool) -> Fixture {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("card");
        std::fs::create_dir_all(&source).unwrap();
        let job = BatchJob::builder(&source)
            .layout(OutputLayout::under(&temp.path().join("out")))
            .model(ModelSelector::Named(ModelKind::IsNetGeneralUse))
            .fill_color(RgbColor::new(10, 20, 30))
            .scan_codes(scan_codes)
            .build()
            .unwrap();
        let cache = ModelCache::with_custom_cache_dir(&temp.path().join("models")).unwrap();
        let processor = BackgroundRemovalProcessor::new(
            Arc::new(MockBackendFactory::new()),
            cache,
            RemovalSettings::default(),
        );
        Fixture {
            _temp: temp,
            job,
            namer: OutputNamer::new(),
            processor,
        }
    }

    fn write_source(fixture: &Fixture, name: &str, image: &DynamicImage) -> PathBuf {
        let path = fixture.job.source_root.join(name);
        image.save_with_format(&path, image::ImageFormat::Png).unwrap();
        path
    }

    #[test]
    fn test_process_writes_all_artifacts() {
        let mut f = fixture(false);
        let path = write_source(&f, "IMG_0001.png", &create_test_image(400, 400, &[(150, 150, 100)]));

        let pipeline = FilePipeline::new(&f.job, &f.namer);
        let outcome = pipeline.process(&mut f.processor, &path).unwrap();

        assert_eq!(outcome.name, "IMG_0001");
        assert_eq!(outcome.no_background, f.job.layout.no_background.join("IMG_0001.png"));
        // Square at 150..250 plus the 100px buffer; mask resampling may soften the edge by a pixel
        let bbox = outcome.bounding_box.unwrap();
        assert!((44..=50).contains(&bbox.left), "left {}", bbox.left);
        assert!((350..=356).contains(&bbox.right), "right {}", bbox.right);

        let flattened = ImageIOService::load_image(outcome.no_background_trimmed.unwrap()).unwrap();
        assert_eq!(flattened.dimensions(), (bbox.width(), bbox.height()));
        assert_eq!(flattened.to_rgb8().get_pixel(0, 0), &Rgb([10, 20, 30]));
        let (cx, cy) = (bbox.width() / 2, bbox.height() / 2);
        assert_eq!(flattened.to_rgb8().get_pixel(cx, cy), &Rgb([0, 0, 0]));

        // The original crop uses the identical box
        let trimmed = ImageIOService::load_image(outcome.trimmed.unwrap()).unwrap();
        assert_eq!(trimmed.dimensions(), flattened.dimensions());
        assert_eq!(trimmed.to_rgb8().get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(outcome.publish, PublishStatus::NotAttempted);
    }

    #[test]
    fn test_blank_frame_skips_trimmed_outputs() {
        let mut f = fixture(false);
        let path = write_source(&f, "blank.png", &create_test_image(64, 64, &[]));

        let outcome = FilePipeline::new(&f.job, &f.namer)
            .process(&mut f.processor, &path)
            .unwrap();

        assert!(outcome.no_background.exists());
        assert!(outcome.bounding_box.is_none());
        assert!(outcome.no_background_trimmed.is_none());
        assert!(outcome.trimmed.is_none());
        assert_eq!(std::fs::read_dir(&f.job.layout.trimmed).map(Iterator::count).unwrap_or(0), 0);
    }

    #[test]
    fn test_labelled_blank_frame_is_not_published() {
        let mut f = fixture(true);
        let path = write_source(&f, "empty.png", &create_test_image(200, 200, &[]));
        let scanner = label_at("4521", 10, 10);
        let publisher = RecordingPublisher::default();

        let outcome = FilePipeline::new(&f.job, &f.namer)
            .with_scanner(Some(&scanner))
            .with_publisher(Some(&publisher))
            .process(&mut f.processor, &path)
            .unwrap();

        assert_eq!(outcome.identifier(), Some("4521"));
        assert!(outcome.no_background.exists());
        assert!(outcome.bounding_box.is_none());
        assert_eq!(
            outcome.publish,
            PublishStatus::Skipped("no foreground found".to_string())
        );
        assert!(publisher.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_decoded_label_names_outputs_and_publishes() {
        let mut f = fixture(true);
        let path = write_source(&f, "IMG_0002.png", &create_test_image(300, 300, &[(100, 100, 60)]));
        let scanner = label_at("4521", 10, 10);
        let publisher = RecordingPublisher::default();

        let outcome = FilePipeline::new(&f.job, &f.namer)
            .with_scanner(Some(&scanner))
            .with_publisher(Some(&publisher))
            .process(&mut f.processor, &path)
            .unwrap();

        assert_eq!(outcome.identifier(), Some("4521"));
        assert_eq!(outcome.no_background.file_name().unwrap(), "4521.png");
        assert_eq!(outcome.publish, PublishStatus::Published(7));
        assert_eq!(*publisher.calls.lock().unwrap(), vec!["4521".to_string()]);
    }

    #[test]
    fn test_ineligible_identifiers_are_never_published() {
        for payload in ["12a", "12345678901"] {
            let mut f = fixture(true);
            let path = write_source(&f, "shot.png", &create_test_image(300, 300, &[(100, 100, 60)]));
            let scanner = label_at(payload, 10, 10);
            let publisher = RecordingPublisher::default();

            let outcome = FilePipeline::new(&f.job, &f.namer)
                .with_scanner(Some(&scanner))
                .with_publisher(Some(&publisher))
                .process(&mut f.processor, &path)
                .unwrap();

            assert!(matches!(outcome.publish, PublishStatus::Skipped(_)));
            assert!(publisher.calls.lock().unwrap().is_empty());
            assert!(outcome.no_background_trimmed.is_some());
        }
    }

    #[test]
    fn test_publish_failure_keeps_artifacts() {
        let mut f = fixture(true);
        let path = write_source(&f, "shot.png", &create_test_image(300, 300, &[(100, 100, 60)]));
        let scanner = label_at("999", 10, 10);
        let publisher = RecordingPublisher {
            fail: true,
            ..RecordingPublisher::default()
        };

        let outcome = FilePipeline::new(&f.job, &f.namer)
            .with_scanner(Some(&scanner))
            .with_publisher(Some(&publisher))
            .process(&mut f.processor, &path)
            .unwrap();

        assert!(matches!(outcome.publish, PublishStatus::Failed(_)));
        assert!(outcome.no_background_trimmed.unwrap().exists());
        assert!(outcome.trimmed.unwrap().exists());
    }

    #[test]
    fn test_label_is_redacted_in_trimmed_original() {
        let mut f = fixture(true);
        // A dark "label" in the top-left and a product square further in
        let image = create_test_image(400, 400, &[(20, 20, 20), (200, 200, 80)]);
        let path = write_source(&f, "shot.png", &image);
        let scanner = label_at("SKU 77!", 20, 20);

        let outcome = FilePipeline::new(&f.job, &f.namer)
            .with_scanner(Some(&scanner))
            .process(&mut f.processor, &path)
            .unwrap();

        assert_eq!(outcome.name, "SKU77");
        // The label was painted out before removal, so only the product square remains
        let bbox = outcome.bounding_box.unwrap();
        assert!(bbox.left >= 95 && bbox.top >= 95, "box {bbox:?}");
    }

    #[test]
    fn test_scanner_ignored_when_scanning_disabled() {
        let mut f = fixture(false);
        let path = write_source(&f, "plain.png", &create_test_image(200, 200, &[(50, 50, 50)]));
        let scanner = label_at("4521", 0, 0);

        let outcome = FilePipeline::new(&f.job, &f.namer)
            .with_scanner(Some(&scanner))
            .process(&mut f.processor, &path)
            .unwrap();

        assert!(outcome.label.is_none());
        assert_eq!(outcome.name, "plain");
    }

    #[test]
    fn test_same_stem_twice_gets_suffix() {
        let mut f = fixture(false);
        let first = write_source(&f, "dup.png", &create_test_image(100, 100, &[(40, 40, 20)]));
        let nested = f.job.source_root.join("sub");
        std::fs::create_dir_all(&nested).unwrap();
        let second = nested.join("dup.png");
        std::fs::copy(&first, &second).unwrap();

        let pipeline = FilePipeline::new(&f.job, &f.namer);
        let a = pipeline.process(&mut f.processor, &first).unwrap();
        let b = pipeline.process(&mut f.processor, &second).unwrap();

        assert_eq!(a.no_background.file_name().unwrap(), "dup.png");
        assert_eq!(b.no_background.file_name().unwrap(), "dup_1.png");
    }

    #[test]
    fn test_unreadable_file_is_error() {
        let mut f = fixture(false);
        let path = f.job.source_root.join("broken.jpg");
        std::fs::write(&path, b"nope").unwrap();
        assert!(FilePipeline::new(&f.job, &f.namer)
            .process(&mut f.processor, &path)
            .is_err());
    }
}
