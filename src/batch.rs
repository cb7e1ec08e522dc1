//! Batch orchestration
//!
//! A run is strictly two-phase. Discovery and staging happen on the calling thread,
//! freezing the set of files; the staged copies are then fanned out to a fixed pool
//! of worker threads, each holding its own background removal sessions.

use crate::cache::ModelCache;
use crate::catalog::{CatalogPublisher, OdooPublisher};
use crate::config::BatchJob;
use crate::download::ModelDownloader;
use crate::error::{PhotoPrepError, Result};
use crate::media;
use crate::pipeline::{FileOutcome, FilePipeline, OutputNamer, PublishStatus};
use crate::processor::{BackendFactory, BackgroundRemovalProcessor, DefaultBackendFactory};
use crate::scanner::{default_scanner, CodeScanner};
use crate::services::ProgressReporter;
use crossbeam_channel::Receiver;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Extensions picked up from the source medium (case-sensitive)
pub const SOURCE_EXTENSIONS: [&str; 8] = ["JPG", "jpg", "CR2", "cr2", "PNG", "png", "JPEG", "jpeg"];

/// A file that did not make it through staging or processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Summary of one run
#[derive(Debug, Default, Clone)]
pub struct BatchReport {
    pub discovered: usize,
    pub staged: usize,
    pub outcomes: Vec<FileOutcome>,
    pub failures: Vec<FileFailure>,
}

impl BatchReport {
    #[must_use]
    pub fn processed(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    #[must_use]
    pub fn published(&self) -> usize {
        self.count_publish(|s| matches!(s, PublishStatus::Published(_)))
    }

    #[must_use]
    pub fn publish_skipped(&self) -> usize {
        self.count_publish(|s| matches!(s, PublishStatus::Skipped(_)))
    }

    #[must_use]
    pub fn publish_failed(&self) -> usize {
        self.count_publish(|s| matches!(s, PublishStatus::Failed(_)))
    }

    fn count_publish(&self, predicate: impl Fn(&PublishStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(&o.publish)).count()
    }
}

/// Whether `path` carries one of the source extensions
#[must_use]
pub fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

/// Recursively list source images under `root`, sorted by path
pub fn discover_sources(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(PhotoPrepError::invalid_input(format!(
            "Source directory not found: {}",
            root.display()
        )));
    }

    let mut sources: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Skipping unreadable entry under {}: {e}", root.display());
                None
            },
        })
        .filter(|entry| entry.file_type().is_file() && is_source_file(entry.path()))
        .map(walkdir::DirEntry::into_path)
        .collect();
    sources.sort();

    log::info!("Found {} source images under {}", sources.len(), root.display());
    Ok(sources)
}

/// Copy `sources` into the job's original directory
///
/// Returns the staged copies and the files that could not be copied. A source is only
/// deleted (when the job asks for it) once its copy is confirmed complete.
pub fn stage_sources(
    job: &BatchJob,
    namer: &OutputNamer,
    sources: &[PathBuf],
) -> Result<(Vec<PathBuf>, Vec<FileFailure>)> {
    let mut staged = Vec::with_capacity(sources.len());
    let mut failures = Vec::new();

    for source in sources {
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                PhotoPrepError::internal(format!("Source without file name: {}", source.display()))
            })?;
        let destination = namer.resolve(&job.layout.original, &file_name)?;

        match copy_confirmed(source, &destination) {
            Ok(()) => {
                log::info!("Staged {}", source.display());
                if job.delete_source {
                    if let Err(e) = fs::remove_file(source) {
                        log::warn!("Could not delete source {}: {e}", source.display());
                    }
                }
                staged.push(destination);
            },
            Err(e) => {
                log::error!("Failed to stage {}: {e}", source.display());
                failures.push(FileFailure {
                    path: source.clone(),
                    error: e.to_string(),
                });
            },
        }
    }
    Ok((staged, failures))
}

fn copy_confirmed(source: &Path, destination: &Path) -> Result<()> {
    let expected = fs::metadata(source)
        .map_err(|e| PhotoPrepError::file_io_error("read metadata of", source, &e))?
        .len();
    let copied = fs::copy(source, destination)
        .map_err(|e| PhotoPrepError::file_io_error("copy", source, &e))?;
    let written = fs::metadata(destination)
        .map_err(|e| PhotoPrepError::file_io_error("read metadata of", destination, &e))?
        .len();

    if copied != expected || written != expected {
        return Err(PhotoPrepError::processing(format!(
            "Incomplete copy of {}: expected {expected} bytes, wrote {written}",
            source.display()
        )));
    }
    Ok(())
}

#[derive(Default)]
struct WorkerSummary {
    outcomes: Vec<FileOutcome>,
    failures: Vec<FileFailure>,
    init_error: Option<PhotoPrepError>,
}

/// Runs batches with explicitly chosen collaborators
pub struct BatchRunner {
    job: BatchJob,
    factory: Arc<dyn BackendFactory>,
    cache: ModelCache,
    scanner: Option<Box<dyn CodeScanner>>,
    publisher: Option<Arc<dyn CatalogPublisher>>,
}

impl BatchRunner {
    /// Runner with the compiled-in backends, QR scanner and Odoo publisher
    ///
    /// Fails when the job asks for scanning and no decoder is compiled in, so a
    /// provisioning problem surfaces before any file is touched.
    pub fn new(job: BatchJob) -> Result<Self> {
        let cache = match &job.removal.model_dir {
            Some(dir) => ModelCache::with_custom_cache_dir(dir)?,
            None => ModelCache::new()?,
        };
        let scanner = if job.scan_codes {
            Some(default_scanner()?)
        } else {
            None
        };
        let publisher: Option<Arc<dyn CatalogPublisher>> = match &job.catalog {
            Some(catalog) if job.publishing_enabled() => {
                Some(Arc::new(OdooPublisher::new(catalog.clone())?))
            },
            _ => None,
        };

        Ok(Self {
            job,
            factory: Arc::new(DefaultBackendFactory),
            cache,
            scanner,
            publisher,
        })
    }

    #[must_use]
    pub fn with_factory(mut self, factory: Arc<dyn BackendFactory>) -> Self {
        self.factory = factory;
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: ModelCache) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn with_scanner(mut self, scanner: Option<Box<dyn CodeScanner>>) -> Self {
        self.scanner = scanner;
        self
    }

    /// Replace the publisher; ignored unless the job enables publishing
    #[must_use]
    pub fn with_publisher(mut self, publisher: Option<Arc<dyn CatalogPublisher>>) -> Self {
        self.publisher = publisher;
        self
    }

    #[must_use]
    pub fn job(&self) -> &BatchJob {
        &self.job
    }

    /// Make sure every model the job may use is on disk
    ///
    /// Missing models are downloaded when the job allows it, otherwise this is a
    /// provisioning error.
    pub fn provision_models(&self, show_progress: bool) -> Result<()> {
        let required = self.job.model.required_models();
        if !self.job.removal.allow_download {
            if let Some(missing) = required.iter().find(|k| !self.cache.is_model_cached(**k)) {
                return Err(PhotoPrepError::provisioning(format!(
                    "Model '{missing}' is not cached in {} and downloads are disabled",
                    self.cache.get_current_cache_dir().display()
                )));
            }
            return Ok(());
        }

        let downloader = ModelDownloader::new(self.cache.clone())?;
        for kind in required {
            downloader.ensure_model(kind, show_progress)?;
        }
        Ok(())
    }

    /// Discover, stage and process every source image
    ///
    /// Per-file problems end up in the report. Only batch-start failures (bad source
    /// root, unwritable outputs, no worker able to load its models) are errors.
    pub fn run(&self, reporter: &dyn ProgressReporter) -> Result<BatchReport> {
        let job = &self.job;
        let span = tracing::info_span!("batch", root = %job.source_root.display());
        let _enter = span.enter();

        job.layout.create_all()?;
        let discovered = discover_sources(&job.source_root)?;
        let namer = OutputNamer::new();
        let (staged, mut failures) = stage_sources(job, &namer, &discovered)?;

        if job.eject_media {
            media::eject(&job.source_root);
        }

        let mut report = BatchReport {
            discovered: discovered.len(),
            staged: staged.len(),
            ..BatchReport::default()
        };
        if staged.is_empty() {
            log::info!("Nothing to process");
            report.failures = failures;
            return Ok(report);
        }

        let (sender, queue) = crossbeam_channel::unbounded();
        for path in &staged {
            sender
                .send(path.clone())
                .map_err(|e| PhotoPrepError::internal(format!("Work queue closed: {e}")))?;
        }
        drop(sender);

        let workers = job.worker_count().min(staged.len());
        log::info!("Processing {} images with {workers} workers", staged.len());
        reporter.start(staged.len());

        let summaries: Vec<WorkerSummary> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|index| {
                    let queue = queue.clone();
                    let job = job.clone();
                    let namer = &namer;
                    scope.spawn(move || self.work(index, job, &queue, namer, reporter))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        log::error!("A worker panicked; its current file is lost");
                        WorkerSummary::default()
                    })
                })
                .collect()
        });
        reporter.finish();

        let mut init_errors = Vec::new();
        for summary in summaries {
            report.outcomes.extend(summary.outcomes);
            failures.extend(summary.failures);
            init_errors.extend(summary.init_error);
        }

        if init_errors.len() == workers {
            if let Some(first) = init_errors.into_iter().next() {
                return Err(first);
            }
        }

        // Anything still queued was abandoned by workers that could not start
        failures.extend(queue.try_iter().map(|path| FileFailure {
            path,
            error: "not processed: worker failed to load models".to_string(),
        }));
        report.failures = failures;

        log::info!(
            "Batch finished: {} processed, {} failed, {} published",
            report.processed(),
            report.failed(),
            report.published()
        );
        Ok(report)
    }

    fn work(
        &self,
        index: usize,
        job: BatchJob,
        queue: &Receiver<PathBuf>,
        namer: &OutputNamer,
        reporter: &dyn ProgressReporter,
    ) -> WorkerSummary {
        let span = tracing::info_span!("worker", index);
        let _enter = span.enter();
        let mut summary = WorkerSummary::default();

        let mut processor = BackgroundRemovalProcessor::new(
            Arc::clone(&self.factory),
            self.cache.clone(),
            job.removal.clone(),
        );
        if let Err(e) = processor.preload(job.model) {
            log::error!("Worker {index} could not load its models: {e}");
            summary.init_error = Some(e);
            return summary;
        }

        let publisher = self.publisher.as_deref().filter(|_| job.publishing_enabled());
        let pipeline = FilePipeline::new(&job, namer)
            .with_scanner(self.scanner.as_deref())
            .with_publisher(publisher);

        for path in queue {
            match pipeline.process(&mut processor, &path) {
                Ok(outcome) => {
                    reporter.file_finished(&path, true);
                    summary.outcomes.push(outcome);
                },
                Err(e) => {
                    log::error!("Failed to process {}: {e}", path.display());
                    reporter.file_finished(&path, false);
                    summary.failures.push(FileFailure {
                        path,
                        error: e.to_string(),
                    });
                },
            }
        }
        summary
    }
}

/// Run `job` with the compiled-in collaborators, downloading missing models first
pub fn run(job: BatchJob, reporter: &dyn ProgressReporter) -> Result<BatchReport> {
    let runner = BatchRunner::new(job)?;
    runner.provision_models(false)?;
    runner.run(reporter)
}
