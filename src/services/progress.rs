//! Batch progress reporting
//!
//! Workers report through a shared `ProgressReporter`; frontends decide how it is shown.

#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Stages of one file's pipeline, used for log and progress messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Decoding the staged copy
    ImageLoading,
    /// Scanning for and redacting a label
    LabelExtraction,
    /// Running the segmentation model
    BackgroundRemoval,
    /// Computing the content box
    Trimming,
    /// Flattening onto the fill colour
    Compositing,
    /// Writing artifacts
    FileSaving,
    /// Uploading to the catalog
    Publishing,
}

impl ProcessingStage {
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::ImageLoading => "Loading image",
            Self::LabelExtraction => "Scanning label",
            Self::BackgroundRemoval => "Removing background",
            Self::Trimming => "Trimming",
            Self::Compositing => "Compositing",
            Self::FileSaving => "Saving outputs",
            Self::Publishing => "Publishing",
        }
    }
}

/// Receives per-file progress from every worker
pub trait ProgressReporter: Send + Sync {
    /// Called once before fan-out with the number of staged files
    fn start(&self, total: usize);

    /// Called when a worker finishes a file, successfully or not
    fn file_finished(&self, path: &Path, success: bool);

    /// Called after every worker has stopped
    fn finish(&self);
}

/// Reporter that only keeps counts
#[derive(Debug, Default)]
pub struct NoOpProgressReporter {
    finished: AtomicUsize,
}

impl NoOpProgressReporter {
    #[must_use]
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::Relaxed)
    }
}

impl ProgressReporter for NoOpProgressReporter {
    fn start(&self, _total: usize) {}

    fn file_finished(&self, _path: &Path, _success: bool) {
        self.finished.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self) {}
}

/// Terminal progress bar shared by all workers
#[cfg(feature = "cli")]
#[derive(Debug)]
pub struct ConsoleProgressReporter {
    bar: ProgressBar,
}

#[cfg(feature = "cli")]
impl ConsoleProgressReporter {
    #[must_use]
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Self { bar }
    }
}

#[cfg(feature = "cli")]
impl Default for ConsoleProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "cli")]
impl ProgressReporter for ConsoleProgressReporter {
    fn start(&self, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn file_finished(&self, path: &Path, success: bool) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let marker = if success { "✅" } else { "❌" };
        self.bar.set_message(format!("{marker} {name}"));
        self.bar.inc(1);
    }

    fn finish(&self) {
        self.bar.finish_with_message("done");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_op_reporter_counts() {
        let reporter = NoOpProgressReporter::default();
        reporter.start(2);
        reporter.file_finished(Path::new("a.jpg"), true);
        reporter.file_finished(Path::new("b.jpg"), false);
        reporter.finish();
        assert_eq!(reporter.finished(), 2);
    }

    #[test]
    fn test_stage_descriptions_are_distinct() {
        let stages = [
            ProcessingStage::ImageLoading,
            ProcessingStage::LabelExtraction,
            ProcessingStage::BackgroundRemoval,
            ProcessingStage::Trimming,
            ProcessingStage::Compositing,
            ProcessingStage::FileSaving,
            ProcessingStage::Publishing,
        ];
        let descriptions: std::collections::HashSet<_> =
            stages.iter().map(|s| s.description()).collect();
        assert_eq!(descriptions.len(), stages.len());
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_console_reporter_tracks_position() {
        let reporter = ConsoleProgressReporter::new();
        reporter.start(3);
        reporter.file_finished(Path::new("x.JPG"), true);
        assert_eq!(reporter.bar.position(), 1);
        assert_eq!(reporter.bar.length(), Some(3));
    }
}
