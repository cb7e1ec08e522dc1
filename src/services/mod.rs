//! Services separating file I/O and progress reporting from pipeline logic

pub mod io;
pub mod progress;

pub use io::ImageIOService;
#[cfg(feature = "cli")]
pub use progress::ConsoleProgressReporter;
pub use progress::{NoOpProgressReporter, ProcessingStage, ProgressReporter};
