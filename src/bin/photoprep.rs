//! photoprep command-line tool
//!
//! Batch product-photo pipeline built on the photoprep library.

#[cfg(feature = "cli")]
use photoprep::cli;

#[cfg(feature = "cli")]
fn main() -> anyhow::Result<()> {
    cli::main()
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
