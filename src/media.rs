//! Removable media handling

use std::path::Path;
use std::process::Command;

#[cfg(target_os = "macos")]
fn eject_command(root: &Path) -> Command {
    let mut command = Command::new("diskutil");
    command.arg("eject").arg(root);
    command
}

#[cfg(not(target_os = "macos"))]
fn eject_command(root: &Path) -> Command {
    let mut command = Command::new("eject");
    command.arg(root);
    command
}

/// Ask the platform to eject the medium mounted at `root`
///
/// Best-effort: any failure is logged and swallowed. Returns whether the command
/// reported success.
pub fn eject(root: &Path) -> bool {
    let mut command = eject_command(root);
    match command.output() {
        Ok(output) if output.status.success() => {
            log::info!("Ejected {}", root.display());
            true
        },
        Ok(output) => {
            log::error!(
                "Failed to eject {}: {} {}",
                root.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            false
        },
        Err(e) => {
            log::error!("Failed to eject {}: {e}", root.display());
            false
        },
    }
}
