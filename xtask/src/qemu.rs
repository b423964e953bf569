//! QEMU runner for Cortex-M3 emulation.

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use tempfile::NamedTempFile;

/// Output from running QEMU.
pub struct QemuOutput {
    /// Semihosting stdout (status lines printed by the example).
    pub semihosting: Vec<u8>,
    /// Raw bytes the example transmitted on UART0.
    pub uart0: Vec<u8>,
}

/// Run an ELF on the `lm3s6965evb` machine until it exits through semihosting.
///
/// UART0 is captured to a file; its input side is left unconnected.
pub fn run_qemu(elf_path: &Path) -> Result<QemuOutput> {
    let uart0_file = NamedTempFile::new().context("Failed to create temp file for UART0")?;
    let uart0_path = uart0_file.path();

    let output = Command::new("qemu-system-arm")
        .args(["-cpu", "cortex-m3"])
        .args(["-machine", "lm3s6965evb"])
        .arg("-nographic")
        .args(["-monitor", "none"])
        .args(["-semihosting-config", "enable=on,target=native"])
        .arg("-serial")
        .arg(format!("file:{}", uart0_path.display()))
        .arg("-kernel")
        .arg(elf_path)
        .stdin(Stdio::null())
        .output()
        .context("Failed to run QEMU")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "QEMU exited with error: {:?}\n{}",
            output.status.code(),
            stderr
        );
    }

    let uart0 = fs::read(uart0_path).unwrap_or_default();

    Ok(QemuOutput {
        semihosting: output.stdout,
        uart0,
    })
}
