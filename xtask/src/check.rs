//! Running an example and comparing its output against the expected files.
//!
//! Each example `foo` has two expected files under `testsuite/expected/`:
//! - `foo.expected`: semihosting text
//! - `foo.uart`: raw UART0 bytes

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::build::{build_example, project_root};
use crate::qemu::{QemuOutput, run_qemu};

/// Options for running an example.
pub struct RunOptions {
    /// Print the output instead of comparing it (for `qemu` command).
    pub verbose: bool,
    /// Update expected files instead of comparing (for `test --bless`).
    pub bless: bool,
    /// Build in release mode.
    pub release: bool,
}

/// Build and run `example`.
///
/// Returns `Ok(true)` if the test passed, `Ok(false)` if it failed.
pub fn run_example(example: &str, opts: &RunOptions) -> Result<bool> {
    println!("Building '{example}'...");
    let elf_path = build_example(example, opts.release)?;

    println!("Running in QEMU...");
    let output = run_qemu(&elf_path)?;

    if opts.verbose {
        print!("{}", String::from_utf8_lossy(&output.semihosting));
        println!("--- QEMU run end ---");
        if !output.uart0.is_empty() {
            println!("--- uart0 ---");
            print!("{}", String::from_utf8_lossy(&output.uart0));
        }
        return Ok(true);
    }

    let dir = project_root().join("testsuite").join("expected");
    let expected_text = dir.join(format!("{example}.expected"));
    let expected_uart = dir.join(format!("{example}.uart"));

    if opts.bless {
        bless(&expected_text, &output.semihosting)?;
        bless(&expected_uart, &output.uart0)?;
        return Ok(true);
    }

    if !expected_text.exists() || !expected_uart.exists() {
        println!("  No expected output files, run with --bless to create");
        dump(&output);
        return Ok(false);
    }

    let text = fs::read(&expected_text)
        .with_context(|| format!("Failed to read {}", expected_text.display()))?;
    let uart = fs::read(&expected_uart)
        .with_context(|| format!("Failed to read {}", expected_uart.display()))?;

    if output.semihosting == text && output.uart0 == uart {
        println!("  PASS");
        Ok(true)
    } else {
        println!("  FAIL: output differs from expected");
        println!("--- expected (semihosting) ---");
        print!("{}", String::from_utf8_lossy(&text));
        println!("--- expected (uart0) ---");
        print!("{}", String::from_utf8_lossy(&uart));
        dump(&output);
        Ok(false)
    }
}

fn dump(output: &QemuOutput) {
    println!("--- actual (semihosting) ---");
    print!("{}", String::from_utf8_lossy(&output.semihosting));
    println!("--- actual (uart0) ---");
    print!("{}", String::from_utf8_lossy(&output.uart0));
}

fn bless(path: &Path, actual: &[u8]) -> Result<()> {
    let filename = file_name(path);
    let status = match fs::read(path) {
        Ok(existing) if existing == actual => "No change",
        Ok(_) => {
            fs::write(path, actual)?;
            "Updated"
        }
        Err(_) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, actual)?;
            "Created"
        }
    };
    println!("  {filename}: {status}");
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
