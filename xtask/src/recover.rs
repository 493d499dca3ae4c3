//! `cargo xtask recover`: decode a crash record from a flash dump.
//!
//! The record is located by its magic and header marker anywhere in the
//! input, so a dump of the whole sector (or of all flash) works as well as
//! one of the slot alone.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::Command;

use firmware::boot::{CRASH_SLOT_OFFSET, FLASH_BASE};
use postmortem::record::find_record;
use postmortem::{render_report, FaultCause, FaultRecord, SLOT_SIZE};

use crate::flash::CHIP;

/// Where the slot bytes come from.
pub enum Source {
    /// Raw binary file.
    Dump(PathBuf),
    /// Live read over the debug probe.
    Probe,
}

pub fn run(source: &Source, elf: Option<&Path>) -> Result<()> {
    let bytes = match source {
        Source::Dump(path) => std::fs::read(path)
            .with_context(|| format!("Failed to read dump {}", path.display()))?,
        Source::Probe => read_from_probe()?,
    };

    let record = decode_dump(&bytes)?;
    let mut report = String::new();
    render_report(&record, &mut report).context("Failed to render report")?;

    println!();
    if record.cause == FaultCause::None {
        println!("{}", "✓ No fault recorded".green().bold());
    } else {
        println!("{}", "💥 Fault record".red().bold());
    }
    for line in report.lines() {
        println!("   {line}");
    }

    if let Some(elf) = elf {
        if !record.trace().is_empty() {
            println!();
            println!("{}", "📍 Symbolized stacktrace:".cyan());
            for addr in record.trace() {
                let symbol = symbolize(elf, *addr).unwrap_or_else(|e| format!("<{e}>"));
                println!("   {addr:#010x}  {}", symbol.dimmed());
            }
        }
    }
    println!();
    Ok(())
}

/// Find and decode the record in `bytes`.
///
/// An input without any record header (erased or never written) decodes as
/// the empty `None` record, like the on-target query does.
pub fn decode_dump(bytes: &[u8]) -> Result<FaultRecord> {
    let Some(offset) = find_record(bytes) else {
        return Ok(FaultRecord::default());
    };
    let slice = bytes.get(offset..).unwrap_or_default();
    FaultRecord::decode(slice)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("Record at offset {offset:#x} is not usable"))
}

fn read_from_probe() -> Result<Vec<u8>> {
    let address = format!("{:#010x}", FLASH_BASE.saturating_add(CRASH_SLOT_OFFSET));
    println!(
        "{}",
        format!("📡 Reading {SLOT_SIZE} bytes at {address} from {CHIP}...").cyan()
    );
    let output = Command::new("probe-rs")
        .args(["read", "--chip", CHIP, "b8", &address, &SLOT_SIZE.to_string()])
        .output()
        .context("Failed to run probe-rs. Is probe-rs installed? (cargo install probe-rs-tools)")?;
    if !output.status.success() {
        eprintln!("{}", String::from_utf8_lossy(&output.stderr));
        anyhow::bail!("probe-rs read failed");
    }
    parse_hex_bytes(&String::from_utf8_lossy(&output.stdout))
}

/// Parse whitespace-separated hex bytes (`0a`, `0x0a`) as printed by
/// `probe-rs read b8`.
pub fn parse_hex_bytes(text: &str) -> Result<Vec<u8>> {
    text.split_whitespace()
        .map(|token| {
            let digits = token.trim_start_matches("0x");
            u8::from_str_radix(digits, 16).with_context(|| format!("Not a hex byte: {token:?}"))
        })
        .collect()
}

fn symbolize(elf: &Path, addr: u32) -> Result<String> {
    let output = Command::new("addr2line")
        .arg("-e")
        .arg(elf)
        .args(["-f", "-C", "-p"])
        .arg(format!("{addr:#x}"))
        .output()
        .context("addr2line not available")?;
    if !output.status.success() {
        anyhow::bail!("addr2line failed");
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
