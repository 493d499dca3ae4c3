use anyhow::{Context, Result};
use colored::Colorize;
use std::process::Command;
use std::time::Instant;

use crate::cmd::{secs, step, OnFailure};

pub const CHIP: &str = "STM32H743ZITx";

fn binary_path(release: bool) -> &'static str {
    if release {
        "target/thumbv7em-none-eabihf/release/firmware"
    } else {
        "target/thumbv7em-none-eabihf/debug/firmware"
    }
}

pub fn run(release: bool) -> Result<()> {
    let mode = if release { "release" } else { "debug" };

    println!();
    println!(
        "{}",
        format!("🔨 Building firmware ({mode} mode)...").cyan().bold()
    );
    println!();

    let mut build = vec![
        "build",
        "-p",
        "firmware",
        "--target",
        "thumbv7em-none-eabihf",
        "--features",
        "hardware",
    ];
    if release {
        build.push("--release");
    }
    step("Building firmware", "cargo", &build, OnFailure::Abort)?;

    show_binary_size(release);

    println!("{}", "📡 Flashing to STM32H7...".cyan().bold());
    println!(
        "   {}",
        "The image carries a blank crash slot: the failure count restarts at 0".dimmed()
    );

    let flash_start = Instant::now();
    let mut flash_cmd = Command::new("probe-rs");
    flash_cmd
        .arg("download")
        .arg(binary_path(release))
        .arg("--chip")
        .arg(CHIP)
        .arg("--probe-index")
        .arg("0");

    let flash_output = flash_cmd
        .output()
        .context("Failed to run probe-rs. Is probe-rs installed? (cargo install probe-rs-tools)")?;

    if !flash_output.status.success() {
        eprintln!("{}", "✗ Flash failed".red().bold());
        eprintln!();
        eprintln!("{}", String::from_utf8_lossy(&flash_output.stderr));
        anyhow::bail!("Flash failed - check that the probe is connected and the device is powered");
    }

    println!(
        "{}",
        format!("✓ Flash successful in {}", secs(flash_start.elapsed())).green()
    );
    println!();
    println!(
        "   {}",
        format!("Use 'probe-rs attach --chip {CHIP}' to view RTT logs").dimmed()
    );
    println!(
        "   {}",
        "Use 'cargo xtask recover --probe' to read the last fault".dimmed()
    );
    println!();

    Ok(())
}

fn show_binary_size(release: bool) {
    let output = Command::new("rust-size")
        .arg(binary_path(release))
        .arg("-A")
        .output();

    if let Ok(out) = output {
        if out.status.success() {
            println!("{}", "📊 Binary size:".cyan());
            for line in String::from_utf8_lossy(&out.stdout).lines() {
                println!("   {}", line.dimmed());
            }
            println!();
        }
    }
}
