use anyhow::Result;
use colored::Colorize;
use std::time::Instant;

use crate::cmd::{secs, step, OnFailure};

const TARGET: &str = "thumbv7em-none-eabihf";

pub fn run() -> Result<()> {
    println!();
    println!("{}", "🔍 Checking builds...".cyan().bold());
    println!();

    let total_start = Instant::now();

    step(
        "Checking firmware (STM32H7, hardware)",
        "cargo",
        &["check", "-p", "firmware", "--target", TARGET, "--features", "hardware"],
        OnFailure::Abort,
    )?;

    // The engine and its traits must stay no_std with logging on or off.
    for (krate, features) in [("platform", "defmt"), ("postmortem", "defmt")] {
        step(
            &format!("Checking {krate} (no_std)"),
            "cargo",
            &["check", "-p", krate, "--target", TARGET, "--no-default-features"],
            OnFailure::Abort,
        )?;
        step(
            &format!("Checking {krate} (no_std, {features})"),
            "cargo",
            &["check", "-p", krate, "--target", TARGET, "--features", features],
            OnFailure::Abort,
        )?;
    }

    step(
        "Running clippy lints",
        "cargo",
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
        OnFailure::Warn,
    )?;

    let fmt = step(
        "Checking code formatting",
        "cargo",
        &["fmt", "--all", "--check"],
        OnFailure::Warn,
    )?;
    if !fmt.status.success() {
        eprintln!("     Run 'cargo fmt --all' to fix");
    }

    println!(
        "{}",
        format!("✓ All checks completed in {}", secs(total_start.elapsed()))
            .green()
            .bold()
    );
    println!();

    Ok(())
}
