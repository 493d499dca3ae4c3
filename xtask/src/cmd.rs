use anyhow::{Context, Result};
use colored::Colorize;
use std::process::{Command, Output};
use std::time::{Duration, Instant};

/// How a failing step is treated.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum OnFailure {
    Abort,
    Warn,
}

/// Run `program args…`, print a one-line verdict and, on failure, stderr.
pub fn step(label: &str, program: &str, args: &[&str], on_failure: OnFailure) -> Result<Output> {
    println!("{}", format!("  {label}...").cyan());
    let start = Instant::now();
    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("Failed to run {program} for: {label}"))?;

    if output.status.success() {
        println!("{}", format!("  ✓ {label} in {}", secs(start.elapsed())).green());
    } else {
        match on_failure {
            OnFailure::Abort => {
                eprintln!("{}", format!("  ✗ {label} failed").red().bold());
                eprintln!();
                eprintln!("{}", String::from_utf8_lossy(&output.stderr));
                anyhow::bail!("{label} failed");
            }
            OnFailure::Warn => {
                eprintln!("{}", format!("  ⚠ {label} reported problems").yellow().bold());
                eprintln!("{}", String::from_utf8_lossy(&output.stderr));
            }
        }
    }
    println!();
    Ok(output)
}

pub fn secs(d: Duration) -> String {
    format!("{:.2}s", d.as_secs_f64())
}
