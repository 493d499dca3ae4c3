// Desktop/tooling crate — unwrap/expect/panic acceptable in non-embedded code.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod check;
mod cmd;
mod flash;
mod recover;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Postmortem fault engine development tasks", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Flash firmware to STM32H7 hardware via probe-rs
    Flash {
        /// Build and flash release version
        #[arg(short, long)]
        release: bool,
    },
    /// Check the firmware build and the no_std engine crates
    Check,
    /// Run host tests for every crate
    Test {
        /// Run only unit tests
        #[arg(long)]
        unit: bool,
        /// Run only integration tests
        #[arg(long)]
        integration: bool,
    },
    /// Decode a crash record from a flash dump or a live target
    Recover {
        /// Raw binary dump containing the crash slot
        #[arg(long, conflicts_with = "probe")]
        dump: Option<std::path::PathBuf>,
        /// Read the crash slot from the attached target with probe-rs
        #[arg(long)]
        probe: bool,
        /// Firmware ELF used to symbolize stacktrace addresses (addr2line)
        #[arg(long)]
        elf: Option<std::path::PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Flash { release } => flash::run(release),
        Commands::Check => check::run(),
        Commands::Test { unit, integration } => test::run(unit, integration),
        Commands::Recover { dump, probe, elf } => {
            let source = match (dump, probe) {
                (Some(path), _) => recover::Source::Dump(path),
                (None, true) => recover::Source::Probe,
                (None, false) => anyhow::bail!("pass --dump <FILE> or --probe"),
            };
            recover::run(&source, elf.as_deref())
        }
    }
}
