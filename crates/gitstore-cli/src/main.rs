//! gitstore entry point.
//!
//! ```bash
//! gitstore --target git:git@example.com:/org/site.git#gh-pages put-dir ./public
//! ```

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use gitstore_cli::Cli;

fn main() -> Result<ExitCode> {
    // Logs go to stderr so `get` output stays clean (respects RUST_LOG)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("gitstore_kernel=info".parse()?))
        .init();

    let cli = Cli::parse();
    let mut stdout = std::io::stdout().lock();
    match gitstore_cli::run(&cli, &mut stdout) {
        Ok(true) => Ok(ExitCode::SUCCESS),
        Ok(false) => Ok(ExitCode::from(1)),
        Err(e) => {
            eprintln!("gitstore: {e:#}");
            Ok(ExitCode::from(2))
        }
    }
}
