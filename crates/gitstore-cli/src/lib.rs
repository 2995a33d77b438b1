//! gitstore command line.
//!
//! Every invocation is one whole session: open the target, run a single
//! operation, then close so that writes are committed and pushed.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use gitstore_kernel::{Credentials, GitStore, StoreConfig};

/// Environment variable holding the password for `--username`.
pub const PASSWORD_ENV: &str = "GITSTORE_PASSWORD";

#[derive(Debug, Parser)]
#[command(name = "gitstore", version, about = "A file store backed by git repositories")]
pub struct Cli {
    /// Base locator, e.g. `git:git@example.com:/org/site.git#gh-pages/docs`
    #[arg(long, short = 't')]
    pub target: String,

    /// Username for clone and push; the password is read from GITSTORE_PASSWORD
    #[arg(long, short = 'u')]
    pub username: Option<String>,

    /// Config file (default: ~/.config/gitstore/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read a resource to stdout or a file
    Get {
        resource: String,
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
    /// Write a local file to a resource
    Put { file: PathBuf, resource: String },
    /// List a directory; subdirectories end with `/`
    Ls {
        #[arg(default_value = "")]
        directory: String,
    },
    /// Print whether a resource exists; exit status 1 when it does not
    Exists { resource: String },
    /// Copy a local directory tree into the store
    PutDir {
        source: PathBuf,
        #[arg(default_value = "")]
        destination: String,
    },
}

/// Run one session. Returns `false` when the command ran but reports a
/// negative answer (`exists` on a missing resource).
pub fn run(cli: &Cli, out: &mut dyn Write) -> Result<bool> {
    let config = match &cli.config {
        Some(path) => StoreConfig::load_from(path),
        None => StoreConfig::load(),
    }
    .context("Failed to load configuration")?;

    let credentials = match &cli.username {
        Some(user) => Credentials::new(user, std::env::var(PASSWORD_ENV).ok()),
        None => Credentials::anonymous(),
    };

    let store = GitStore::open(&cli.target, credentials, config)
        .with_context(|| format!("Failed to open {}", cli.target))?;

    // On failure the session is dropped unclosed: nothing is pushed.
    let status = execute(&store, &cli.command, out)?;

    store.close().context("Failed to publish changes")?;
    Ok(status)
}

fn execute(store: &GitStore, command: &Command, out: &mut dyn Write) -> Result<bool> {
    match command {
        Command::Get { resource, output } => {
            let mut reader = store
                .read(resource)
                .with_context(|| format!("Failed to read {resource}"))?;
            match output {
                Some(path) => {
                    let mut file = File::create(path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    io::copy(&mut reader, &mut file)?;
                }
                None => {
                    io::copy(&mut reader, out)?;
                }
            }
        }
        Command::Put { file, resource } => {
            let mut source = File::open(file)
                .with_context(|| format!("Failed to open {}", file.display()))?;
            let mut sink = store
                .write(resource)
                .with_context(|| format!("Failed to write {resource}"))?;
            let bytes = io::copy(&mut source, &mut sink)?;
            sink.flush()?;
            tracing::debug!(resource = resource.as_str(), bytes, "stored file");
        }
        Command::Ls { directory } => {
            for name in store
                .list(directory)
                .with_context(|| format!("Failed to list {directory:?}"))?
            {
                writeln!(out, "{name}")?;
            }
        }
        Command::Exists { resource } => {
            let exists = store.exists(resource)?;
            writeln!(out, "{exists}")?;
            return Ok(exists);
        }
        Command::PutDir {
            source,
            destination,
        } => {
            store
                .put_directory(source, destination)
                .with_context(|| format!("Failed to copy {}", source.display()))?;
        }
    }
    Ok(true)
}
