mod build;
mod clean;
mod common;
mod extract;
mod list;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use log::debug;

use crate::{config::MatrixConfig, Result};

pub use common::{exit_code, Outcome};

pub const DEFAULT_CONFIG_PATH: &str = "docker/build-config.yaml";

#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// The build matrix configuration file.
    #[arg(long = "config", global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Directory holding the image definitions and serving as build context. Defaults to the directory of the
    /// configuration file.
    #[arg(long = "definitions-dir", global = true)]
    definitions_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the targets of the build matrix
    List(list::ListArgs),

    /// List the configured compute backends
    Backends,

    /// Build packages for the selected targets
    Build(build::BuildArgs),

    /// Copy built packages into one directory per target
    Extract(extract::ExtractArgs),

    /// Remove all build outputs
    Clean(clean::CleanArgs),
}

fn definitions_dir(config: &Path, explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| match config.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    })
}

fn load_context(config_path: &Path, definitions_dir_arg: Option<PathBuf>) -> Result<common::Context> {
    let config = MatrixConfig::load(config_path)?;
    debug!(
        "loaded {config_path:?} with {} platform(s) and {} backend(s)",
        config.platforms.len(),
        config.backends.len()
    );
    Ok(common::Context {
        config,
        definitions_dir: definitions_dir(config_path, definitions_dir_arg),
    })
}

impl Cli {
    pub fn run(self) -> Result<Outcome> {
        let Cli {
            command,
            config,
            definitions_dir,
        } = self;

        match command {
            Commands::List(args) => list::list(&load_context(&config, definitions_dir)?, args),
            Commands::Backends => list::backends(&load_context(&config, definitions_dir)?),
            Commands::Build(args) => build::build(&load_context(&config, definitions_dir)?, args),
            Commands::Extract(args) => {
                extract::extract(&load_context(&config, definitions_dir)?, args)
            }
            // Cleaning only touches the output root and works without a valid configuration.
            Commands::Clean(args) => clean::clean(args),
        }
    }
}
