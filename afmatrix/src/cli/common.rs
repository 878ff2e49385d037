use std::path::{Path, PathBuf};

use clap::Args;
use itertools::{Either, Itertools};
use log::error;

use crate::{
    config::{ConfigError, MatrixConfig},
    image_ref,
    plan::GlobalSettings,
    target::{Resolver, Target, ValidationError},
};

pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_PACKAGES_DIR: &str = "packages";

/// What a command accomplished, mapped to the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// At least one build or extraction failed.
    Failed,
    /// At least one target selection was invalid.
    Invalid,
    NothingToDo,
    Cancelled,
}

/// Exit status for configuration errors, which abort before any work is attempted.
pub const CONFIG_ERROR_CODE: i32 = 4;

impl Outcome {
    pub const fn code(self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::Failed => 1,
            Outcome::Invalid => 2,
            Outcome::NothingToDo => 3,
            Outcome::Cancelled => 130,
        }
    }
}

/// The exit status for an error that aborted a command.
pub fn exit_code(error: &(dyn std::error::Error + 'static)) -> i32 {
    if error.is::<ConfigError>() {
        CONFIG_ERROR_CODE
    } else if error.is::<ValidationError>() {
        Outcome::Invalid.code()
    } else {
        Outcome::Failed.code()
    }
}

/// State shared by the commands that work on targets.
pub struct Context {
    pub config: MatrixConfig,
    pub definitions_dir: PathBuf,
}

impl Context {
    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.config)
    }

    /// Planning globals, with `registry` replacing the configured registry when given.
    pub fn settings(&self, output_root: &Path, registry: Option<&str>) -> GlobalSettings {
        let settings = GlobalSettings::from_config(&self.config, &self.definitions_dir, output_root);
        match registry {
            Some(registry) => settings.with_registry(registry),
            None => settings,
        }
    }
}

/// Parses a `--registry` value.
pub fn registry(value: &str) -> Result<String, &'static str> {
    if !image_ref::is_registry(value) {
        return Err("expected a registry host optionally followed by lowercase path components, e.g. ghcr.io/dawnmagnet");
    }
    Ok(value.to_string())
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct TargetSelector {
    /// Select the targets of the MVP matrix.
    #[arg(long = "mvp")]
    pub mvp: bool,

    /// Select every target of the full matrix.
    #[arg(long = "all")]
    pub all: bool,

    /// Select a target by identity, like `debian12-cpu-amd64`. Can be repeated.
    #[arg(long = "target", value_name = "ID")]
    pub targets: Vec<String>,

    /// Select a single target by its parts.
    #[arg(num_args = 4, value_names = ["DISTRO", "VERSION", "BACKEND", "ARCH"])]
    pub tuple: Vec<String>,
}

/// Resolved targets in selection order, together with the selections that could not be resolved.
#[derive(Debug)]
pub struct Selection {
    pub targets: Vec<Target>,
    pub invalid: Vec<ValidationError>,
}

impl Selection {
    /// The outcome to report when there is nothing valid to work on.
    pub fn empty_outcome(&self) -> Outcome {
        if self.invalid.is_empty() {
            Outcome::NothingToDo
        } else {
            Outcome::Invalid
        }
    }
}

impl TargetSelector {
    pub fn resolve(&self, resolver: Resolver) -> Selection {
        if self.all {
            return Selection {
                targets: resolver.expand_full(),
                invalid: Vec::new(),
            };
        }
        if self.mvp || (self.targets.is_empty() && self.tuple.is_empty()) {
            return Selection {
                targets: resolver.expand_mvp(),
                invalid: Vec::new(),
            };
        }

        let resolved: Vec<Result<Target, ValidationError>> = match self.tuple.as_slice() {
            [distro, version, backend, arch] => {
                vec![resolver.resolve_explicit(distro, version, backend, arch)]
            }
            _ => self
                .targets
                .iter()
                .map(|id| resolver.resolve_id(id))
                .collect(),
        };

        let (targets, invalid): (Vec<_>, Vec<_>) =
            resolved.into_iter().partition_map(|result| match result {
                Ok(target) => Either::Left(target),
                Err(error) => Either::Right(error),
            });

        for error in &invalid {
            error!("{error}");
        }

        Selection {
            targets: targets.into_iter().unique().collect(),
            invalid,
        }
    }
}
