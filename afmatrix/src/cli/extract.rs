use std::path::PathBuf;

use clap::Args;
use log::{error, info, warn};

use super::common::{Context, Outcome, TargetSelector, DEFAULT_OUTPUT_DIR, DEFAULT_PACKAGES_DIR};
use crate::{artifact::ArtifactManager, Result};

#[derive(Debug, Args)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub selector: TargetSelector,

    /// Root directory the packages were built into.
    #[arg(long = "output-dir", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Directory receiving one subdirectory of packages per target.
    #[arg(long = "dest", default_value = DEFAULT_PACKAGES_DIR)]
    pub dest: PathBuf,
}

pub fn extract(context: &Context, args: ExtractArgs) -> Result<Outcome> {
    let selection = args.selector.resolve(context.resolver());
    if selection.targets.is_empty() {
        warn!("no targets to extract");
        return Ok(selection.empty_outcome());
    }

    let manager = ArtifactManager::new(args.output_dir);
    let mut failed = 0;
    let mut extracted = 0;
    for target in &selection.targets {
        match manager.extract(target, &args.dest) {
            Ok(packages) => extracted += packages.len(),
            Err(err) => {
                error!("{err}");
                failed += 1;
            }
        }
    }

    info!(
        "extracted {extracted} package(s) from {} of {} target(s) into {:?}",
        selection.targets.len() - failed,
        selection.targets.len(),
        args.dest
    );

    Ok(if failed > 0 {
        Outcome::Failed
    } else if !selection.invalid.is_empty() {
        Outcome::Invalid
    } else {
        Outcome::Success
    })
}
