use std::path::PathBuf;

use clap::Args;
use log::info;

use super::common::{Outcome, DEFAULT_OUTPUT_DIR};
use crate::{artifact::ArtifactManager, Result};

#[derive(Debug, Args)]
pub struct CleanArgs {
    /// Root directory to remove.
    #[arg(long = "output-dir", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Confirm the removal of every build output.
    #[arg(long = "yes", required = true)]
    pub yes: bool,
}

pub fn clean(args: CleanArgs) -> Result<Outcome> {
    let manager = ArtifactManager::new(args.output_dir);
    if manager.clean()? {
        info!("removed {:?}", manager.output_root());
        Ok(Outcome::Success)
    } else {
        info!("nothing to remove at {:?}", manager.output_root());
        Ok(Outcome::NothingToDo)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn removes_the_output_root() {
        let root = tempfile::tempdir().unwrap();
        let output_dir = root.path().join("output");
        fs::create_dir_all(output_dir.join("debian12-cpu-amd64")).unwrap();

        let args = || CleanArgs {
            output_dir: output_dir.clone(),
            yes: true,
        };
        assert_eq!(clean(args()).unwrap(), Outcome::Success);
        assert!(!output_dir.exists());
        assert_eq!(clean(args()).unwrap(), Outcome::NothingToDo);
    }
}
