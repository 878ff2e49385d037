//! Post-build handling of the packages a build exported to its output directory.

use std::{
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::{config::Family, target::Target};

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("{target}: nothing was built at {}, build the target before extracting", dir.display())]
    NeverBuilt { target: Target, dir: PathBuf },

    #[error("{target}: {} and {} have the same file name", first.display(), second.display())]
    DuplicateName {
        target: Target,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("{target}: failed to list packages in {}: {source}", dir.display())]
    Discover {
        target: Target,
        dir: PathBuf,
        source: io::Error,
    },

    #[error("{target}: failed to copy {} to {}: {source}", from.display(), to.display())]
    Copy {
        target: Target,
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
}

/// Lists the packages of `family` anywhere below `dir`, sorted by path. A missing directory has no packages.
pub fn discover_in(dir: &Path, family: Family) -> io::Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let extension = family.package_extension();
    let mut packages = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == extension)
        {
            packages.push(entry.into_path());
        }
    }
    packages.sort();
    Ok(packages)
}

/// Discovers, extracts and cleans build outputs below one output root.
#[derive(Debug, Clone)]
pub struct ArtifactManager {
    output_root: PathBuf,
}

impl ArtifactManager {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn output_dir(&self, target: &Target) -> PathBuf {
        target.output_dir(&self.output_root)
    }

    /// Lists the packages built for `target`. Files with other extensions are ignored.
    pub fn discover(&self, target: &Target) -> io::Result<Vec<PathBuf>> {
        discover_in(&self.output_dir(target), target.family)
    }

    /// Copies the packages of `target` to `<destination_root>/<target>/`, keeping file names, and returns the copies.
    ///
    /// Fails if the target's output directory does not exist, so that a target that was never built is not mistaken
    /// for one that produced nothing.
    pub fn extract(
        &self,
        target: &Target,
        destination_root: &Path,
    ) -> Result<Vec<PathBuf>, ExtractionError> {
        let dir = self.output_dir(target);
        if !dir.is_dir() {
            return Err(ExtractionError::NeverBuilt {
                target: target.clone(),
                dir,
            });
        }

        let packages = discover_in(&dir, target.family).map_err(|source| {
            ExtractionError::Discover {
                target: target.clone(),
                dir: dir.clone(),
                source,
            }
        })?;

        if packages.is_empty() {
            warn!("{target}: no .{} packages found in {dir:?}", target.family.package_extension());
            return Ok(Vec::new());
        }

        // Check every name before copying anything so a conflict does not leave a partial extraction behind.
        let mut named: Vec<(OsString, &PathBuf)> = Vec::with_capacity(packages.len());
        for package in &packages {
            let name = package.file_name().unwrap_or_default().to_owned();
            if let Some((_, first)) = named.iter().find(|(existing, _)| *existing == name) {
                return Err(ExtractionError::DuplicateName {
                    target: target.clone(),
                    first: (*first).clone(),
                    second: package.clone(),
                });
            }
            named.push((name, package));
        }

        let destination = destination_root.join(target.to_string());
        fs::create_dir_all(&destination).map_err(|source| ExtractionError::Copy {
            target: target.clone(),
            from: dir.clone(),
            to: destination.clone(),
            source,
        })?;

        named
            .into_iter()
            .map(|(name, package)| {
                let to = destination.join(name);
                fs::copy(package, &to).map_err(|source| ExtractionError::Copy {
                    target: target.clone(),
                    from: package.clone(),
                    to: to.clone(),
                    source,
                })?;
                info!("{target}: extracted {to:?}");
                Ok(to)
            })
            .collect()
    }

    /// Removes every build output below the output root. Returns false if there was nothing to remove.
    pub fn clean(&self) -> io::Result<bool> {
        match fs::remove_dir_all(&self.output_root) {
            Ok(()) => {
                debug!("removed {:?}", self.output_root);
                Ok(true)
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(distro: &str, family: Family) -> Target {
        Target {
            distro: distro.to_owned(),
            version: "12".to_owned(),
            backend: "cpu".to_owned(),
            arch: "amd64".to_owned(),
            family,
        }
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, path.to_string_lossy().as_bytes()).unwrap();
    }

    #[test]
    fn discover_filters_by_family_suffix() {
        let root = tempfile::tempdir().unwrap();
        let manager = ArtifactManager::new(root.path());
        let debian = target("debian", Family::Debian);
        let dir = manager.output_dir(&debian);
        touch(&dir.join("b.deb"));
        touch(&dir.join("nested/a.deb"));
        touch(&dir.join("c.rpm"));
        touch(&dir.join("build.log"));
        fs::create_dir_all(dir.join("dir.deb")).unwrap();

        assert_eq!(
            manager.discover(&debian).unwrap(),
            [dir.join("b.deb"), dir.join("nested/a.deb")]
        );
    }

    #[test]
    fn discover_missing_directory_is_empty() {
        let root = tempfile::tempdir().unwrap();
        let manager = ArtifactManager::new(root.path());
        assert!(manager.discover(&target("rhel", Family::Rhel)).unwrap().is_empty());
    }

    #[test]
    fn extract_never_built_fails() {
        let root = tempfile::tempdir().unwrap();
        let manager = ArtifactManager::new(root.path().join("output"));
        let error = manager
            .extract(&target("debian", Family::Debian), &root.path().join("packages"))
            .unwrap_err();
        assert!(matches!(error, ExtractionError::NeverBuilt { .. }), "{error}");
        assert!(error.to_string().starts_with("debian12-cpu-amd64: "));
        assert!(!root.path().join("packages").exists());
    }

    #[test]
    fn extract_copies_into_target_directory() {
        let root = tempfile::tempdir().unwrap();
        let manager = ArtifactManager::new(root.path().join("output"));
        let rhel = target("rhel", Family::Rhel);
        let dir = manager.output_dir(&rhel);
        touch(&dir.join("rpms/arrayfire-cpu-3.10.0.x86_64.rpm"));
        touch(&dir.join("arrayfire-cpu-devel-3.10.0.x86_64.rpm"));
        touch(&dir.join("ignored.deb"));

        let dest = root.path().join("packages");
        let extracted = manager.extract(&rhel, &dest).unwrap();
        assert_eq!(
            extracted,
            [
                dest.join("rhel12-cpu-amd64/arrayfire-cpu-devel-3.10.0.x86_64.rpm"),
                dest.join("rhel12-cpu-amd64/arrayfire-cpu-3.10.0.x86_64.rpm"),
            ]
        );
        for path in &extracted {
            assert!(path.is_file());
        }
        assert!(!dest.join("rhel12-cpu-amd64/ignored.deb").exists());
    }

    #[test]
    fn extract_empty_output_is_not_an_error() {
        let root = tempfile::tempdir().unwrap();
        let manager = ArtifactManager::new(root.path());
        let debian = target("debian", Family::Debian);
        fs::create_dir_all(manager.output_dir(&debian)).unwrap();
        assert!(manager.extract(&debian, &root.path().join("packages")).unwrap().is_empty());
    }

    #[test]
    fn extract_rejects_conflicting_names() {
        let root = tempfile::tempdir().unwrap();
        let manager = ArtifactManager::new(root.path().join("output"));
        let debian = target("debian", Family::Debian);
        let dir = manager.output_dir(&debian);
        touch(&dir.join("a/libaf.deb"));
        touch(&dir.join("b/libaf.deb"));

        let dest = root.path().join("packages");
        let error = manager.extract(&debian, &dest).unwrap_err();
        assert!(matches!(error, ExtractionError::DuplicateName { .. }), "{error}");
        assert!(!dest.exists());
    }

    #[test]
    fn clean_removes_everything_once() {
        let root = tempfile::tempdir().unwrap();
        let manager = ArtifactManager::new(root.path().join("output"));
        touch(&manager.output_dir(&target("debian", Family::Debian)).join("a.deb"));

        assert!(manager.clean().unwrap());
        assert!(!manager.output_root().exists());
        assert!(!manager.clean().unwrap());
    }
}
