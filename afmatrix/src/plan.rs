//! Translates a [`Target`] into the exact container build to run.

use std::path::{Path, PathBuf};

use crate::{config::MatrixConfig, image_ref, target::Target};

pub const BACKEND_ARG: &str = "BACKEND";
pub const ARCH_ARG: &str = "ARCH";
pub const LIBRARY_VERSION_ARG: &str = "ARRAYFIRE_VERSION";
pub const LIBRARY_RELEASE_ARG: &str = "ARRAYFIRE_RELEASE";

/// Values shared by every planned build in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalSettings {
    pub library_name: String,
    pub library_version: String,
    /// `major.minor` of the library version, used in registry tags.
    pub library_short_version: String,
    pub library_release: String,
    pub registry: String,
    /// Holds the image definitions and is passed as the build context.
    pub definitions_dir: PathBuf,
    pub output_root: PathBuf,
    /// Rendered registry repository per backend.
    pub package_names: Vec<(String, String)>,
}

impl GlobalSettings {
    pub fn from_config(config: &MatrixConfig, definitions_dir: &Path, output_root: &Path) -> Self {
        Self {
            library_name: config.library.name.clone(),
            library_version: config.library.version.to_string(),
            library_short_version: config.library.short_version(),
            library_release: config.library.release.clone(),
            registry: config.registry.clone(),
            definitions_dir: definitions_dir.to_owned(),
            output_root: output_root.to_owned(),
            package_names: config
                .backends
                .iter()
                .map(|backend| {
                    (
                        backend.name.clone(),
                        backend.render_package_name(&config.library.name),
                    )
                })
                .collect(),
        }
    }

    /// Replaces the configured registry, e.g. with the one given on the command line.
    pub fn with_registry(self, registry: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
            ..self
        }
    }

    fn package_name(&self, backend: &str) -> String {
        self.package_names
            .iter()
            .find(|(name, _)| name == backend)
            .map(|(_, package)| package.clone())
            .unwrap_or_else(|| format!("{}-{backend}", self.library_name))
    }
}

/// A fully specified container build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInvocation {
    pub target: Target,
    pub image_definition_path: PathBuf,
    pub context_dir: PathBuf,
    /// Build arguments in the order they are passed to the backend.
    pub build_args: Vec<(String, String)>,
    /// Platform in `os/arch` form.
    pub platform: String,
    pub output_path: PathBuf,
    pub tag: String,
    pub registry_tag: String,
}

impl BuildInvocation {
    /// Returns true if every field the backend needs is present.
    pub fn is_complete(&self) -> bool {
        !self.tag.is_empty()
            && !self.registry_tag.is_empty()
            && !self.platform.is_empty()
            && self.image_definition_path.file_name().is_some()
            && self.output_path.file_name().is_some()
            && !self.build_args.is_empty()
            && self
                .build_args
                .iter()
                .all(|(name, value)| !name.is_empty() && !value.is_empty())
    }
}

pub fn plan(target: &Target, settings: &GlobalSettings) -> BuildInvocation {
    let family = target.family;

    let build_args = [
        (family.version_arg(), target.version.as_str()),
        (BACKEND_ARG, target.backend.as_str()),
        (ARCH_ARG, target.arch.as_str()),
        (LIBRARY_VERSION_ARG, settings.library_version.as_str()),
        (LIBRARY_RELEASE_ARG, settings.library_release.as_str()),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_owned(), value.to_owned()))
    .collect();

    let tag = image_ref::compose(None, &settings.library_name, &target.to_string());
    let registry_tag = image_ref::compose(
        Some(settings.registry.as_str()),
        &settings.package_name(&target.backend),
        &format!(
            "{version}-{distro}{distro_version}-{arch}",
            version = settings.library_short_version,
            distro = target.distro,
            distro_version = target.version,
            arch = target.arch,
        ),
    );

    BuildInvocation {
        target: target.clone(),
        image_definition_path: settings.definitions_dir.join(family.definition_file()),
        context_dir: settings.definitions_dir.clone(),
        build_args,
        platform: format!("linux/{}", target.arch),
        output_path: target.output_dir(&settings.output_root),
        tag,
        registry_tag,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::tests::example, target::Resolver};

    fn settings(config: &MatrixConfig) -> GlobalSettings {
        GlobalSettings::from_config(config, Path::new("docker"), Path::new("output"))
    }

    #[test]
    fn debian_cpu_amd64() {
        let config = example();
        let target = Resolver::new(&config)
            .resolve_explicit("debian", "12", "cpu", "amd64")
            .unwrap();
        let invocation = plan(&target, &settings(&config));

        assert_eq!(
            invocation.image_definition_path,
            Path::new("docker/Dockerfile.debian")
        );
        assert_eq!(invocation.context_dir, Path::new("docker"));
        assert_eq!(
            invocation.build_args,
            [
                ("DEBIAN_VERSION", "12"),
                ("BACKEND", "cpu"),
                ("ARCH", "amd64"),
                ("ARRAYFIRE_VERSION", "3.10.0"),
                ("ARRAYFIRE_RELEASE", "v3.10.0"),
            ]
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
        );
        assert_eq!(invocation.platform, "linux/amd64");
        assert!(invocation.output_path.ends_with("debian12-cpu-amd64"));
        assert_eq!(invocation.output_path, Path::new("output/debian12-cpu-amd64"));
        assert_eq!(invocation.tag, "arrayfire:debian12-cpu-amd64");
        assert_eq!(
            invocation.registry_tag,
            "ghcr.io/dawnmagnet/arrayfire-cpu:3.10-debian12-amd64"
        );
        assert!(invocation.is_complete());
    }

    #[test]
    fn rhel_family_uses_its_definition_and_version_arg() {
        let config = example();
        let target = Resolver::new(&config)
            .resolve_explicit("rhel", "9", "cuda", "amd64")
            .unwrap();
        let invocation = plan(&target, &settings(&config));

        assert_eq!(
            invocation.image_definition_path,
            Path::new("docker/Dockerfile.rhel")
        );
        assert_eq!(
            invocation.build_args[0],
            ("RHEL_VERSION".to_owned(), "9".to_owned())
        );
        assert_eq!(
            invocation.registry_tag,
            "ghcr.io/dawnmagnet/arrayfire-cuda:3.10-rhel9-amd64"
        );
    }

    #[test]
    fn package_name_template() {
        let config = example();
        let target = Resolver::new(&config)
            .resolve_explicit("debian", "11", "all", "amd64")
            .unwrap();
        assert_eq!(
            plan(&target, &settings(&config)).registry_tag,
            "ghcr.io/dawnmagnet/arrayfire:3.10-debian11-amd64"
        );
    }

    #[test]
    fn registry_override() {
        let config = example();
        let target = Resolver::new(&config)
            .resolve_explicit("rhel", "8", "opencl", "arm64")
            .unwrap();
        let invocation = plan(
            &target,
            &settings(&config).with_registry("localhost:5000/mirror"),
        );
        assert_eq!(
            invocation.registry_tag,
            "localhost:5000/mirror/arrayfire-opencl:3.10-rhel8-arm64"
        );
        assert_eq!(invocation.tag, "arrayfire:rhel8-opencl-arm64");
    }

    #[test]
    fn plan_is_pure() {
        let config = example();
        let settings = settings(&config);
        for target in Resolver::new(&config).expand_full() {
            assert_eq!(plan(&target, &settings), plan(&target, &settings));
        }
    }

    #[test]
    fn incomplete_invocation() {
        let config = example();
        let target = Resolver::new(&config).expand_mvp().remove(0);
        let mut invocation = plan(&target, &settings(&config));
        invocation.build_args[3].1.clear();
        assert!(!invocation.is_complete());
    }
}
