use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    path::{Path, PathBuf},
};

use itertools::Itertools;
use serde::Serialize;

use crate::config::{Family, MatrixConfig};

/// One concrete build unit. Identity is the `(distro, version, backend, arch)` tuple; the family is derived from the
/// distribution and does not take part in comparisons.
#[derive(Debug, Clone, Serialize)]
pub struct Target {
    pub distro: String,
    pub version: String,
    pub backend: String,
    pub arch: String,
    pub family: Family,
}

impl Target {
    pub fn identity(&self) -> (&str, &str, &str, &str) {
        (&self.distro, &self.version, &self.backend, &self.arch)
    }

    /// The directory this target's build writes its packages to.
    pub fn output_dir(&self, output_root: &Path) -> PathBuf {
        output_root.join(self.to_string())
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Target {}

impl Hash for Target {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state)
    }
}

impl PartialOrd for Target {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Target {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}-{}-{}",
            self.distro, self.version, self.backend, self.arch
        )
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ValidationErrorKind {
    UnknownDistro { known: Vec<String> },
    UnknownVersion { known: Vec<String> },
    UnknownBackend { known: Vec<String> },
    UnknownArchitecture { known: Vec<String> },
    /// The backend restricts itself to a subset of the architectures which does not include the requested one.
    UnsupportedArchitecture { supported: Vec<String> },
    MalformedTarget,
}

/// A target selection that does not describe a buildable target.
#[derive(Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// The selection as requested, `distro version backend arch` or the raw identity string.
    pub requested: String,
    pub kind: ValidationErrorKind,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid target `{}`: ", self.requested)?;
        match &self.kind {
            ValidationErrorKind::UnknownDistro { known } => {
                write!(f, "unknown distribution, expected one of {}", known.join(", "))
            }
            ValidationErrorKind::UnknownVersion { known } => {
                write!(f, "unknown distribution version, expected one of {}", known.join(", "))
            }
            ValidationErrorKind::UnknownBackend { known } => {
                write!(f, "unknown backend, expected one of {}", known.join(", "))
            }
            ValidationErrorKind::UnknownArchitecture { known } => {
                write!(f, "unknown architecture, expected one of {}", known.join(", "))
            }
            ValidationErrorKind::UnsupportedArchitecture { supported } => write!(
                f,
                "the backend does not support this architecture, it supports {}",
                supported.join(", ")
            ),
            ValidationErrorKind::MalformedTarget => write!(
                f,
                "expected `<distro><version>-<backend>-<arch>`, for example `debian12-cpu-amd64`"
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Turns selections into validated [`Target`]s.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    config: &'a MatrixConfig,
}

impl<'a> Resolver<'a> {
    pub fn new(config: &'a MatrixConfig) -> Self {
        Self { config }
    }

    /// Validates a single `(distro, version, backend, arch)` tuple against the configuration.
    pub fn resolve_explicit(
        &self,
        distro: &str,
        version: &str,
        backend: &str,
        arch: &str,
    ) -> Result<Target, ValidationError> {
        let error = |kind| ValidationError {
            requested: format!("{distro} {version} {backend} {arch}"),
            kind,
        };

        let platform = self.config.platform(distro).ok_or_else(|| {
            error(ValidationErrorKind::UnknownDistro {
                known: self.config.platforms.iter().map(|p| p.distro.clone()).collect(),
            })
        })?;
        if !platform.versions.iter().any(|v| v == version) {
            return Err(error(ValidationErrorKind::UnknownVersion {
                known: platform.versions.clone(),
            }));
        }
        let backend_config = self.config.backend(backend).ok_or_else(|| {
            error(ValidationErrorKind::UnknownBackend {
                known: self.config.backends.iter().map(|b| b.name.clone()).collect(),
            })
        })?;
        if !self.config.architectures.iter().any(|a| a == arch) {
            return Err(error(ValidationErrorKind::UnknownArchitecture {
                known: self.config.architectures.clone(),
            }));
        }
        if !backend_config.supports(arch) {
            return Err(error(ValidationErrorKind::UnsupportedArchitecture {
                supported: backend_config
                    .architectures
                    .clone()
                    .unwrap_or_else(|| self.config.architectures.clone()),
            }));
        }

        Ok(Target {
            distro: platform.distro.clone(),
            version: version.to_owned(),
            backend: backend_config.name.clone(),
            arch: arch.to_owned(),
            family: platform.family,
        })
    }

    /// Resolves an identity string like `debian12-cpu-amd64`.
    ///
    /// Identifiers can not contain `-`, so the architecture and backend are split off the right. The remaining
    /// `<distro><version>` prefix is matched against the declared platforms because distribution names may end in
    /// digits.
    pub fn resolve_id(&self, id: &str) -> Result<Target, ValidationError> {
        let malformed = || ValidationError {
            requested: id.to_owned(),
            kind: ValidationErrorKind::MalformedTarget,
        };

        let mut parts = id.rsplitn(3, '-');
        let (Some(arch), Some(backend), Some(distro_version)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };
        if arch.is_empty() || backend.is_empty() || distro_version.is_empty() {
            return Err(malformed());
        }

        let declared = self.config.platforms.iter().find_map(|platform| {
            platform
                .versions
                .iter()
                .find(|version| {
                    distro_version.strip_prefix(platform.distro.as_str()) == Some(version.as_str())
                })
                .map(|version| (platform.distro.as_str(), version.as_str()))
        });

        let (distro, version) = match declared {
            Some(pair) => pair,
            None => {
                // Prefer the longest declared distribution that prefixes the input so the error names the version.
                let known_prefix = self
                    .config
                    .platforms
                    .iter()
                    .filter(|p| distro_version.starts_with(p.distro.as_str()))
                    .max_by_key(|p| p.distro.len());
                match known_prefix {
                    Some(platform) => (
                        platform.distro.as_str(),
                        &distro_version[platform.distro.len()..],
                    ),
                    None => {
                        let digit = distro_version
                            .find(|c: char| c.is_ascii_digit())
                            .filter(|&index| index > 0)
                            .ok_or_else(malformed)?;
                        distro_version.split_at(digit)
                    }
                }
            }
        };
        if version.is_empty() {
            return Err(malformed());
        }

        self.resolve_explicit(distro, version, backend, arch)
            .map_err(|error| ValidationError {
                requested: id.to_owned(),
                ..error
            })
    }

    /// Expands the MVP matrix: entries in declaration order, each entry's architectures in declaration order.
    pub fn expand_mvp(&self) -> Vec<Target> {
        self.config
            .mvp_matrix
            .iter()
            .flat_map(|entry| {
                entry.architectures.iter().map(move |arch| {
                    (
                        entry.distro.as_str(),
                        entry.version.as_str(),
                        entry.backend.as_str(),
                        arch.as_str(),
                    )
                })
            })
            .filter_map(|(distro, version, backend, arch)| {
                self.checked(distro, version, backend, arch)
            })
            .unique()
            .collect()
    }

    /// Expands every platform version, backend and architecture, skipping architectures a backend excludes.
    pub fn expand_full(&self) -> Vec<Target> {
        let config = self.config;
        config
            .platforms
            .iter()
            .flat_map(|platform| {
                platform.versions.iter().flat_map(move |version| {
                    config.backends.iter().flat_map(move |backend| {
                        config
                            .architectures
                            .iter()
                            .filter(move |arch| backend.supports(arch))
                            .map(move |arch| Target {
                                distro: platform.distro.clone(),
                                version: version.clone(),
                                backend: backend.name.clone(),
                                arch: arch.clone(),
                                family: platform.family,
                            })
                    })
                })
            })
            .collect()
    }

    // The configuration is validated on load, so the MVP entries always resolve.
    fn checked(&self, distro: &str, version: &str, backend: &str, arch: &str) -> Option<Target> {
        let result = self.resolve_explicit(distro, version, backend, arch);
        debug_assert!(result.is_ok(), "{result:?}");
        result.ok()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::config::tests::example;

    fn restricted() -> MatrixConfig {
        MatrixConfig::from_yaml(
            "
library: { version: 3.10.0, release: v3.10.0 }
platforms:
  debian: [12]
architectures: [amd64, arm64]
backends:
  cpu: {}
  cuda: { architectures: [amd64] }
",
        )
        .unwrap()
    }

    #[test]
    fn every_valid_tuple_resolves_and_round_trips() {
        let config = example();
        let resolver = Resolver::new(&config);
        for platform in &config.platforms {
            for version in &platform.versions {
                for backend in &config.backends {
                    for arch in config.architectures.iter().filter(|a| backend.supports(a)) {
                        let target = resolver
                            .resolve_explicit(&platform.distro, version, &backend.name, arch)
                            .unwrap();
                        assert_eq!(
                            target.identity(),
                            (
                                platform.distro.as_str(),
                                version.as_str(),
                                backend.name.as_str(),
                                arch.as_str()
                            )
                        );
                        assert_eq!(target.family, platform.family);
                        assert_eq!(resolver.resolve_id(&target.to_string()).unwrap(), target);
                    }
                }
            }
        }
    }

    #[test]
    fn restriction_violations_use_the_dedicated_variant() {
        let config = example();
        let resolver = Resolver::new(&config);
        for platform in &config.platforms {
            for version in &platform.versions {
                for backend in &config.backends {
                    for arch in config.architectures.iter().filter(|a| !backend.supports(a)) {
                        let error = resolver
                            .resolve_explicit(&platform.distro, version, &backend.name, arch)
                            .unwrap_err();
                        assert!(
                            matches!(error.kind, ValidationErrorKind::UnsupportedArchitecture { .. }),
                            "{error}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn unknown_fields_are_named() {
        let config = restricted();
        let resolver = Resolver::new(&config);
        let kind = |d, v, b, a| resolver.resolve_explicit(d, v, b, a).unwrap_err().kind;

        assert!(matches!(kind("ubuntu", "24", "cpu", "amd64"), ValidationErrorKind::UnknownDistro { .. }));
        assert!(matches!(kind("debian", "13", "cpu", "amd64"), ValidationErrorKind::UnknownVersion { .. }));
        assert!(matches!(kind("debian", "12", "rocm", "amd64"), ValidationErrorKind::UnknownBackend { .. }));
        assert!(matches!(kind("debian", "12", "cpu", "riscv64"), ValidationErrorKind::UnknownArchitecture { .. }));
        assert_eq!(
            kind("debian", "12", "cuda", "arm64"),
            ValidationErrorKind::UnsupportedArchitecture {
                supported: vec!["amd64".to_owned()]
            }
        );
    }

    #[test]
    fn error_names_the_requested_target() {
        let config = restricted();
        let resolver = Resolver::new(&config);
        let error = resolver.resolve_explicit("debian", "12", "cuda", "arm64").unwrap_err();
        assert_eq!(error.requested, "debian 12 cuda arm64");
        assert!(error.to_string().contains("debian 12 cuda arm64"));

        let error = resolver.resolve_id("debian12-cuda-arm64").unwrap_err();
        assert_eq!(error.requested, "debian12-cuda-arm64");
    }

    #[test]
    fn resolve_id_matches_resolve_explicit() {
        let config = example();
        let resolver = Resolver::new(&config);
        assert_eq!(
            resolver.resolve_id("debian12-cpu-amd64").unwrap(),
            resolver.resolve_explicit("debian", "12", "cpu", "amd64").unwrap()
        );
    }

    #[test]
    fn resolve_id_diagnostics() {
        let config = example();
        let resolver = Resolver::new(&config);
        let kind = |id| resolver.resolve_id(id).unwrap_err().kind;

        assert_eq!(kind("debian12-cpu"), ValidationErrorKind::MalformedTarget);
        assert_eq!(kind("debian12--amd64"), ValidationErrorKind::MalformedTarget);
        assert_eq!(kind("debian-cpu-amd64"), ValidationErrorKind::MalformedTarget);
        assert_eq!(kind("12-cpu-amd64"), ValidationErrorKind::MalformedTarget);
        assert!(matches!(kind("debian13-cpu-amd64"), ValidationErrorKind::UnknownVersion { .. }));
        assert!(matches!(kind("ubuntu24-cpu-amd64"), ValidationErrorKind::UnknownDistro { .. }));
        assert!(matches!(kind("debian12-cuda-arm64"), ValidationErrorKind::UnsupportedArchitecture { .. }));
    }

    #[test]
    fn resolve_id_with_digit_suffixed_distro() {
        let config = MatrixConfig::from_yaml(
            "
library: { version: 3.10.0, release: v3.10.0 }
platforms:
  rhel: [9]
  rhel9: { family: rhel, versions: ['1'] }
architectures: [amd64]
backends: { cpu: {} }
",
        )
        .unwrap();
        let resolver = Resolver::new(&config);
        assert_eq!(resolver.resolve_id("rhel9-cpu-amd64").unwrap().distro, "rhel");
        let target = resolver.resolve_id("rhel91-cpu-amd64").unwrap();
        assert_eq!((target.distro.as_str(), target.version.as_str()), ("rhel9", "1"));
    }

    #[test]
    fn expand_mvp_follows_declaration_order() {
        let config = example();
        let resolver = Resolver::new(&config);
        let ids: Vec<String> = resolver.expand_mvp().iter().map(Target::to_string).collect();
        assert_eq!(
            ids,
            [
                "debian12-cpu-amd64",
                "debian12-cpu-arm64",
                "debian12-cuda-amd64",
                "rhel9-cpu-amd64",
                "rhel9-cpu-arm64",
            ]
        );
        assert_eq!(resolver.expand_mvp(), resolver.expand_mvp());
    }

    #[test]
    fn expand_mvp_drops_repeated_targets() {
        let config = MatrixConfig::from_yaml(
            "
library: { version: 3.10.0, release: v3.10.0 }
platforms: { debian: [12] }
architectures: [amd64, arm64]
backends: { cpu: {} }
mvp_matrix:
  - { distro: debian, version: 12, backend: cpu, architectures: [arm64] }
  - { distro: debian, version: 12, backend: cpu, architectures: [amd64, arm64] }
",
        )
        .unwrap();
        let ids: Vec<String> = Resolver::new(&config)
            .expand_mvp()
            .iter()
            .map(Target::to_string)
            .collect();
        assert_eq!(ids, ["debian12-cpu-arm64", "debian12-cpu-amd64"]);
    }

    #[test]
    fn expand_full_respects_restrictions() {
        let config = restricted();
        let targets = Resolver::new(&config).expand_full();
        let ids: Vec<String> = targets.iter().map(Target::to_string).collect();
        assert_eq!(
            ids,
            ["debian12-cpu-amd64", "debian12-cpu-arm64", "debian12-cuda-amd64"]
        );
        assert!(!ids.contains(&"debian12-cuda-arm64".to_owned()));
    }

    #[test]
    fn expand_full_is_ordered_and_unique() {
        let config = example();
        let resolver = Resolver::new(&config);
        let targets = resolver.expand_full();
        // 4 distro versions * (cpu and opencl on 2 archs + cuda and all on 1 arch)
        assert_eq!(targets.len(), 4 * 6);
        assert_eq!(targets.first().unwrap().to_string(), "debian11-cpu-amd64");
        assert_eq!(targets.last().unwrap().to_string(), "rhel9-all-amd64");
        assert_eq!(targets, resolver.expand_full());

        let root = Path::new("output");
        let dirs: HashSet<PathBuf> = targets.iter().map(|t| t.output_dir(root)).collect();
        assert_eq!(dirs.len(), targets.len());
    }

    #[test]
    fn ordering_ignores_family() {
        let a = Target {
            distro: "debian".to_owned(),
            version: "12".to_owned(),
            backend: "cpu".to_owned(),
            arch: "amd64".to_owned(),
            family: Family::Debian,
        };
        let b = Target {
            family: Family::Rhel,
            ..a.clone()
        };
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);
    }
}
