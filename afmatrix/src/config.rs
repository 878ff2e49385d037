//! The build matrix configuration.
//!
//! A [`MatrixConfig`] is decoded from a YAML document once per invocation and validated as a whole before any target is
//! resolved. After loading it is only ever borrowed.

use std::{
    fmt, io,
    path::{Path, PathBuf},
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    image_ref,
    ordered::{Ordered, Scalar},
};

pub const DEFAULT_REGISTRY: &str = "ghcr.io/dawnmagnet";
pub const DEFAULT_LIBRARY_NAME: &str = "arrayfire";
pub const DEFAULT_PACKAGE_NAME: &str = "{library}-{backend}";

/// The two families of image definitions. Every distribution belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Debian,
    Rhel,
}

impl Family {
    /// Infers the family from well known distribution names.
    pub fn from_distro(distro: &str) -> Option<Self> {
        match distro {
            "debian" | "ubuntu" => Some(Family::Debian),
            "rhel" | "rocky" | "almalinux" | "centos" | "fedora" => Some(Family::Rhel),
            _ => None,
        }
    }

    pub const fn definition_file(&self) -> &'static str {
        match self {
            Family::Debian => "Dockerfile.debian",
            Family::Rhel => "Dockerfile.rhel",
        }
    }

    /// Name of the build argument that carries the distribution version.
    pub const fn version_arg(&self) -> &'static str {
        match self {
            Family::Debian => "DEBIAN_VERSION",
            Family::Rhel => "RHEL_VERSION",
        }
    }

    /// File extension of the native package format, without the leading dot.
    pub const fn package_extension(&self) -> &'static str {
        match self {
            Family::Debian => "deb",
            Family::Rhel => "rpm",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Family::Debian => "debian",
            Family::Rhel => "rhel",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    pub name: String,
    pub version: semver::Version,
    pub release: String,
}

impl Library {
    /// The `major.minor` form of the version used in registry tags.
    pub fn short_version(&self) -> String {
        format!("{}.{}", self.version.major, self.version.minor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub distro: String,
    pub family: Family,
    pub versions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub name: String,
    pub display_name: String,
    pub dependencies: Vec<String>,
    pub compile_options: Vec<(String, String)>,
    /// Template for the registry repository, `{library}` and `{backend}` are substituted.
    pub package_name: String,
    /// Architectures this backend can be built for. `None` means every architecture.
    pub architectures: Option<Vec<String>>,
}

impl Backend {
    pub fn supports(&self, arch: &str) -> bool {
        self.architectures
            .as_ref()
            .map_or(true, |archs| archs.iter().any(|a| a == arch))
    }

    pub fn render_package_name(&self, library: &str) -> String {
        self.package_name
            .replace("{library}", library)
            .replace("{backend}", &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MvpEntry {
    pub distro: String,
    pub version: String,
    pub backend: String,
    pub architectures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixConfig {
    pub library: Library,
    pub registry: String,
    pub platforms: Vec<Platform>,
    pub architectures: Vec<String>,
    pub backends: Vec<Backend>,
    pub mvp_matrix: Vec<MvpEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse the matrix configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("library version {version:?} is not a semantic version: {source}")]
    LibraryVersion {
        version: String,
        source: semver::Error,
    },

    #[error("invalid {kind} {value:?}, expected lowercase letters, digits, '.' or '_'")]
    InvalidIdentifier { kind: &'static str, value: String },

    #[error("invalid registry {0:?}, expected a host optionally followed by lowercase path components")]
    InvalidRegistry(String),

    #[error("backend {backend:?} has package name {rendered:?} which is not a valid image repository")]
    InvalidPackageName { backend: String, rendered: String },

    #[error("cannot infer the family of distribution {0:?}, declare it with `family: debian` or `family: rhel`")]
    UnknownFamily(String),

    #[error("distribution {0:?} declares no versions")]
    NoVersions(String),

    #[error("no architectures are declared")]
    NoArchitectures,

    #[error("no backends are declared")]
    NoBackends,

    #[error("{context} declares {kind} {value:?} more than once")]
    Duplicate {
        context: String,
        kind: &'static str,
        value: String,
    },

    #[error("{context} references undefined distribution {distro:?}")]
    UndefinedDistro { context: String, distro: String },

    #[error("{context} references undefined version {version:?} of distribution {distro:?}")]
    UndefinedVersion {
        context: String,
        distro: String,
        version: String,
    },

    #[error("{context} references undefined backend {backend:?}")]
    UndefinedBackend { context: String, backend: String },

    #[error("{context} references architecture {arch:?} which is not one of the declared architectures")]
    UndefinedArchitecture { context: String, arch: String },

    #[error("{context} produces tag {tag:?} which is not a valid image tag, shorten the names involved")]
    InvalidTag { context: String, tag: String },

    #[error("{context} lists no architectures")]
    EmptyArchitectures { context: String },

    #[error("{context} requests architecture {arch:?} which backend {backend:?} does not support")]
    UnsupportedArchitecture {
        context: String,
        backend: String,
        arch: String,
    },
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(alias = "arrayfire")]
    library: RawLibrary,
    #[serde(default = "default_registry")]
    registry: String,
    platforms: Ordered<RawPlatform>,
    architectures: Vec<String>,
    backends: Ordered<RawBackend>,
    #[serde(default)]
    mvp_matrix: Vec<RawMvpEntry>,
}

fn default_registry() -> String {
    DEFAULT_REGISTRY.to_owned()
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLibrary {
    #[serde(default)]
    name: Option<String>,
    version: Scalar,
    release: Scalar,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPlatform {
    Versions(Vec<Scalar>),
    Detailed {
        family: Family,
        versions: Vec<Scalar>,
    },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBackend {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    compile_options: Ordered<Scalar>,
    #[serde(default)]
    package_name: Option<String>,
    #[serde(default)]
    architectures: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMvpEntry {
    distro: String,
    version: Scalar,
    backend: String,
    architectures: Vec<String>,
}

/// Identifiers end up in image tags and directory names and are joined with `-`, so they may not contain one.
fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_'))
}

fn check_identifier(kind: &'static str, value: &str) -> Result<(), ConfigError> {
    if is_identifier(value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier {
            kind,
            value: value.to_owned(),
        })
    }
}

fn check_unique<'a>(
    context: &str,
    kind: &'static str,
    values: impl IntoIterator<Item = &'a String>,
) -> Result<(), ConfigError> {
    let mut seen: Vec<&str> = Vec::new();
    for value in values {
        if seen.contains(&value.as_str()) {
            return Err(ConfigError::Duplicate {
                context: context.to_owned(),
                kind,
                value: value.clone(),
            });
        }
        seen.push(value);
    }
    Ok(())
}

/// Every target identity and registry tag suffix ends up as an image tag, which is limited in length.
fn check_tags(
    library: &Library,
    platforms: &[Platform],
    backends: &[Backend],
    architectures: &[String],
) -> Result<(), ConfigError> {
    let short_version = library.short_version();
    for platform in platforms {
        for version in &platform.versions {
            for backend in backends {
                for arch in architectures.iter().filter(|arch| backend.supports(arch)) {
                    let distro = &platform.distro;
                    let context = || {
                        format!("distribution {distro:?} version {version:?} with backend {:?} on {arch:?}", backend.name)
                    };
                    for tag in [
                        format!("{distro}{version}-{}-{arch}", backend.name),
                        format!("{short_version}-{distro}{version}-{arch}"),
                    ] {
                        if !image_ref::is_tag(&tag) {
                            return Err(ConfigError::InvalidTag {
                                context: context(),
                                tag,
                            });
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

impl MatrixConfig {
    /// Reads and validates the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("loading matrix configuration from {path:?}");
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_yaml(&source)
    }

    pub fn from_yaml(source: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(source)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let library = {
            let RawLibrary {
                name,
                version,
                release,
            } = raw.library;
            let version = version.0;
            Library {
                name: name.unwrap_or_else(|| DEFAULT_LIBRARY_NAME.to_owned()),
                version: semver::Version::parse(&version)
                    .map_err(|source| ConfigError::LibraryVersion { version, source })?,
                release: release.0,
            }
        };
        if !image_ref::is_repository(&library.name) {
            return Err(ConfigError::InvalidIdentifier {
                kind: "library name",
                value: library.name,
            });
        }

        if !image_ref::is_registry(&raw.registry) {
            return Err(ConfigError::InvalidRegistry(raw.registry));
        }

        if raw.architectures.is_empty() {
            return Err(ConfigError::NoArchitectures);
        }
        for arch in &raw.architectures {
            check_identifier("architecture", arch)?;
        }
        check_unique("architectures", "architecture", &raw.architectures)?;
        let architectures = raw.architectures;

        let platforms = raw
            .platforms
            .into_entries()
            .into_iter()
            .map(|(distro, platform)| {
                check_identifier("distribution", &distro)?;
                let (family, versions) = match platform {
                    RawPlatform::Versions(versions) => (
                        Family::from_distro(&distro)
                            .ok_or_else(|| ConfigError::UnknownFamily(distro.clone()))?,
                        versions,
                    ),
                    RawPlatform::Detailed { family, versions } => (family, versions),
                };
                let versions: Vec<String> = versions.into_iter().map(String::from).collect();
                if versions.is_empty() {
                    return Err(ConfigError::NoVersions(distro));
                }
                for version in &versions {
                    check_identifier("version", version)?;
                }
                check_unique(&format!("distribution {distro:?}"), "version", &versions)?;
                Ok(Platform {
                    distro,
                    family,
                    versions,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let backends = raw
            .backends
            .into_entries()
            .into_iter()
            .map(|(name, backend)| {
                check_identifier("backend", &name)?;
                let context = format!("backend {name:?}");
                if let Some(archs) = &backend.architectures {
                    if archs.is_empty() {
                        return Err(ConfigError::EmptyArchitectures { context });
                    }
                    for arch in archs {
                        if !architectures.contains(arch) {
                            return Err(ConfigError::UndefinedArchitecture {
                                context,
                                arch: arch.clone(),
                            });
                        }
                    }
                    check_unique(&context, "architecture", archs)?;
                }
                let backend = Backend {
                    display_name: backend.name.unwrap_or_else(|| name.clone()),
                    dependencies: backend.dependencies,
                    compile_options: backend
                        .compile_options
                        .into_entries()
                        .into_iter()
                        .map(|(key, value)| (key, value.0))
                        .collect(),
                    package_name: backend
                        .package_name
                        .unwrap_or_else(|| DEFAULT_PACKAGE_NAME.to_owned()),
                    architectures: backend.architectures,
                    name,
                };
                let rendered = backend.render_package_name(&library.name);
                if !image_ref::is_repository(&rendered) {
                    return Err(ConfigError::InvalidPackageName {
                        backend: backend.name,
                        rendered,
                    });
                }
                Ok(backend)
            })
            .collect::<Result<Vec<_>, _>>()?;
        if backends.is_empty() {
            return Err(ConfigError::NoBackends);
        }

        check_tags(&library, &platforms, &backends, &architectures)?;

        let mvp_matrix = raw
            .mvp_matrix
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                let context = format!("mvp_matrix entry {index}");
                let RawMvpEntry {
                    distro,
                    version,
                    backend,
                    architectures: entry_archs,
                } = entry;
                let version = version.0;

                let platform = platforms
                    .iter()
                    .find(|platform| platform.distro == distro)
                    .ok_or_else(|| ConfigError::UndefinedDistro {
                        context: context.clone(),
                        distro: distro.clone(),
                    })?;
                if !platform.versions.contains(&version) {
                    return Err(ConfigError::UndefinedVersion {
                        context,
                        distro,
                        version,
                    });
                }
                let backend_config = backends
                    .iter()
                    .find(|candidate| candidate.name == backend)
                    .ok_or_else(|| ConfigError::UndefinedBackend {
                        context: context.clone(),
                        backend: backend.clone(),
                    })?;
                if entry_archs.is_empty() {
                    return Err(ConfigError::EmptyArchitectures { context });
                }
                for arch in &entry_archs {
                    if !architectures.contains(arch) {
                        return Err(ConfigError::UndefinedArchitecture {
                            context,
                            arch: arch.clone(),
                        });
                    }
                    if !backend_config.supports(arch) {
                        return Err(ConfigError::UnsupportedArchitecture {
                            context,
                            backend,
                            arch: arch.clone(),
                        });
                    }
                }
                check_unique(&context, "architecture", &entry_archs)?;

                Ok(MvpEntry {
                    distro,
                    version,
                    backend,
                    architectures: entry_archs,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "loaded {} platforms, {} backends, {} architectures and {} mvp entries",
            platforms.len(),
            backends.len(),
            architectures.len(),
            mvp_matrix.len()
        );

        Ok(MatrixConfig {
            library,
            registry: raw.registry,
            platforms,
            architectures,
            backends,
            mvp_matrix,
        })
    }

    pub fn platform(&self, distro: &str) -> Option<&Platform> {
        self.platforms.iter().find(|p| p.distro == distro)
    }

    pub fn backend(&self, name: &str) -> Option<&Backend> {
        self.backends.iter().find(|b| b.name == name)
    }
}
