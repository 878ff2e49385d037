//! Validation of the pieces of container image references, based on the grammar of
//! [reference.go](https://github.com/distribution/distribution/blob/v2.7.1/reference/reference.go):
//!
//! ```text
//! reference        := name [ ":" tag ]
//! name             := [domain '/'] path-component ['/' path-component]*
//! domain           := domain-component ['.' domain-component]* [':' port-number]
//! domain-component := /([a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])/
//! port-number      := /[0-9]+/
//! path-component   := alpha-numeric [separator alpha-numeric]*
//! alpha-numeric    := /[a-z0-9]+/
//! separator        := /[_.]|__|[-]*/
//! tag              := /[\w][\w.-]{0,127}/
//! ```
//!
//! Digests are never composed by this tool and are therefore not supported.

use std::sync::LazyLock;

use regex::Regex;

const DOMAIN: &str = r"[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?)*(?::[0-9]+)?";
const PATH_COMPONENT: &str = r"[a-z0-9]+(?:(?:[_.]|__|-+)[a-z0-9]+)*";

static REGISTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{DOMAIN}(?:/{PATH_COMPONENT})*$")).unwrap());

static REPOSITORY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{PATH_COMPONENT}(?:/{PATH_COMPONENT})*$")).unwrap()
});

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\w][\w.-]{0,127}$").unwrap());

/// Returns true if `value` is a registry host optionally followed by path components, like `ghcr.io/dawnmagnet`.
pub fn is_registry(value: &str) -> bool {
    REGISTRY.is_match(value)
}

/// Returns true if `value` is a repository name without registry, like `arrayfire-cuda`.
pub fn is_repository(value: &str) -> bool {
    REPOSITORY.is_match(value)
}

pub fn is_tag(value: &str) -> bool {
    TAG.is_match(value)
}

/// Joins the parts of an image reference. The parts are expected to be valid.
pub fn compose(registry: Option<&str>, repository: &str, tag: &str) -> String {
    debug_assert!(registry.map_or(true, is_registry), "{registry:?}");
    debug_assert!(is_repository(repository), "{repository:?}");
    debug_assert!(is_tag(tag), "{tag:?}");

    match registry {
        Some(registry) => format!("{registry}/{repository}:{tag}"),
        None => format!("{repository}:{tag}"),
    }
}
