pub(crate) mod docker;
pub(crate) mod image_ref;
pub(crate) mod ordered;
pub(crate) mod process;
pub(crate) mod shell_quote;

pub mod artifact;
pub mod backend;
pub mod cancellation;
pub mod cli;
pub mod config;
pub mod executor;
pub mod plan;
pub mod target;

pub(crate) type Result<T, E = Box<dyn std::error::Error + Send + Sync + 'static>> =
    std::result::Result<T, E>;
