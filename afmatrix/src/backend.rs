mod docker;

pub use docker::*;

use crate::{cancellation::Cancellation, plan::BuildInvocation};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Push the built image to the registry in addition to exporting its files.
    pub push: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend could not be started at all.
    #[error("{0}")]
    Unavailable(String),

    #[error("container build failed ({status})")]
    Failed { status: String, diagnostics: String },

    #[error("container build was cancelled")]
    Cancelled,
}

impl BackendError {
    /// The message together with whatever diagnostic output the backend produced.
    pub fn detail(&self) -> String {
        match self {
            BackendError::Failed { diagnostics, .. } if !diagnostics.is_empty() => {
                format!("{self}\n{diagnostics}")
            }
            _ => self.to_string(),
        }
    }
}

/// Runs container builds. This is the only place the engine talks to the outside world to build images, so tests can
/// substitute their own implementation.
pub trait BuildBackend: Sync {
    /// Builds the image described by `invocation`, writing its files to the invocation's output path. Returns once the
    /// build has finished, or early with [`BackendError::Cancelled`] once `cancellation` triggers.
    fn build(
        &self,
        invocation: &BuildInvocation,
        options: RunOptions,
        cancellation: &Cancellation,
    ) -> Result<(), BackendError>;

    /// Renders the command `build` would run, for display.
    fn describe(&self, invocation: &BuildInvocation, options: RunOptions) -> String;
}
