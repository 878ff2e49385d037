use std::borrow::Cow;

use log::debug;

use super::{BackendError, BuildBackend, RunOptions};
use crate::{cancellation::Cancellation, docker, plan::BuildInvocation, process, shell_quote};

pub const DEFAULT_PROGRAM: &str = "docker";

/// Builds through `docker buildx build`, exporting the final stage to the invocation's output path.
#[derive(Debug, Clone)]
pub struct DockerBackend {
    program: String,
}

impl Default for DockerBackend {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl DockerBackend {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

// Pushing both tags would send the local tag to the default registry, so only one of them is used.
fn tags(invocation: &BuildInvocation, options: RunOptions) -> [&str; 1] {
    if options.push {
        [invocation.registry_tag.as_str()]
    } else {
        [invocation.tag.as_str()]
    }
}

// This conversion is necessary because the build invocation planned for a target may differ from the build arguments
// accepted by the docker command line abstraction.
fn into_docker_args<'a>(
    invocation: &'a BuildInvocation,
    tags: &'a [&'a str],
    options: RunOptions,
) -> docker::BuildArgs<'a> {
    docker::BuildArgs {
        dockerfile: &invocation.image_definition_path,
        tags,
        platform: &invocation.platform,
        build_args: &invocation.build_args,
        output_dir: &invocation.output_path,
        push: options.push,
        context: &invocation.context_dir,
    }
}

fn from_process_error(error: process::Error) -> BackendError {
    match error.kind {
        process::ErrorKind::Cancelled => BackendError::Cancelled,
        process::ErrorKind::NonZeroExitStatus { code, tail } => BackendError::Failed {
            status: match code {
                Some(code) => format!("exit code {code}"),
                None => "terminated by a signal".to_owned(),
            },
            diagnostics: tail,
        },
        process::ErrorKind::NotFound
        | process::ErrorKind::PermissionDenied
        | process::ErrorKind::Io(_) => BackendError::Unavailable(error.to_string()),
    }
}

impl BuildBackend for DockerBackend {
    fn build(
        &self,
        invocation: &BuildInvocation,
        options: RunOptions,
        cancellation: &Cancellation,
    ) -> Result<(), BackendError> {
        let tags = tags(invocation, options);
        let label = invocation.target.to_string();
        docker::buildx_build(
            &self.program,
            &into_docker_args(invocation, &tags, options),
            &label,
            cancellation,
        )
        .map_err(from_process_error)?;
        debug!("{label}: docker build finished");
        Ok(())
    }

    fn describe(&self, invocation: &BuildInvocation, options: RunOptions) -> String {
        let tags = tags(invocation, options);
        let command =
            docker::buildx_build_command(&self.program, &into_docker_args(invocation, &tags, options));
        let words: Vec<Cow<str>> = std::iter::once(command.program())
            .chain(command.arguments())
            .map(|word| word.to_string_lossy())
            .collect();
        shell_quote::quote_join(words.iter().map(AsRef::as_ref))
    }
}
