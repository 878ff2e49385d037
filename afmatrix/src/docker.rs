use std::{ffi::OsString, path::Path};

use crate::{cancellation::Cancellation, process};

pub struct BuildArgs<'a> {
    pub dockerfile: &'a Path,
    pub tags: &'a [&'a str],
    /// Platform in `os/arch` form.
    pub platform: &'a str,
    pub build_args: &'a [(String, String)],
    /// Host directory that receives the files of the final build stage.
    pub output_dir: &'a Path,
    pub push: bool,
    pub context: &'a Path,
}

/// Assembles `docker buildx build` for the provided arguments without running it.
pub fn buildx_build_command(program: &str, args: &BuildArgs) -> process::Command {
    let mut rest: Vec<OsString> = Vec::new();

    for tag in args.tags {
        rest.push("--tag".into());
        rest.push(tag.into());
    }

    rest.push("--platform".into());
    rest.push(args.platform.into());

    for (name, value) in args.build_args {
        rest.push("--build-arg".into());
        rest.push(format!("{name}={value}").into());
    }

    // https://docs.docker.com/build/exporters/local-tar/
    rest.push("--output".into());
    rest.push({
        let mut value = OsString::from("type=local,dest=");
        value.push(args.output_dir);
        value
    });

    if args.push {
        rest.push("--push".into());
    }

    rest.push(args.context.into());

    process::command!(program, "buildx", "build", "--file", args.dockerfile)
        .args(rest.iter().map(OsString::as_os_str))
}

pub fn buildx_build(
    program: &str,
    args: &BuildArgs,
    label: &str,
    cancellation: &Cancellation,
) -> Result<process::Completed, process::Error> {
    buildx_build_command(program, args)
        .run_logged(label, cancellation)?
        .require_success()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_order() {
        let build_args = [("BACKEND".to_owned(), "cpu".to_owned())];
        let command = buildx_build_command(
            "docker",
            &BuildArgs {
                dockerfile: Path::new("docker/Dockerfile.debian"),
                tags: &["arrayfire:debian12-cpu-amd64"],
                platform: "linux/amd64",
                build_args: &build_args,
                output_dir: Path::new("output/debian12-cpu-amd64"),
                push: true,
                context: Path::new("docker"),
            },
        );
        let args: Vec<_> = command
            .arguments()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(command.program(), "docker");
        assert_eq!(
            args,
            [
                "buildx",
                "build",
                "--file",
                "docker/Dockerfile.debian",
                "--tag",
                "arrayfire:debian12-cpu-amd64",
                "--platform",
                "linux/amd64",
                "--build-arg",
                "BACKEND=cpu",
                "--output",
                "type=local,dest=output/debian12-cpu-amd64",
                "--push",
                "docker",
            ]
        );
    }
}
