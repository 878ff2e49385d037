use std::{num::NonZeroUsize, path::PathBuf};

use clap::Args;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use constcat::concat;
use log::{info, warn};

use super::common::{self, Context, Outcome, Selection, TargetSelector, DEFAULT_OUTPUT_DIR};
use crate::{
    backend::{DockerBackend, RunOptions},
    cancellation::Cancellation,
    executor::{BuildStatus, Executor, Mode, RunSummary},
    plan::{self, BuildInvocation},
    Result,
};

#[derive(Debug, Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub selector: TargetSelector,

    /// Print the build commands instead of running them.
    #[arg(long = "dry-run", default_value_t)]
    pub dry_run: bool,

    /// Tag the images for the registry and push them after building.
    #[arg(long = "push", default_value_t)]
    pub push: bool,

    /// The maximum number of builds running at the same time.
    #[arg(short = 'j', long = "jobs", default_value = "1")]
    pub jobs: NonZeroUsize,

    #[arg(long = "output-dir", default_value = DEFAULT_OUTPUT_DIR, help = concat!("Root directory receiving the packages of each target in a subdirectory named after the target, e.g. \"", DEFAULT_OUTPUT_DIR, "/debian12-cpu-amd64\"."))]
    pub output_dir: PathBuf,

    /// Registry to tag and push the images for, overriding the configured one.
    #[arg(long = "registry", value_parser = common::registry)]
    pub registry: Option<String>,
}

pub fn build(context: &Context, args: BuildArgs) -> Result<Outcome> {
    let BuildArgs {
        selector,
        dry_run,
        push,
        jobs,
        output_dir,
        registry,
    } = args;

    let selection = selector.resolve(context.resolver());
    if selection.targets.is_empty() {
        warn!("no targets to build");
        return Ok(selection.empty_outcome());
    }

    let settings = context.settings(&output_dir, registry.as_deref());
    let invocations: Vec<BuildInvocation> = selection
        .targets
        .iter()
        .map(|target| plan::plan(target, &settings))
        .collect();

    let mode = if dry_run { Mode::Dry } else { Mode::Live };
    let cancellation = Cancellation::new();
    if mode == Mode::Live {
        cancellation.cancel_on_ctrlc()?;
    }

    let backend = DockerBackend::default();
    let executor = Executor::new(&backend, RunOptions { push }, cancellation);
    info!(
        "{} {} target(s) with {jobs} job(s)",
        if dry_run { "planning" } else { "building" },
        invocations.len()
    );
    let summary = executor.run_all(&invocations, mode, jobs);

    if mode == Mode::Live {
        print_summary(&summary);
    }

    Ok(outcome(&selection, &summary))
}

fn outcome(selection: &Selection, summary: &RunSummary) -> Outcome {
    if summary.was_cancelled() {
        Outcome::Cancelled
    } else if summary.failed() > 0 {
        Outcome::Failed
    } else if !selection.invalid.is_empty() {
        Outcome::Invalid
    } else {
        Outcome::Success
    }
}

fn print_summary(summary: &RunSummary) {
    let mut table = Table::new();
    table
        .load_preset(comfy_table::presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            ["target", "status", "packages", "error"]
                .map(|name| Cell::new(name).add_attribute(Attribute::Bold)),
        );

    for result in &summary.results {
        let status = match result.status {
            BuildStatus::Succeeded => Cell::new("passed").fg(Color::Green),
            BuildStatus::Failed => Cell::new("failed").fg(Color::Red),
            BuildStatus::Cancelled => Cell::new("cancelled").fg(Color::Yellow),
        };
        let packages = result
            .artifacts
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy())
            .collect::<Vec<_>>()
            .join("\n");
        table.add_row([
            Cell::new(&result.target),
            status,
            Cell::new(packages),
            Cell::new(result.error_detail.as_deref().unwrap_or_default()),
        ]);
    }
    for target in &summary.skipped {
        table.add_row([
            Cell::new(target),
            Cell::new("skipped").fg(Color::Yellow),
            Cell::new(""),
            Cell::new(""),
        ]);
    }

    println!("{table}");
    println!(
        "Passed {}/{}",
        summary.succeeded(),
        summary.results.len() + summary.skipped.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::tests::example,
        executor::BuildResult,
        target::{Resolver, Target},
    };

    fn targets(ids: &[&str]) -> Vec<Target> {
        let config = example();
        let resolver = Resolver::new(&config);
        ids.iter().map(|id| resolver.resolve_id(id).unwrap()).collect()
    }

    fn result(target: Target, status: BuildStatus) -> BuildResult {
        BuildResult {
            target,
            status,
            artifacts: Vec::new(),
            error_detail: None,
        }
    }

    fn selection(invalid: bool) -> Selection {
        let config = example();
        let mut invalid_selections = Vec::new();
        if invalid {
            invalid_selections.push(
                Resolver::new(&config)
                    .resolve_id("debian12-cuda-arm64")
                    .unwrap_err(),
            );
        }
        Selection {
            targets: Vec::new(),
            invalid: invalid_selections,
        }
    }

    #[test]
    fn partial_failure_fails_the_run() {
        let [a, b, c] = <[Target; 3]>::try_from(targets(&[
            "debian12-cpu-amd64",
            "debian12-cuda-amd64",
            "rhel9-cpu-amd64",
        ]))
        .unwrap();
        let summary = RunSummary {
            results: vec![
                result(a, BuildStatus::Succeeded),
                result(b, BuildStatus::Failed),
                result(c, BuildStatus::Succeeded),
            ],
            skipped: Vec::new(),
        };
        assert_eq!(outcome(&selection(false), &summary), Outcome::Failed);
        assert_eq!(outcome(&selection(true), &summary), Outcome::Failed);
    }

    #[test]
    fn invalid_selection_is_reported_after_successful_builds() {
        let [a] = <[Target; 1]>::try_from(targets(&["debian12-cpu-amd64"])).unwrap();
        let summary = RunSummary {
            results: vec![result(a, BuildStatus::Succeeded)],
            skipped: Vec::new(),
        };
        assert_eq!(outcome(&selection(false), &summary), Outcome::Success);
        assert_eq!(outcome(&selection(true), &summary), Outcome::Invalid);
    }

    #[test]
    fn cancellation_takes_precedence() {
        let [a, b] =
            <[Target; 2]>::try_from(targets(&["debian12-cpu-amd64", "rhel9-cpu-amd64"])).unwrap();
        let summary = RunSummary {
            results: vec![result(a, BuildStatus::Failed)],
            skipped: vec![b],
        };
        assert_eq!(outcome(&selection(false), &summary), Outcome::Cancelled);
    }
}
