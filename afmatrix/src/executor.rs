use std::{
    fs,
    num::NonZeroUsize,
    path::PathBuf,
    sync::{Mutex, PoisonError},
    thread,
};

use log::{debug, error, info, warn};

use crate::{
    artifact,
    backend::{BackendError, BuildBackend, RunOptions},
    cancellation::Cancellation,
    plan::BuildInvocation,
    target::Target,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Print the build commands without running them.
    Dry,
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    pub target: Target,
    pub status: BuildStatus,
    /// Packages the build produced. Empty unless the build succeeded.
    pub artifacts: Vec<PathBuf>,
    pub error_detail: Option<String>,
}

impl BuildResult {
    fn succeeded(target: Target, artifacts: Vec<PathBuf>) -> Self {
        Self {
            target,
            status: BuildStatus::Succeeded,
            artifacts,
            error_detail: None,
        }
    }

    fn failed(target: Target, detail: String) -> Self {
        Self {
            target,
            status: BuildStatus::Failed,
            artifacts: Vec::new(),
            error_detail: Some(detail),
        }
    }

    fn cancelled(target: Target) -> Self {
        Self {
            target,
            status: BuildStatus::Cancelled,
            artifacts: Vec::new(),
            error_detail: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == BuildStatus::Succeeded
    }
}

/// The outcome of a batch of builds.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// One result per started target, sorted by target.
    pub results: Vec<BuildResult>,
    /// Targets that were never started because the run was cancelled, in submission order.
    pub skipped: Vec<Target>,
}

impl RunSummary {
    fn count(&self, status: BuildStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(BuildStatus::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(BuildStatus::Failed)
    }

    pub fn cancelled(&self) -> usize {
        self.count(BuildStatus::Cancelled)
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled() > 0 || !self.skipped.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.skipped.is_empty() && self.results.iter().all(BuildResult::is_success)
    }
}

pub struct Executor<'a> {
    backend: &'a dyn BuildBackend,
    options: RunOptions,
    cancellation: Cancellation,
}

impl<'a> Executor<'a> {
    pub fn new(backend: &'a dyn BuildBackend, options: RunOptions, cancellation: Cancellation) -> Self {
        Self {
            backend,
            options,
            cancellation,
        }
    }

    /// Runs a single build. Failures are recorded in the result, never returned.
    pub fn run(&self, invocation: &BuildInvocation, mode: Mode) -> BuildResult {
        if mode == Mode::Live && self.cancellation.is_cancelled() {
            return BuildResult::cancelled(invocation.target.clone());
        }
        self.start(invocation, mode)
    }

    fn start(&self, invocation: &BuildInvocation, mode: Mode) -> BuildResult {
        let target = invocation.target.clone();

        if mode == Mode::Dry {
            println!("{}", self.backend.describe(invocation, self.options));
            return if invocation.is_complete() {
                BuildResult::succeeded(target, Vec::new())
            } else {
                BuildResult::failed(target, "the build invocation is incomplete".to_owned())
            };
        }

        // The backend exports into this directory and requires it to exist.
        if let Err(error) = fs::create_dir_all(&invocation.output_path) {
            let detail = format!(
                "failed to create output directory {:?}: {error}",
                invocation.output_path
            );
            error!("{target}: {detail}");
            return BuildResult::failed(target, detail);
        }

        info!("{target}: building...");
        match self
            .backend
            .build(invocation, self.options, &self.cancellation)
        {
            Ok(()) => match artifact::discover_in(&invocation.output_path, target.family) {
                Ok(artifacts) => {
                    info!("{target}: build succeeded with {} package(s)", artifacts.len());
                    for artifact in &artifacts {
                        debug!("{target}: produced {artifact:?}");
                    }
                    BuildResult::succeeded(target, artifacts)
                }
                Err(error) => {
                    let detail = format!(
                        "the build succeeded but listing {:?} failed: {error}",
                        invocation.output_path
                    );
                    error!("{target}: {detail}");
                    BuildResult::failed(target, detail)
                }
            },
            Err(BackendError::Cancelled) => {
                warn!("{target}: build cancelled");
                BuildResult::cancelled(target)
            }
            Err(error) => {
                error!("{target}: {error}");
                BuildResult::failed(target, error.detail())
            }
        }
    }

    /// Runs every invocation on at most `jobs` workers. A failing build does not stop the others. After cancellation no
    /// new builds are started and the remaining targets are reported as skipped.
    pub fn run_all(&self, invocations: &[BuildInvocation], mode: Mode, jobs: NonZeroUsize) -> RunSummary {
        let queue = Mutex::new(invocations.iter().enumerate());
        let collected = Mutex::new(Vec::with_capacity(invocations.len()));
        let skipped = Mutex::new(Vec::new());
        let workers = jobs.get().min(invocations.len());
        debug!(
            "running {} build(s) on {workers} worker(s)",
            invocations.len()
        );

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let next = queue
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .next();
                    let Some((index, invocation)) = next else {
                        break;
                    };
                    // A target taken after cancellation is never started, the remaining queue drains into skipped.
                    if self.cancellation.is_cancelled() {
                        skipped
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push((index, invocation.target.clone()));
                        continue;
                    }
                    let result = self.start(invocation, mode);
                    collected
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(result);
                });
            }
        });

        let mut results = collected
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        // Results arrive in completion order.
        results.sort_by(|a, b| a.target.cmp(&b.target));

        let mut skipped = skipped.into_inner().unwrap_or_else(PoisonError::into_inner);
        skipped.sort_by_key(|(index, _)| *index);
        let skipped = skipped.into_iter().map(|(_, target)| target).collect();

        RunSummary { results, skipped }
    }
}
