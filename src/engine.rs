// Wipe engine - drives the job state machine from submission to a terminal
// outcome.
//
// One coordinating task owns the job: it runs the safety check, expands the
// method into passes, fans each pass out to blocking writer tasks, feeds a
// single progress tracker from their increments, and never starts pass k+1
// before every worker of pass k has returned.

use crate::chunks::{clamp_workers, default_alignment, partition};
use crate::exec::{DefaultExecutor, ExecContext, PassExecutor, PassOutcome, WriteSpan};
use crate::plan::{plan_passes, Execution, Pass, PassPlan};
use crate::progress::{ProgressSample, ProgressTracker};
use crate::safety::{MountSource, ProcMounts, SafetyClassifier};
use crate::{
    device, CancelToken, EngineConfig, Target, WipeError, WipeMethod, WipeOptions, WipeResult,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::os::unix::fs::FileTypeExt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Job lifecycle. Blocked, Cancelled, Failed and Completed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Created,
    Planning,
    Blocked,
    Running,
    Cancelled,
    Failed,
    Completed,
}

/// Book-keeping for one wipe job. Owned exclusively by the engine's
/// coordinator task; nothing else holds a mutable handle.
#[derive(Debug)]
struct WipeJob {
    id: Uuid,
    target: String,
    state: JobState,
    pass_index: usize,
}

impl WipeJob {
    fn new(id: Uuid, target: &Target) -> Self {
        Self {
            id,
            target: target.describe(),
            state: JobState::Created,
            pass_index: 0,
        }
    }

    fn transition(&mut self, state: JobState) {
        log::debug!(
            "job {} ({}): {:?} -> {:?}",
            self.id,
            self.target,
            self.state,
            state
        );
        self.state = state;
    }
}

/// Everything a report generator needs, with nothing left to re-derive.
#[derive(Debug, Clone, Serialize)]
pub struct WipeSummary {
    pub job_id: Uuid,
    pub target: String,
    pub method: WipeMethod,
    pub pass_count: usize,
    pub bytes_written: u64,
    pub elapsed_secs: f64,
    pub average_mb_s: f64,
    pub peak_mb_s: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Completed(WipeSummary),
    /// Safety veto: a deliberate non-write outcome, not an error.
    Blocked { reasons: Vec<String> },
    Cancelled {
        bytes_written: u64,
        elapsed: Duration,
    },
    Failed {
        error: WipeError,
        bytes_written: u64,
    },
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn bytes_written(&self) -> u64 {
        match self {
            Outcome::Completed(summary) => summary.bytes_written,
            Outcome::Cancelled { bytes_written, .. } => *bytes_written,
            Outcome::Failed { bytes_written, .. } => *bytes_written,
            Outcome::Blocked { .. } => 0,
        }
    }
}

/// Handle to a submitted job.
pub struct JobHandle {
    pub id: Uuid,
    cancel: CancelToken,
    task: tokio::task::JoinHandle<Outcome>,
}

impl JobHandle {
    /// Request cancellation; the job winds down and ends `Cancelled` once
    /// every in-flight worker has returned.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn wait(self) -> Outcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => Outcome::Failed {
                error: WipeError::Internal(format!("job task failed: {}", e)),
                bytes_written: 0,
            },
        }
    }
}

pub struct WipeEngine {
    config: EngineConfig,
    executor: Arc<dyn PassExecutor>,
    classifier: Arc<SafetyClassifier>,
    active: Arc<Mutex<HashSet<PathBuf>>>,
}

impl WipeEngine {
    pub fn new(config: EngineConfig) -> Self {
        let executor = Arc::new(DefaultExecutor::new(&config));
        Self::with_parts(config, executor, Arc::new(ProcMounts))
    }

    /// Engine with substituted collaborators, the seam the scenario tests
    /// use to record writes and fake mount tables.
    pub fn with_parts(
        config: EngineConfig,
        executor: Arc<dyn PassExecutor>,
        mounts: Arc<dyn MountSource>,
    ) -> Self {
        Self {
            config,
            executor,
            classifier: Arc::new(SafetyClassifier::new(mounts)),
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Submit a wipe job. Must be called from within a tokio runtime.
    ///
    /// Device targets are exclusively owned for the job's lifetime; a second
    /// submit against an active target is refused with `TargetBusy`.
    pub fn submit(
        &self,
        target: Target,
        method: WipeMethod,
        options: WipeOptions,
        progress_sink: Option<mpsc::Sender<ProgressSample>>,
        cancel: CancelToken,
    ) -> WipeResult<JobHandle> {
        let owned_path = match &target {
            Target::Device { path } => {
                let mut active = self.active.lock().unwrap();
                if !active.insert(path.clone()) {
                    return Err(WipeError::TargetBusy { path: path.clone() });
                }
                Some(path.clone())
            }
            Target::FileSet { .. } => None,
        };

        let id = Uuid::new_v4();
        let runner = JobRunner {
            id,
            target,
            method,
            options,
            config: self.config.clone(),
            executor: self.executor.clone(),
            classifier: self.classifier.clone(),
            cancel: cancel.clone(),
            sink: progress_sink,
        };

        let active = self.active.clone();
        let task = tokio::spawn(async move {
            let _release = ReleaseGuard {
                active,
                path: owned_path,
            };
            runner.run().await
        });

        Ok(JobHandle { id, cancel, task })
    }
}

/// Removes the target from the active set even if the job task panics.
struct ReleaseGuard {
    active: Arc<Mutex<HashSet<PathBuf>>>,
    path: Option<PathBuf>,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            if let Ok(mut active) = self.active.lock() {
                active.remove(path);
            }
        }
    }
}

/// Convenience wrapper for one-shot device wipes.
pub async fn wipe_device(path: &str, method: WipeMethod, config: EngineConfig) -> Outcome {
    let engine = WipeEngine::new(config);
    match engine.submit(
        Target::device(path),
        method,
        WipeOptions::default(),
        None,
        CancelToken::new(),
    ) {
        Ok(handle) => handle.wait().await,
        Err(error) => Outcome::Failed {
            error,
            bytes_written: 0,
        },
    }
}

/// Byte ranges a job writes: a single device span or one span per file.
struct TargetLayout {
    spans: Vec<(PathBuf, u64)>,
    total_len: u64,
    /// True only for real block devices; gates O_DIRECT.
    block_device: bool,
}

enum RunEnd {
    Completed,
    Cancelled,
    Failed(WipeError),
}

struct JobRunner {
    id: Uuid,
    target: Target,
    method: WipeMethod,
    options: WipeOptions,
    config: EngineConfig,
    executor: Arc<dyn PassExecutor>,
    classifier: Arc<SafetyClassifier>,
    cancel: CancelToken,
    sink: Option<mpsc::Sender<ProgressSample>>,
}

impl JobRunner {
    async fn run(self) -> Outcome {
        let started_at = Utc::now();
        let mut job = WipeJob::new(self.id, &self.target);
        log::info!(
            "job {}: wiping {} with method {}",
            job.id,
            job.target,
            self.method.name()
        );

        job.transition(JobState::Planning);

        // The veto runs first, before the size is even queried. Verdicts
        // are computed fresh for every submission.
        if let Target::Device { path } = &self.target {
            let classifier = self.classifier.clone();
            let device_path = path.clone();
            let verdict =
                match tokio::task::spawn_blocking(move || classifier.classify(&device_path)).await {
                    Ok(verdict) => verdict,
                    Err(e) => {
                        job.transition(JobState::Failed);
                        return Outcome::Failed {
                            error: WipeError::Internal(format!("classifier task failed: {}", e)),
                            bytes_written: 0,
                        };
                    }
                };

            if !verdict.safe {
                log::warn!("job {}: blocked by safety veto: {:?}", job.id, verdict.reasons);
                job.transition(JobState::Blocked);
                return Outcome::Blocked {
                    reasons: verdict.reasons,
                };
            }
        }

        let layout = match self.resolve_layout().await {
            Ok(layout) => layout,
            Err(error) => {
                job.transition(JobState::Failed);
                return Outcome::Failed {
                    error,
                    bytes_written: 0,
                };
            }
        };

        let plan = plan_passes(&self.method, &self.options, &self.config);
        let total_bytes = layout.total_len * plan.pass_count as u64;

        let (delta_tx, delta_rx) = mpsc::unbounded_channel::<u64>();
        let aggregator = tokio::spawn(aggregate_progress(
            delta_rx,
            total_bytes,
            self.sink.clone(),
            self.config.progress_interval,
        ));

        job.transition(JobState::Running);
        let end = self.run_passes(&mut job, &plan, &layout, delta_tx).await;

        // All delta senders are gone once the passes return; the aggregator
        // drains what is left and reports the final counters.
        let stats = aggregator.await.unwrap_or_default();
        let finished_at = Utc::now();

        match end {
            RunEnd::Completed => {
                job.transition(JobState::Completed);
                log::info!(
                    "job {}: completed, {} bytes in {:.1}s",
                    job.id,
                    stats.bytes_written,
                    stats.elapsed.as_secs_f64()
                );
                Outcome::Completed(WipeSummary {
                    job_id: job.id,
                    target: job.target.clone(),
                    method: self.method.clone(),
                    pass_count: plan.pass_count,
                    bytes_written: stats.bytes_written,
                    elapsed_secs: stats.elapsed.as_secs_f64(),
                    average_mb_s: stats.average_mb_s,
                    peak_mb_s: stats.peak_mb_s,
                    started_at,
                    finished_at,
                })
            }
            RunEnd::Cancelled => {
                job.transition(JobState::Cancelled);
                log::info!(
                    "job {}: cancelled during pass {} after {} bytes",
                    job.id,
                    job.pass_index + 1,
                    stats.bytes_written
                );
                Outcome::Cancelled {
                    bytes_written: stats.bytes_written,
                    elapsed: stats.elapsed,
                }
            }
            RunEnd::Failed(error) => {
                job.transition(JobState::Failed);
                log::error!("job {}: failed: {}", job.id, error);
                Outcome::Failed {
                    error,
                    bytes_written: stats.bytes_written,
                }
            }
        }
    }

    async fn resolve_layout(&self) -> WipeResult<TargetLayout> {
        match &self.target {
            Target::Device { path } => {
                let probe_path = path.clone();
                let size = tokio::task::spawn_blocking(move || device::probe_size(&probe_path))
                    .await
                    .map_err(|e| WipeError::Internal(format!("size probe failed: {}", e)))??;
                if size == 0 {
                    return Err(WipeError::unavailable(path, "device reports zero size"));
                }

                let block_device = std::fs::metadata(path)
                    .map(|m| m.file_type().is_block_device())
                    .unwrap_or(false);

                Ok(TargetLayout {
                    spans: vec![(path.clone(), size)],
                    total_len: size,
                    block_device,
                })
            }
            Target::FileSet { paths } => {
                if paths.is_empty() {
                    return Err(WipeError::Internal("empty file set".to_string()));
                }
                let mut spans = Vec::with_capacity(paths.len());
                let mut total = 0u64;
                for path in paths {
                    let metadata = std::fs::metadata(path).map_err(|e| {
                        WipeError::unavailable(path, format!("cannot stat: {}", e))
                    })?;
                    spans.push((path.clone(), metadata.len()));
                    total += metadata.len();
                }
                Ok(TargetLayout {
                    spans,
                    total_len: total,
                    block_device: false,
                })
            }
        }
    }

    async fn run_passes(
        &self,
        job: &mut WipeJob,
        plan: &PassPlan,
        layout: &TargetLayout,
        delta_tx: mpsc::UnboundedSender<u64>,
    ) -> RunEnd {
        if plan.execution == Execution::Delegated {
            return self.run_delegated(plan, layout, delta_tx).await;
        }

        match &self.target {
            Target::Device { .. } => self.run_device(job, plan, layout, delta_tx).await,
            Target::FileSet { .. } => self.run_fileset(job, plan, layout, delta_tx).await,
        }
    }

    /// Device wipe: passes strictly in order; within a pass, optionally
    /// fanned out over disjoint chunks.
    async fn run_device(
        &self,
        job: &mut WipeJob,
        plan: &PassPlan,
        layout: &TargetLayout,
        delta_tx: mpsc::UnboundedSender<u64>,
    ) -> RunEnd {
        let (path, size) = &layout.spans[0];

        for pass in &plan.passes {
            if self.cancel.is_cancelled() {
                return RunEnd::Cancelled;
            }
            job.pass_index = pass.index;
            log::info!(
                "job {}: pass {}/{}: {}",
                job.id,
                pass.index + 1,
                pass.total,
                pass.pattern.describe()
            );

            let spans = self.pass_spans(path, *size, layout.block_device, plan);
            match self.fan_out(spans, pass, &delta_tx).await {
                RunEnd::Completed => continue,
                other => return other,
            }
        }

        RunEnd::Completed
    }

    /// Spans for one pass: the whole device, or one chunk per worker.
    fn pass_spans(
        &self,
        path: &PathBuf,
        size: u64,
        block_device: bool,
        plan: &PassPlan,
    ) -> Vec<WriteSpan> {
        let direct_ok = self.config.use_direct_io && block_device;

        match plan.execution {
            Execution::Chunked { workers } => {
                let workers = clamp_workers(workers, self.config.max_workers);
                partition(size, workers, default_alignment())
                    .into_iter()
                    .map(|chunk| WriteSpan {
                        path: path.clone(),
                        offset: chunk.start,
                        len: chunk.len,
                        direct: direct_ok && chunk.aligned,
                    })
                    .collect()
            }
            _ => vec![WriteSpan::whole(
                path.clone(),
                size,
                direct_ok && size % crate::io::SECTOR_SIZE as u64 == 0,
            )],
        }
    }

    /// Run one pass's spans concurrently and wait for all of them. The
    /// first fatal error raises the pass-abort signal for its siblings,
    /// then surfaces once every worker has returned.
    async fn fan_out(
        &self,
        spans: Vec<WriteSpan>,
        pass: &Pass,
        delta_tx: &mpsc::UnboundedSender<u64>,
    ) -> RunEnd {
        let abort = CancelToken::new();

        let workers = spans.into_iter().map(|span| {
            let executor = self.executor.clone();
            let pass = pass.clone();
            let ctx = ExecContext::new(self.cancel.clone(), abort.clone(), delta_tx.clone());
            let abort = abort.clone();
            tokio::task::spawn_blocking(move || match executor.run(&span, &pass, &ctx) {
                Ok(outcome) => Ok(outcome),
                Err(e) => {
                    abort.cancel();
                    Err(e)
                }
            })
        });

        let mut outcomes = Vec::new();
        for joined in join_all(workers).await {
            match joined {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(error)) => return RunEnd::Failed(error),
                Err(e) => {
                    return RunEnd::Failed(WipeError::Internal(format!(
                        "worker task failed: {}",
                        e
                    )))
                }
            }
        }

        if outcomes
            .iter()
            .any(|o| matches!(o, PassOutcome::Cancelled(_)))
        {
            return RunEnd::Cancelled;
        }

        RunEnd::Completed
    }

    /// File sets are wiped file-by-file: all passes over one file, then the
    /// optional unlink, then the next file. Files are independent resources,
    /// so no cross-file ordering is promised.
    async fn run_fileset(
        &self,
        job: &mut WipeJob,
        plan: &PassPlan,
        layout: &TargetLayout,
        delta_tx: mpsc::UnboundedSender<u64>,
    ) -> RunEnd {
        for (path, len) in &layout.spans {
            for pass in &plan.passes {
                if self.cancel.is_cancelled() {
                    return RunEnd::Cancelled;
                }
                job.pass_index = pass.index;

                let span = WriteSpan::whole(path.clone(), *len, false);
                match self.fan_out(vec![span], pass, &delta_tx).await {
                    RunEnd::Completed => continue,
                    other => return other,
                }
            }

            if self.options.remove_files {
                if let Err(e) = std::fs::remove_file(path) {
                    log::warn!("could not remove {} after wiping: {}", path.display(), e);
                }
            }
        }

        RunEnd::Completed
    }

    /// Hand the whole target to the external tool, one call per span.
    async fn run_delegated(
        &self,
        plan: &PassPlan,
        layout: &TargetLayout,
        delta_tx: mpsc::UnboundedSender<u64>,
    ) -> RunEnd {
        for (path, len) in &layout.spans {
            if self.cancel.is_cancelled() {
                return RunEnd::Cancelled;
            }

            let executor = self.executor.clone();
            let target = path.clone();
            let total = len * plan.pass_count as u64;
            let ctx = ExecContext::new(self.cancel.clone(), CancelToken::new(), delta_tx.clone());

            let joined = tokio::task::spawn_blocking(move || {
                executor.run_delegated(&target, total, &ctx)
            })
            .await;

            match joined {
                Ok(Ok(PassOutcome::Completed(_))) => continue,
                Ok(Ok(PassOutcome::Cancelled(_))) => return RunEnd::Cancelled,
                Ok(Err(error)) => return RunEnd::Failed(error),
                Err(e) => {
                    return RunEnd::Failed(WipeError::Internal(format!(
                        "delegated task failed: {}",
                        e
                    )))
                }
            }
        }

        RunEnd::Completed
    }
}

#[derive(Debug, Default)]
struct FinalStats {
    bytes_written: u64,
    elapsed: Duration,
    average_mb_s: f64,
    peak_mb_s: f64,
}

/// Funnel worker increments into one tracker and forward coalesced samples
/// to the caller's sink at a bounded rate. Runs until every delta sender is
/// dropped, then flushes a final sample.
async fn aggregate_progress(
    mut delta_rx: mpsc::UnboundedReceiver<u64>,
    total_bytes: u64,
    sink: Option<mpsc::Sender<ProgressSample>>,
    interval: Duration,
) -> FinalStats {
    let mut tracker = ProgressTracker::new(total_bytes);
    let mut last_emit: Option<Instant> = None;

    while let Some(delta) = delta_rx.recv().await {
        let sample = tracker.observe(delta);

        if let Some(sink) = &sink {
            let due = last_emit.map_or(true, |t| t.elapsed() >= interval);
            if due {
                // A slow consumer drops samples rather than stalling writes
                let _ = sink.try_send(sample);
                last_emit = Some(Instant::now());
            }
        }
    }

    if let Some(sink) = &sink {
        let _ = sink.try_send(tracker.sample());
    }

    FinalStats {
        bytes_written: tracker.bytes_written(),
        elapsed: tracker.elapsed(),
        average_mb_s: tracker.average_mb_s(),
        peak_mb_s: tracker.peak_mb_s(),
    }
}
