// Pass execution - streams one pass's data onto one target range.
//
// The engine drives executors through the PassExecutor trait so scenario
// tests can substitute a recording stub and prove that vetoed or failed jobs
// never touch the target.

pub mod delegated;
pub mod direct;

#[cfg(test)]
mod exec_tests;

use crate::plan::Pass;
use crate::{CancelToken, EngineConfig, WipeResult};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// How a pass over one range ended. Cancellation is a normal outcome, not an
/// error; both variants carry the bytes durably flushed before stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Completed(u64),
    Cancelled(u64),
}

impl PassOutcome {
    pub fn bytes_written(&self) -> u64 {
        match self {
            PassOutcome::Completed(n) | PassOutcome::Cancelled(n) => *n,
        }
    }
}

/// The byte range one executor owns: a whole device, one chunk of a device,
/// or one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSpan {
    pub path: PathBuf,
    pub offset: u64,
    pub len: u64,
    /// Open with O_DIRECT; only set when offset, length and block size all
    /// satisfy the alignment the kernel requires.
    pub direct: bool,
}

impl WriteSpan {
    pub fn whole(path: impl Into<PathBuf>, len: u64, direct: bool) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            len,
            direct,
        }
    }
}

/// Shared per-job context handed to every executor.
pub struct ExecContext {
    /// Caller-requested cancellation.
    cancel: CancelToken,
    /// Raised by the coordinator when a sibling worker hit a fatal error.
    abort: CancelToken,
    progress: UnboundedSender<u64>,
}

impl ExecContext {
    pub fn new(cancel: CancelToken, abort: CancelToken, progress: UnboundedSender<u64>) -> Self {
        Self {
            cancel,
            abort,
            progress,
        }
    }

    /// Checked between buffer writes, never mid-buffer.
    pub fn stop_requested(&self) -> bool {
        self.cancel.is_cancelled() || self.abort.is_cancelled()
    }

    pub fn cancelled_by_caller(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Report durably written bytes. Disconnected sinks are ignored; late
    /// progress must not fail a finished job.
    pub fn report(&self, delta: u64) {
        if delta > 0 {
            let _ = self.progress.send(delta);
        }
    }

    /// Raw delta sender for helper threads (delegated-tool output reader).
    pub(crate) fn progress_sender(&self) -> UnboundedSender<u64> {
        self.progress.clone()
    }
}

pub trait PassExecutor: Send + Sync {
    /// Write one pass's pattern over one range.
    fn run(&self, span: &WriteSpan, pass: &Pass, ctx: &ExecContext) -> WipeResult<PassOutcome>;

    /// Hand the whole target to an external secure-erase process and block
    /// until it finishes, fails or is cancelled. `total_bytes` is the full
    /// multi-pass write volume used for progress estimation.
    fn run_delegated(
        &self,
        device: &Path,
        total_bytes: u64,
        ctx: &ExecContext,
    ) -> WipeResult<PassOutcome>;
}

/// Production executor: direct streaming writes plus shred delegation.
pub struct DefaultExecutor {
    term_grace: Duration,
    tool: PathBuf,
}

impl DefaultExecutor {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            term_grace: config.term_grace,
            tool: config.gutmann_tool.clone(),
        }
    }
}

impl PassExecutor for DefaultExecutor {
    fn run(&self, span: &WriteSpan, pass: &Pass, ctx: &ExecContext) -> WipeResult<PassOutcome> {
        direct::run_span(span, pass, ctx)
    }

    fn run_delegated(
        &self,
        device: &Path,
        total_bytes: u64,
        ctx: &ExecContext,
    ) -> WipeResult<PassOutcome> {
        delegated::run_tool(&self.tool, self.term_grace, device, total_bytes, ctx)
    }
}
