// Allow uppercase acronyms for industry-standard terms like DoD
#![allow(clippy::upper_case_acronyms)]

pub mod chunks;
pub mod device;
pub mod engine;
pub mod exec;
pub mod io;
pub mod locate;
pub mod plan;
pub mod progress;
pub mod report;
pub mod safety;

// Re-export the main engine entry points for convenience
pub use engine::{wipe_device, JobHandle, Outcome, WipeEngine, WipeSummary};
pub use safety::{SafetyClassifier, SafetyVerdict};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Cooperative cancellation signal shared by a job's coordinator and all of
/// its workers. Cloning shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Workers stop at their next check point.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The raw flag, for wiring up signal handlers.
    pub fn as_flag(&self) -> Arc<AtomicBool> {
        self.flag.clone()
    }
}

// Enhanced error types for better error handling
#[derive(Error, Debug)]
pub enum WipeError {
    #[error("target unavailable: {path}: {reason}")]
    TargetUnavailable { path: PathBuf, reason: String },

    #[error("write failed on {path} at offset {offset}: {source}")]
    WriteFailed {
        path: PathBuf,
        offset: u64,
        source: std::io::Error,
    },

    #[error("delegated command failed: {command}: {reason}")]
    ExecutionFailed { command: String, reason: String },

    #[error("target {path} already has an active wipe job")]
    TargetBusy { path: PathBuf },

    #[error("mount table unavailable: {0}")]
    MountTable(String),

    #[error("internal engine failure: {0}")]
    Internal(String),
}

impl WipeError {
    pub fn unavailable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        WipeError::TargetUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

// Manual Clone implementation because std::io::Error doesn't implement Clone
impl Clone for WipeError {
    fn clone(&self) -> Self {
        match self {
            WipeError::TargetUnavailable { path, reason } => WipeError::TargetUnavailable {
                path: path.clone(),
                reason: reason.clone(),
            },
            WipeError::WriteFailed {
                path,
                offset,
                source,
            } => WipeError::WriteFailed {
                path: path.clone(),
                offset: *offset,
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            WipeError::ExecutionFailed { command, reason } => WipeError::ExecutionFailed {
                command: command.clone(),
                reason: reason.clone(),
            },
            WipeError::TargetBusy { path } => WipeError::TargetBusy { path: path.clone() },
            WipeError::MountTable(s) => WipeError::MountTable(s.clone()),
            WipeError::Internal(s) => WipeError::Internal(s.clone()),
        }
    }
}

pub type WipeResult<T> = Result<T, WipeError>;

/// What is being destroyed: a whole block device or an ordered set of files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Device { path: PathBuf },
    FileSet { paths: Vec<PathBuf> },
}

impl Target {
    pub fn device(path: impl Into<PathBuf>) -> Self {
        Target::Device { path: path.into() }
    }

    pub fn files(paths: Vec<PathBuf>) -> Self {
        Target::FileSet { paths }
    }

    /// Human-readable identifier used in summaries and log lines.
    pub fn describe(&self) -> String {
        match self {
            Target::Device { path } => path.display().to_string(),
            Target::FileSet { paths } => format!("{} files", paths.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WipeMethod {
    /// N passes of 0x00
    Zeros,
    /// N passes of pseudorandom data
    Random,
    /// DoD 5220.22-M: zero, one, random, in that order
    DoD5220,
    /// 35-pass Gutmann, delegated to an external secure-erase tool
    Gutmann,
    /// Single pseudorandom pass fanned out across concurrent chunk writers
    ParallelRandom { workers: usize },
    /// Single zero pass blasted from one large reusable in-memory buffer
    Lightning,
}

impl WipeMethod {
    pub fn name(&self) -> &'static str {
        match self {
            WipeMethod::Zeros => "zeros",
            WipeMethod::Random => "random",
            WipeMethod::DoD5220 => "dod",
            WipeMethod::Gutmann => "gutmann",
            WipeMethod::ParallelRandom { .. } => "parallel",
            WipeMethod::Lightning => "lightning",
        }
    }
}

/// Per-job options supplied by the caller alongside the method.
#[derive(Debug, Clone, Default)]
pub struct WipeOptions {
    /// Override the configured pass count (Zeros/Random only).
    pub passes: Option<u32>,
    /// Unlink each file of a file-set target after its final pass.
    pub remove_files: bool,
}

/// Engine-wide configuration. Constructed explicitly by the caller and passed
/// into [`engine::WipeEngine::new`]; there is no process-global state.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Default pass count for Zeros/Random
    pub default_passes: u32,
    /// Upper bound on chunk workers for parallel methods
    pub max_workers: usize,
    /// Open block devices with O_DIRECT where alignment allows
    pub use_direct_io: bool,
    /// Minimum interval between samples forwarded to the progress sink
    pub progress_interval: Duration,
    /// Grace period between SIGTERM and SIGKILL for delegated processes
    pub term_grace: Duration,
    /// Buffer size for the Lightning method
    pub lightning_buffer: usize,
    /// External secure-erase tool for the Gutmann method
    pub gutmann_tool: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_passes: 3,
            max_workers: std::cmp::min(8, num_cpus::get()),
            use_direct_io: true,
            progress_interval: Duration::from_millis(200),
            term_grace: Duration::from_secs(2),
            lightning_buffer: 512 * 1024 * 1024,
            gutmann_tool: PathBuf::from("shred"),
        }
    }
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn cancel_token_is_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn cancel_token_flag_feeds_signal_handlers() {
        let token = CancelToken::new();
        token.as_flag().store(true, Ordering::SeqCst);
        assert!(token.is_cancelled());
    }

    #[test]
    fn method_names_are_stable_cli_words() {
        assert_eq!(WipeMethod::Zeros.name(), "zeros");
        assert_eq!(WipeMethod::DoD5220.name(), "dod");
        assert_eq!(WipeMethod::ParallelRandom { workers: 4 }.name(), "parallel");
        assert_eq!(WipeMethod::Lightning.name(), "lightning");
    }

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_passes, 3);
        assert!(config.max_workers >= 1 && config.max_workers <= 8);
        assert_eq!(config.term_grace, Duration::from_secs(2));
        assert_eq!(config.gutmann_tool, PathBuf::from("shred"));
    }

    #[test]
    fn target_describe_shows_device_path_or_file_count() {
        let dev = Target::device("/dev/sdb");
        assert_eq!(dev.describe(), "/dev/sdb");

        let files = Target::files(vec![PathBuf::from("/tmp/a"), PathBuf::from("/tmp/b")]);
        assert_eq!(files.describe(), "2 files");
    }
}
