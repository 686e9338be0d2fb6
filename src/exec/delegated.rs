// Delegated execution of an external secure-erase tool.
//
// The executor owns the child process for its whole lifetime. Progress is
// estimated from the tool's verbose output; cancellation asks the process to
// terminate, waits out a bounded grace period, then kills it.

use super::{ExecContext, PassOutcome};
use crate::plan::GUTMANN_PASSES;
use crate::{WipeError, WipeResult};
use lazy_static::lazy_static;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use regex::Regex;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

lazy_static! {
    // shred -v reports e.g. "shred: /dev/sdb: pass 3/36 (random)...1.0GiB/5.0GiB 20%"
    static ref PASS_LINE: Regex = Regex::new(r"pass (?P<pass>\d+)/(?P<total>\d+)").unwrap();
    static ref PERCENT: Regex = Regex::new(r"(?P<pct>\d+)%").unwrap();
}

pub fn run_tool(
    tool: &Path,
    grace: Duration,
    device: &Path,
    total_bytes: u64,
    ctx: &ExecContext,
) -> WipeResult<PassOutcome> {
    let command_line = format!(
        "{} -v -n {} -z {}",
        tool.display(),
        GUTMANN_PASSES,
        device.display()
    );

    let mut child = Command::new(tool)
        .arg("-v")
        .arg("-n")
        .arg(GUTMANN_PASSES.to_string())
        .arg("-z")
        .arg(device)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| WipeError::ExecutionFailed {
            command: command_line.clone(),
            reason: format!("spawn failed: {}", e),
        })?;

    // Bytes already credited to the progress sink, shared with the reader.
    let reported = Arc::new(AtomicU64::new(0));
    let reader = child.stderr.take().map(|stderr| {
        let reported = reported.clone();
        let progress = ctx.progress_sender();
        std::thread::spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                if let Some(estimate) = estimate_bytes(&line, total_bytes) {
                    let prior = reported.load(Ordering::SeqCst);
                    if estimate > prior {
                        reported.store(estimate, Ordering::SeqCst);
                        let _ = progress.send(estimate - prior);
                    }
                }
            }
        })
    });

    loop {
        let status = child.try_wait().map_err(|e| WipeError::ExecutionFailed {
            command: command_line.clone(),
            reason: format!("wait failed: {}", e),
        })?;

        if let Some(status) = status {
            if let Some(handle) = reader {
                let _ = handle.join();
            }
            let credited = reported.load(Ordering::SeqCst);

            return if status.success() {
                // Top off whatever the output parsing undercounted
                ctx.report(total_bytes.saturating_sub(credited));
                Ok(PassOutcome::Completed(total_bytes))
            } else if ctx.stop_requested() {
                Ok(PassOutcome::Cancelled(credited))
            } else {
                Err(WipeError::ExecutionFailed {
                    command: command_line,
                    reason: format!("exited with {}", status),
                })
            };
        }

        if ctx.stop_requested() {
            terminate_with_grace(&mut child, grace);
            if let Some(handle) = reader {
                let _ = handle.join();
            }
            return Ok(PassOutcome::Cancelled(reported.load(Ordering::SeqCst)));
        }

        std::thread::sleep(POLL_INTERVAL);
    }
}

/// SIGTERM first; SIGKILL once the grace period runs out.
fn terminate_with_grace(child: &mut Child, grace: Duration) {
    let pid = Pid::from_raw(child.id() as i32);
    let _ = kill(pid, Signal::SIGTERM);

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    log::warn!("delegated process ignored SIGTERM, escalating to SIGKILL");
    let _ = child.kill();
    let _ = child.wait();
}

/// Overall byte estimate for one verbose output line, against the full
/// multi-pass write volume.
fn estimate_bytes(line: &str, total_bytes: u64) -> Option<u64> {
    let caps = PASS_LINE.captures(line)?;
    let pass: u64 = caps["pass"].parse().ok()?;
    let total_passes: u64 = caps["total"].parse().ok()?;
    if pass == 0 || total_passes == 0 {
        return None;
    }

    let pct: f64 = PERCENT
        .captures(line)
        .and_then(|c| c["pct"].parse().ok())
        .unwrap_or(0.0);

    let fraction = ((pass - 1) as f64 + pct / 100.0) / total_passes as f64;
    Some((fraction.clamp(0.0, 1.0) * total_bytes as f64) as u64)
}
