use super::*;
use crate::plan::{Pass, Pattern};
use crate::{CancelToken, EngineConfig, WipeError};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

fn context() -> (ExecContext, UnboundedReceiver<u64>, CancelToken) {
    let (tx, rx) = unbounded_channel();
    let cancel = CancelToken::new();
    let ctx = ExecContext::new(cancel.clone(), CancelToken::new(), tx);
    (ctx, rx, cancel)
}

fn pass(pattern: Pattern, block_size: usize) -> Pass {
    Pass {
        index: 0,
        total: 1,
        pattern,
        block_size,
    }
}

fn drain(rx: &mut UnboundedReceiver<u64>) -> u64 {
    let mut total = 0;
    while let Ok(delta) = rx.try_recv() {
        total += delta;
    }
    total
}

fn temp_target(content: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn zero_pass_overwrites_every_byte() {
    let target = temp_target(&[0xAA; 10_000]);
    let span = WriteSpan::whole(target.path(), 10_000, false);
    let (ctx, mut rx, _) = context();

    let outcome = direct::run_span(&span, &pass(Pattern::Zero, 4096), &ctx).unwrap();

    assert_eq!(outcome, PassOutcome::Completed(10_000));
    assert_eq!(drain(&mut rx), 10_000);
    let content = std::fs::read(target.path()).unwrap();
    assert!(content.iter().all(|&b| b == 0x00));
}

#[test]
fn one_pass_writes_ff() {
    let target = temp_target(&[0x00; 4096]);
    let span = WriteSpan::whole(target.path(), 4096, false);
    let (ctx, _rx, _) = context();

    direct::run_span(&span, &pass(Pattern::One, 1024), &ctx).unwrap();

    let content = std::fs::read(target.path()).unwrap();
    assert!(content.iter().all(|&b| b == 0xFF));
}

#[test]
fn random_pass_replaces_content() {
    let target = temp_target(&[0x00; 8192]);
    let span = WriteSpan::whole(target.path(), 8192, false);
    let (ctx, _rx, _) = context();

    direct::run_span(&span, &pass(Pattern::Random, 4096), &ctx).unwrap();

    let content = std::fs::read(target.path()).unwrap();
    // 8 KiB of output from a seeded generator is never all one value
    assert!(content.iter().any(|&b| b != 0x00));
}

#[test]
fn fixed_pattern_repeats_across_the_span() {
    let target = temp_target(&[0x00; 10]);
    let span = WriteSpan::whole(target.path(), 10, false);
    let (ctx, _rx, _) = context();

    direct::run_span(&span, &pass(Pattern::Fixed(&[0x92, 0x49, 0x24]), 4), &ctx).unwrap();

    let content = std::fs::read(target.path()).unwrap();
    let expected: Vec<u8> = [0x92u8, 0x49, 0x24]
        .iter()
        .cycle()
        .take(10)
        .copied()
        .collect();
    assert_eq!(content, expected);
}

#[test]
fn span_offsets_confine_the_writer_to_its_chunk() {
    let target = temp_target(&[0xAA; 12_288]);
    let span = WriteSpan {
        path: target.path().to_path_buf(),
        offset: 4096,
        len: 4096,
        direct: false,
    };
    let (ctx, _rx, _) = context();

    direct::run_span(&span, &pass(Pattern::Zero, 4096), &ctx).unwrap();

    let content = std::fs::read(target.path()).unwrap();
    assert!(content[..4096].iter().all(|&b| b == 0xAA), "before chunk untouched");
    assert!(content[4096..8192].iter().all(|&b| b == 0x00), "chunk zeroed");
    assert!(content[8192..].iter().all(|&b| b == 0xAA), "after chunk untouched");
}

#[test]
fn pre_cancelled_run_writes_nothing() {
    let target = temp_target(&[0xAA; 4096]);
    let span = WriteSpan::whole(target.path(), 4096, false);
    let (ctx, mut rx, cancel) = context();
    cancel.cancel();

    let outcome = direct::run_span(&span, &pass(Pattern::Zero, 1024), &ctx).unwrap();

    assert_eq!(outcome, PassOutcome::Cancelled(0));
    assert_eq!(drain(&mut rx), 0);
    let content = std::fs::read(target.path()).unwrap();
    assert!(content.iter().all(|&b| b == 0xAA), "no bytes may be touched");
}

#[test]
fn missing_target_is_unavailable_not_a_write_failure() {
    let span = WriteSpan::whole("/nonexistent/wipe-target", 4096, false);
    let (ctx, _rx, _) = context();

    let err = direct::run_span(&span, &pass(Pattern::Zero, 1024), &ctx).unwrap_err();
    assert!(matches!(err, WipeError::TargetUnavailable { .. }));
}

#[test]
fn empty_span_completes_without_touching_the_file() {
    let span = WriteSpan::whole("/nonexistent/wipe-target", 0, false);
    let (ctx, _rx, _) = context();

    let outcome = direct::run_span(&span, &pass(Pattern::Zero, 1024), &ctx).unwrap();
    assert_eq!(outcome, PassOutcome::Completed(0));
}

fn fake_tool(script: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fake-shred");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    (dir, path)
}

#[test]
fn delegated_success_reports_the_full_volume() {
    let (_dir, tool) = fake_tool("#!/bin/sh\nexit 0\n");
    let target = temp_target(&[0u8; 16]);
    let (ctx, mut rx, _) = context();

    let executor = DefaultExecutor::new(&EngineConfig {
        gutmann_tool: tool,
        ..Default::default()
    });
    let outcome = executor
        .run_delegated(target.path(), 35 * 16, &ctx)
        .unwrap();

    assert_eq!(outcome, PassOutcome::Completed(35 * 16));
    assert_eq!(drain(&mut rx), 35 * 16);
}

#[test]
fn delegated_nonzero_exit_is_execution_failure() {
    let (_dir, tool) = fake_tool("#!/bin/sh\nexit 3\n");
    let target = temp_target(&[0u8; 16]);
    let (ctx, _rx, _) = context();

    let executor = DefaultExecutor::new(&EngineConfig {
        gutmann_tool: tool,
        ..Default::default()
    });
    let err = executor
        .run_delegated(target.path(), 35 * 16, &ctx)
        .unwrap_err();

    assert!(matches!(err, WipeError::ExecutionFailed { .. }));
}

#[test]
fn delegated_cancellation_terminates_the_child() {
    let (_dir, tool) = fake_tool("#!/bin/sh\nsleep 30\n");
    let target = temp_target(&[0u8; 16]);
    let (ctx, _rx, cancel) = context();
    cancel.cancel();

    let executor = DefaultExecutor::new(&EngineConfig {
        gutmann_tool: tool,
        ..Default::default()
    });
    let started = std::time::Instant::now();
    let outcome = executor
        .run_delegated(target.path(), 35 * 16, &ctx)
        .unwrap();

    assert_eq!(outcome, PassOutcome::Cancelled(0));
    assert!(
        started.elapsed() < std::time::Duration::from_secs(10),
        "cancellation must not wait out the child's sleep"
    );
}
