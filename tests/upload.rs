#![cfg(unix)]

use rclone_tray::transfer::{
    self, CancellationGate, Destination, TransferCommand, TransferDriver, TransferEvent, TransferJob,
    TransferMode,
};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Stand-in for rclone: logs its arguments, prints two progress lines, and
/// misbehaves for a few magic file names.
const FAKE_RCLONE: &str = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/calls.log"
name=$(basename "$2")
echo "Transferred:   	          0 B / 0 B, -, 0 B/s, ETA -"
echo " *  $name: 50% /10Mi, 5Mi/s, 1s"
case "$name" in
  slow*) exec sleep 30 ;;
  broken*) echo "ERROR : $name: failed to copy" >&2; exit 3 ;;
  latin*) printf ' *  caf\351.mp4: 10%% /10Mi, 1Mi/s, 9s\n'; printf 'NOTICE: caf\351.mp4: renamed\n' >&2 ;;
esac
echo " *  $name: 100% /10Mi, 6Mi/s, 0s"
echo "NOTICE: $name: done" >&2
exit 0
"#;

struct Fixture {
    dir: TempDir,
    command: TransferCommand,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("rclone");
    std::fs::write(&script, FAKE_RCLONE).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    let command = TransferCommand {
        program: script.display().to_string(),
        buffer_size: "1G".to_string(),
        stats: "1s".to_string(),
    };
    Fixture { dir, command }
}

impl Fixture {
    fn file(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"payload").unwrap();
        path
    }

    fn job(&self, names: &[&str], mode: TransferMode) -> TransferJob {
        TransferJob {
            files: names.iter().map(|n| self.file(n)).collect(),
            destination: Destination::new("Cloud Volume", "uploads"),
            mode,
        }
    }

    fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

async fn next(rx: &mut mpsc::Receiver<TransferEvent>) -> TransferEvent {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed early")
}

async fn collect(mut rx: mpsc::Receiver<TransferEvent>) -> Vec<TransferEvent> {
    let mut events = Vec::new();
    while let Some(event) = tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out draining events")
    {
        events.push(event);
    }
    events
}

fn kinds(events: &[TransferEvent]) -> Vec<String> {
    events
        .iter()
        .map(|e| match e {
            TransferEvent::FileStart { index, .. } => format!("start {index}"),
            TransferEvent::FileProgress { index, progress } => {
                format!("progress {index} {}", progress.percent)
            }
            TransferEvent::FileDone { index, .. } => format!("done {index}"),
            TransferEvent::FileCancelled { index } => format!("cancelled {index}"),
            TransferEvent::FileFailed { index, .. } => format!("failed {index}"),
            TransferEvent::AllDone { completed } => format!("all done {completed}"),
        })
        .collect()
}

#[tokio::test]
async fn test_files_upload_in_order() {
    let fx = fixture();
    let job = fx.job(&["a.mp4", "b.mp4"], TransferMode::Copy);
    let (tx, rx) = transfer::event_channel();
    let driver = TransferDriver::new(fx.command.clone(), Arc::new(CancellationGate::new()), tx);

    let handle = driver.spawn(job);
    let events = collect(rx).await;
    assert_eq!(handle.await.unwrap(), 2);

    assert_eq!(
        kinds(&events),
        vec![
            "start 0",
            "progress 0 50%",
            "progress 0 100%",
            "done 0",
            "start 1",
            "progress 1 50%",
            "progress 1 100%",
            "done 1",
            "all done 2",
        ]
    );
    assert_eq!(
        events[0],
        TransferEvent::FileStart {
            index: 0,
            name: "a.mp4".to_string()
        }
    );
    assert_eq!(
        events[3],
        TransferEvent::FileDone {
            index: 0,
            speed: Some("6Mi/s".to_string()),
            size: Some("10Mi".to_string()),
        }
    );
}

#[tokio::test]
async fn test_command_line_passed_to_tool() {
    let fx = fixture();
    let job = fx.job(&["clip.mkv"], TransferMode::Move);
    let source = job.files[0].clone();
    let (tx, rx) = transfer::event_channel();
    TransferDriver::new(fx.command.clone(), Arc::new(CancellationGate::new()), tx)
        .run(job)
        .await;
    drop(rx);

    assert_eq!(
        fx.calls(),
        vec![format!(
            "move {} Cloud Volume:uploads --progress --buffer-size 1G --stats 1s",
            source.display()
        )]
    );
}

#[tokio::test]
async fn test_cancel_skips_to_next_file() {
    let fx = fixture();
    let job = fx.job(&["slow.mp4", "b.mp4"], TransferMode::Copy);
    let gate = Arc::new(CancellationGate::new());
    let (tx, mut rx) = transfer::event_channel();
    let handle = TransferDriver::new(fx.command.clone(), Arc::clone(&gate), tx).spawn(job);

    assert!(matches!(next(&mut rx).await, TransferEvent::FileStart { index: 0, .. }));
    assert!(matches!(next(&mut rx).await, TransferEvent::FileProgress { index: 0, .. }));
    let running = gate.current().expect("file 0 should be in flight");
    assert_eq!(running.index, 0);
    assert!(gate.cancel());

    let rest = collect(rx).await;
    assert_eq!(
        kinds(&rest),
        vec![
            "cancelled 0",
            "start 1",
            "progress 1 50%",
            "progress 1 100%",
            "done 1",
            "all done 1",
        ]
    );
    assert_eq!(handle.await.unwrap(), 1);
    assert!(!gate.is_cancelled());
}

#[tokio::test]
async fn test_failed_file_does_not_stop_pipeline() {
    let fx = fixture();
    let job = fx.job(&["broken.mp4", "ok.mp4"], TransferMode::Copy);
    let (tx, rx) = transfer::event_channel();
    let handle =
        TransferDriver::new(fx.command.clone(), Arc::new(CancellationGate::new()), tx).spawn(job);

    let events = collect(rx).await;
    assert_eq!(handle.await.unwrap(), 1);
    assert_eq!(
        kinds(&events),
        vec![
            "start 0",
            "progress 0 50%",
            "failed 0",
            "start 1",
            "progress 1 50%",
            "progress 1 100%",
            "done 1",
            "all done 1",
        ]
    );
    match &events[2] {
        TransferEvent::FileFailed { reason, .. } => assert!(reason.contains("exit"), "{reason}"),
        other => panic!("expected FileFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_output_that_is_not_utf8_keeps_streaming() {
    let fx = fixture();
    let job = fx.job(&["latin.mp4"], TransferMode::Copy);
    let (tx, rx) = transfer::event_channel();
    let handle =
        TransferDriver::new(fx.command.clone(), Arc::new(CancellationGate::new()), tx).spawn(job);

    let events = collect(rx).await;
    assert_eq!(handle.await.unwrap(), 1);
    assert_eq!(
        kinds(&events),
        vec![
            "start 0",
            "progress 0 50%",
            "progress 0 10%",
            "progress 0 100%",
            "done 0",
            "all done 1",
        ]
    );
    match &events[2] {
        TransferEvent::FileProgress { progress, .. } => assert_eq!(progress.eta.as_deref(), Some("9s")),
        other => panic!("expected FileProgress, got {other:?}"),
    }
}

#[tokio::test]
async fn test_abort_stops_after_current_file() {
    let fx = fixture();
    let job = fx.job(&["slow-1.mp4", "slow-2.mp4", "c.mp4"], TransferMode::Copy);
    let gate = Arc::new(CancellationGate::new());
    let (tx, mut rx) = transfer::event_channel();
    let handle = TransferDriver::new(fx.command.clone(), Arc::clone(&gate), tx).spawn(job);

    assert!(matches!(next(&mut rx).await, TransferEvent::FileStart { index: 0, .. }));
    assert!(matches!(next(&mut rx).await, TransferEvent::FileProgress { index: 0, .. }));
    gate.abort();

    let rest = collect(rx).await;
    assert_eq!(kinds(&rest), vec!["cancelled 0", "all done 0"]);
    assert_eq!(handle.await.unwrap(), 0);
    assert_eq!(fx.calls().len(), 1);
}

#[tokio::test]
async fn test_cancel_after_finish_is_ignored() {
    let fx = fixture();
    let job = fx.job(&["a.mp4"], TransferMode::Copy);
    let gate = Arc::new(CancellationGate::new());
    let (tx, rx) = transfer::event_channel();
    TransferDriver::new(fx.command.clone(), Arc::clone(&gate), tx)
        .run(job)
        .await;
    drop(rx);
    assert!(!gate.cancel());
    assert!(gate.current().is_none());
}
