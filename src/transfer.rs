use crate::config::UploadConfig;
use crate::progress::{ProgressFields, ProgressParser};
use crate::sys;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Keep the originals.
    #[default]
    Copy,
    /// Delete the originals once uploaded.
    Move,
}

impl TransferMode {
    pub fn as_arg(&self) -> &'static str {
        match self {
            TransferMode::Copy => "copy",
            TransferMode::Move => "move",
        }
    }

    pub fn past_tense(&self) -> &'static str {
        match self {
            TransferMode::Copy => "Copied",
            TransferMode::Move => "Moved",
        }
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

/// `<remote>:<folder>`; an empty folder is the remote root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub remote: String,
    pub folder: String,
}

impl Destination {
    pub fn new(remote: impl Into<String>, folder: impl AsRef<str>) -> Self {
        Self {
            remote: remote.into(),
            folder: folder.as_ref().trim().trim_matches('/').to_string(),
        }
    }

    pub fn spec(&self) -> String {
        format!("{}:{}", self.remote, self.folder)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec())
    }
}

#[derive(Debug, Clone)]
pub struct TransferJob {
    pub files: Vec<PathBuf>,
    pub destination: Destination,
    pub mode: TransferMode,
}

impl TransferJob {
    pub fn display_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    }

    pub fn display_names(&self) -> Vec<String> {
        self.files.iter().map(|f| Self::display_name(f)).collect()
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    FileStart {
        index: usize,
        name: String,
    },
    FileProgress {
        index: usize,
        progress: ProgressFields,
    },
    FileDone {
        index: usize,
        speed: Option<String>,
        size: Option<String>,
    },
    FileCancelled {
        index: usize,
    },
    FileFailed {
        index: usize,
        reason: String,
    },
    AllDone {
        completed: usize,
    },
}

impl TransferEvent {
    pub fn index(&self) -> Option<usize> {
        match self {
            TransferEvent::FileStart { index, .. }
            | TransferEvent::FileProgress { index, .. }
            | TransferEvent::FileDone { index, .. }
            | TransferEvent::FileCancelled { index }
            | TransferEvent::FileFailed { index, .. } => Some(*index),
            TransferEvent::AllDone { .. } => None,
        }
    }
}

pub fn event_channel() -> (mpsc::Sender<TransferEvent>, mpsc::Receiver<TransferEvent>) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

// ---------------------------------------------------------------------------
// CancellationGate
// ---------------------------------------------------------------------------

/// Shared between the driver and whoever may cancel: the presenter's key
/// handler or its exit path.
#[derive(Debug, Default)]
pub struct CancellationGate {
    cancel: AtomicBool,
    aborted: AtomicBool,
    current: Mutex<Option<Running>>,
    notify: Notify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Running {
    pub index: usize,
    pub pid: Option<u32>,
}

impl CancellationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the file in flight. Returns false when nothing is running, in
    /// which case the request is dropped rather than hitting the next file.
    pub fn cancel(&self) -> bool {
        if self.current().is_none() {
            return false;
        }
        self.cancel.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        true
    }

    /// Cancel the file in flight and run no further files.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        self.cancel.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Option<Running> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolves once the cancel flag is set.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    fn enter(&self, index: usize, pid: Option<u32>) {
        if !self.is_aborted() {
            self.cancel.store(false, Ordering::SeqCst);
        }
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(Running { index, pid });
    }

    fn leave(&self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
        if !self.is_aborted() {
            self.cancel.store(false, Ordering::SeqCst);
        }
    }
}

// ---------------------------------------------------------------------------
// TransferCommand
// ---------------------------------------------------------------------------

/// `<tool> <copy|move> <source> <remote:folder> --progress --buffer-size .. --stats ..`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCommand {
    pub program: String,
    pub buffer_size: String,
    pub stats: String,
}

impl TransferCommand {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            program: config.rclone.clone(),
            buffer_size: config.buffer_size.clone(),
            stats: config.stats.clone(),
        }
    }

    pub fn args(&self, mode: TransferMode, source: &Path, destination: &Destination) -> Vec<OsString> {
        vec![
            mode.as_arg().into(),
            source.as_os_str().to_owned(),
            destination.spec().into(),
            "--progress".into(),
            "--buffer-size".into(),
            self.buffer_size.clone().into(),
            "--stats".into(),
            self.stats.clone().into(),
        ]
    }

    fn command(&self, mode: TransferMode, source: &Path, destination: &Destination) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args(mode, source, destination))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        sys::configure_hidden_cmd(&mut cmd);
        cmd
    }
}

// ---------------------------------------------------------------------------
// TransferDriver
// ---------------------------------------------------------------------------

enum FileOutcome {
    Done(Option<ProgressFields>),
    Cancelled,
    Failed(String),
}

/// Runs one transfer subprocess per file, strictly one after another.
pub struct TransferDriver {
    command: TransferCommand,
    parser: ProgressParser,
    gate: Arc<CancellationGate>,
    events: mpsc::Sender<TransferEvent>,
}

impl TransferDriver {
    pub fn new(
        command: TransferCommand,
        gate: Arc<CancellationGate>,
        events: mpsc::Sender<TransferEvent>,
    ) -> Self {
        Self {
            command,
            parser: ProgressParser::new(),
            gate,
            events,
        }
    }

    pub fn spawn(self, job: TransferJob) -> JoinHandle<usize> {
        tokio::spawn(self.run(job))
    }

    /// Returns the number of files that finished successfully. `AllDone` is
    /// always the last event sent.
    pub async fn run(self, job: TransferJob) -> usize {
        let mut completed = 0;
        info!(
            files = job.files.len(),
            destination = %job.destination,
            mode = %job.mode,
            "upload started"
        );

        for (index, source) in job.files.iter().enumerate() {
            if self.gate.is_aborted() {
                debug!(index, "pipeline aborted, skipping remaining files");
                break;
            }
            let name = TransferJob::display_name(source);
            self.emit(TransferEvent::FileStart {
                index,
                name: name.clone(),
            })
            .await;

            let outcome = self.transfer_one(index, source, &job).await;
            self.gate.leave();

            let event = match outcome {
                FileOutcome::Done(last) => {
                    completed += 1;
                    info!(index, file = %name, "file uploaded");
                    let (speed, size) = match last {
                        Some(p) => (Some(p.speed), Some(p.size)),
                        None => (None, None),
                    };
                    TransferEvent::FileDone { index, speed, size }
                }
                FileOutcome::Cancelled => {
                    info!(index, file = %name, "file cancelled");
                    TransferEvent::FileCancelled { index }
                }
                FileOutcome::Failed(reason) => {
                    warn!(index, file = %name, %reason, "file failed");
                    TransferEvent::FileFailed { index, reason }
                }
            };
            self.emit(event).await;
        }

        self.emit(TransferEvent::AllDone { completed }).await;
        info!(completed, total = job.files.len(), "upload finished");
        completed
    }

    async fn emit(&self, event: TransferEvent) {
        if self.events.send(event).await.is_err() {
            // Nobody is listening anymore; finish the current file and stop.
            self.gate.abort();
        }
    }

    async fn transfer_one(&self, index: usize, source: &Path, job: &TransferJob) -> FileOutcome {
        let mut cmd = self.command.command(job.mode, source, &job.destination);
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return FileOutcome::Failed(format!("failed to start {}: {e}", self.command.program));
            }
        };
        self.gate.enter(index, child.id());
        debug!(index, pid = ?child.id(), "transfer subprocess started");

        // Both readers outlive `wait` so the tool never writes into a closed pipe.
        let mut stdout = child.stdout.take().map(OutputLines::new);
        let mut stderr = child.stderr.take().map(OutputLines::new);
        let mut last = None;

        if !self.stream_output(index, &mut stdout, &mut stderr, &mut last).await {
            terminate(&mut child).await;
            return FileOutcome::Cancelled;
        }

        match child.wait().await {
            Ok(status) if status.success() => FileOutcome::Done(last),
            // Killed from outside while we were draining the last lines.
            Ok(_) if self.gate.is_cancelled() => FileOutcome::Cancelled,
            Ok(status) => FileOutcome::Failed(format!("transfer exited with {status}")),
            Err(e) => FileOutcome::Failed(format!("failed to wait for transfer: {e}")),
        }
    }

    /// Feed both output streams through the parser until they close. Returns
    /// false if cancellation was requested first.
    async fn stream_output<O, E>(
        &self,
        index: usize,
        stdout: &mut Option<OutputLines<O>>,
        stderr: &mut Option<OutputLines<E>>,
        last: &mut Option<ProgressFields>,
    ) -> bool
    where
        O: AsyncRead + Unpin,
        E: AsyncRead + Unpin,
    {
        let mut stdout_open = stdout.is_some();
        let mut stderr_open = stderr.is_some();
        while stdout_open || stderr_open {
            if self.gate.is_cancelled() {
                return false;
            }
            let line = tokio::select! {
                line = next_line(stdout), if stdout_open => match line {
                    Some(line) => line,
                    None => {
                        stdout_open = false;
                        continue;
                    }
                },
                line = next_line(stderr), if stderr_open => match line {
                    Some(line) => line,
                    None => {
                        stderr_open = false;
                        continue;
                    }
                },
                _ = self.gate.cancelled() => return false,
            };

            // Progress redraws may be separated by carriage returns only.
            for segment in line.split('\r') {
                match self.parser.parse(segment) {
                    Some(progress) => {
                        *last = Some(progress.clone());
                        self.emit(TransferEvent::FileProgress { index, progress }).await;
                    }
                    None if !segment.trim().is_empty() => {
                        debug!(index, line = segment.trim(), "transfer output");
                    }
                    None => {}
                }
            }
        }
        !self.gate.is_cancelled()
    }
}

/// Newline-delimited reader over raw subprocess output. Bytes that are not
/// valid UTF-8 are replaced rather than ending the stream.
pub struct OutputLines<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> OutputLines<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    /// `Ok(None)` at end of stream. Cancel safe: a partial line stays
    /// buffered for the next call.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 && self.buf.is_empty() {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&self.buf)
            .trim_end_matches(['\n', '\r'])
            .to_string();
        self.buf.clear();
        Ok(Some(line))
    }
}

/// `None` once the stream is finished. Interrupted reads are retried; any
/// other read error ends this stream only.
async fn next_line<R: AsyncRead + Unpin>(lines: &mut Option<OutputLines<R>>) -> Option<String> {
    let lines = lines.as_mut()?;
    loop {
        match lines.next_line().await {
            Ok(line) => return line,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(error = %e, "failed to read transfer output");
                return None;
            }
        }
    }
}

/// Forced kill; a process that already exited counts as terminated.
async fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "transfer subprocess already gone");
    }
    if let Err(e) = child.wait().await {
        debug!(error = %e, "failed to reap cancelled transfer");
    }
}
