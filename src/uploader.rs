use crate::transfer::{CancellationGate, TransferEvent, TransferJob, TransferMode};
use crate::tui;
use comfy_table::{Attribute, Cell, Color as TableColor, Table, presets::UTF8_FULL_CONDENSED};
use crossterm::event::KeyCode;
use owo_colors::OwoColorize;
use ratatui::Frame;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Cell as TuiCell, Gauge, Paragraph, Row, Table as TuiTable};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};

const FRAME_RATE: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Uploading,
    Done,
    Failed,
    Cancelled,
}

impl FileStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Done | FileStatus::Failed | FileStatus::Cancelled)
    }

    fn label(&self) -> &'static str {
        match self {
            FileStatus::Pending => "Pending",
            FileStatus::Uploading => "Uploading…",
            FileStatus::Done => "✓ Done",
            FileStatus::Failed => "✗ Failed",
            FileStatus::Cancelled => "✗ Cancelled",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileTransferRecord {
    pub index: usize,
    pub name: String,
    pub status: FileStatus,
    pub percent: Option<String>,
    pub speed: Option<String>,
    pub size: Option<String>,
    pub eta: Option<String>,
    pub reason: Option<String>,
}

impl FileTransferRecord {
    fn new(index: usize, name: String) -> Self {
        Self {
            index,
            name,
            status: FileStatus::Pending,
            percent: None,
            speed: None,
            size: None,
            eta: None,
            reason: None,
        }
    }
}

fn dash(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("-")
}

/// Presenter-side model of a job, mutated only by applying events.
#[derive(Debug, Clone)]
pub struct TransferBoard {
    records: Vec<FileTransferRecord>,
    destination: String,
    mode: TransferMode,
    current: Option<usize>,
    completed: Option<usize>,
}

impl TransferBoard {
    pub fn new(job: &TransferJob) -> Self {
        let records = job
            .display_names()
            .into_iter()
            .enumerate()
            .map(|(i, name)| FileTransferRecord::new(i, name))
            .collect();
        Self {
            records,
            destination: job.destination.spec(),
            mode: job.mode,
            current: None,
            completed: None,
        }
    }

    pub fn records(&self) -> &[FileTransferRecord] {
        &self.records
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn total(&self) -> usize {
        self.records.len()
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Set once `AllDone` arrived.
    pub fn completed(&self) -> Option<usize> {
        self.completed
    }

    pub fn is_finished(&self) -> bool {
        self.completed.is_some()
    }

    pub fn settled(&self) -> usize {
        self.records.iter().filter(|r| r.status.is_terminal()).count()
    }

    pub fn count(&self, status: FileStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    pub fn apply(&mut self, event: &TransferEvent) {
        match event {
            TransferEvent::FileStart { index, name } => {
                self.current = Some(*index);
                if let Some(r) = self.records.get_mut(*index) {
                    r.name.clone_from(name);
                    r.status = FileStatus::Uploading;
                }
            }
            TransferEvent::FileProgress { index, progress } => {
                if let Some(r) = self.records.get_mut(*index) {
                    r.percent = Some(progress.percent.clone());
                    r.size = Some(progress.size.clone());
                    r.speed = Some(progress.speed.clone());
                    r.eta = Some(progress.eta_or_dash().to_string());
                }
            }
            TransferEvent::FileDone { index, speed, size } => {
                if let Some(r) = self.records.get_mut(*index) {
                    r.status = FileStatus::Done;
                    r.percent = Some("100%".to_string());
                    r.eta = Some("-".to_string());
                    if speed.is_some() {
                        r.speed.clone_from(speed);
                    }
                    if size.is_some() {
                        r.size.clone_from(size);
                    }
                }
                self.clear_current(*index);
            }
            TransferEvent::FileCancelled { index } => {
                self.settle(*index, FileStatus::Cancelled, None);
            }
            TransferEvent::FileFailed { index, reason } => {
                self.settle(*index, FileStatus::Failed, Some(reason.clone()));
            }
            TransferEvent::AllDone { completed } => {
                self.current = None;
                self.completed = Some(*completed);
            }
        }
    }

    /// Close the books after an abort that cut the event stream short.
    pub fn mark_aborted(&mut self) {
        for r in &mut self.records {
            if r.status == FileStatus::Uploading {
                r.status = FileStatus::Cancelled;
            }
        }
        self.current = None;
        if self.completed.is_none() {
            self.completed = Some(self.count(FileStatus::Done));
        }
    }

    fn settle(&mut self, index: usize, status: FileStatus, reason: Option<String>) {
        if let Some(r) = self.records.get_mut(index) {
            r.status = status;
            r.eta = Some("-".to_string());
            r.reason = reason;
        }
        self.clear_current(index);
    }

    fn clear_current(&mut self, index: usize) {
        if self.current == Some(index) {
            self.current = None;
        }
    }

    pub fn header(&self) -> String {
        format!("Files ({} total) → {}", self.total(), self.destination)
    }

    pub fn overall_label(&self) -> String {
        format!("Overall: {} / {}", self.settled(), self.total())
    }

    pub fn overall_ratio(&self) -> f64 {
        if self.records.is_empty() {
            return 1.0;
        }
        self.settled() as f64 / self.total() as f64
    }

    pub fn status_line(&self) -> String {
        if let Some(completed) = self.completed {
            return self.finish_message(completed);
        }
        match self.current {
            Some(i) => format!("Uploading {} of {}…", i + 1, self.total()),
            None => "Waiting…".to_string(),
        }
    }

    pub fn finish_message(&self, completed: usize) -> String {
        format!(
            "Finished: {} {} of {} file(s) to {}",
            self.mode.past_tense(),
            completed,
            self.total(),
            self.destination
        )
    }

    /// One line per file that has started, for the live output panel.
    pub fn live_lines(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.status != FileStatus::Pending)
            .map(|r| {
                let detail = match r.status {
                    FileStatus::Uploading => format!(
                        "{} of {} at {}, ETA {}",
                        dash(&r.percent),
                        dash(&r.size),
                        dash(&r.speed),
                        dash(&r.eta)
                    ),
                    FileStatus::Failed => format!("failed: {}", dash(&r.reason)),
                    status => status.to_string(),
                };
                format!("[{}/{}] {}: {}", r.index + 1, self.total(), r.name, detail)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Plain presenter
// ---------------------------------------------------------------------------

/// One line per event on stdout. Ctrl-C aborts the pipeline; the remaining
/// events are still drained so the summary is accurate.
pub async fn run_plain(
    job: &TransferJob,
    mut events: mpsc::Receiver<TransferEvent>,
    gate: &CancellationGate,
) -> TransferBoard {
    let mut board = TransferBoard::new(job);
    let mut interrupted = false;

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                if signal.is_ok() {
                    eprintln!("{}", "Interrupted, aborting upload…".yellow());
                    gate.abort();
                }
                continue;
            }
        };
        let Some(event) = event else {
            break;
        };
        board.apply(&event);
        println!("{}", plain_line(&board, &event));
        if matches!(event, TransferEvent::AllDone { .. }) {
            break;
        }
    }
    if !board.is_finished() {
        board.mark_aborted();
    }
    board
}

pub fn plain_line(board: &TransferBoard, event: &TransferEvent) -> String {
    let total = board.total();
    let name = |index: usize| {
        board
            .records()
            .get(index)
            .map(|r| r.name.clone())
            .unwrap_or_default()
    };
    match event {
        TransferEvent::FileStart { index, name } => {
            format!("[{}/{total}] {name}: uploading", index + 1)
        }
        TransferEvent::FileProgress { index, progress } => format!(
            "[{}/{total}] {}: {} of {} at {}, ETA {}",
            index + 1,
            name(*index),
            progress.percent,
            progress.size,
            progress.speed,
            progress.eta_or_dash()
        ),
        TransferEvent::FileDone { index, .. } => {
            format!("[{}/{total}] {}: done", index + 1, name(*index))
        }
        TransferEvent::FileCancelled { index } => {
            format!("[{}/{total}] {}: cancelled", index + 1, name(*index))
        }
        TransferEvent::FileFailed { index, reason } => {
            format!("[{}/{total}] {}: failed: {reason}", index + 1, name(*index))
        }
        TransferEvent::AllDone { completed } => board.finish_message(*completed),
    }
}

// ---------------------------------------------------------------------------
// Terminal presenter
// ---------------------------------------------------------------------------

struct App {
    board: TransferBoard,
    show_live: bool,
    confirm_exit: bool,
    notice: Option<String>,
    disconnected: bool,
}

enum Flow {
    Continue,
    Exit,
}

/// Full-screen view. Returns the board once the user leaves; if they leave
/// early, the pipeline is aborted through `gate`.
pub fn run_tui(
    job: &TransferJob,
    mut events: mpsc::Receiver<TransferEvent>,
    gate: &CancellationGate,
) -> color_eyre::Result<TransferBoard> {
    let mut app = App {
        board: TransferBoard::new(job),
        show_live: false,
        confirm_exit: false,
        notice: None,
        disconnected: false,
    };

    {
        let (_guard, mut terminal) = tui::init()?;
        loop {
            drain(&mut app, &mut events);
            terminal.draw(|f| ui(f, &app))?;

            if let Some(key) = tui::next_key(FRAME_RATE)?
                && let Flow::Exit = handle_key(&mut app, key, gate)
            {
                break;
            }
        }
        terminal.show_cursor().ok();
    }

    if !app.board.is_finished() {
        gate.abort();
        app.board.mark_aborted();
    }
    Ok(app.board)
}

fn drain(app: &mut App, events: &mut mpsc::Receiver<TransferEvent>) {
    loop {
        match events.try_recv() {
            Ok(event) => app.board.apply(&event),
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => {
                app.disconnected = true;
                return;
            }
        }
    }
}

fn handle_key(app: &mut App, key: crossterm::event::KeyEvent, gate: &CancellationGate) -> Flow {
    if app.confirm_exit {
        match key.code {
            KeyCode::Char('y') | KeyCode::Enter => return Flow::Exit,
            KeyCode::Char('n') | KeyCode::Esc => app.confirm_exit = false,
            _ => {}
        }
        return Flow::Continue;
    }

    if tui::is_interrupt(&key) {
        return request_exit(app);
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return request_exit(app),
        KeyCode::Char('l') => app.show_live = !app.show_live,
        KeyCode::Char('c') => {
            app.notice = Some(match app.board.current() {
                Some(i) if gate.cancel() => {
                    let name = &app.board.records()[i].name;
                    format!("Cancelling {name}…")
                }
                _ => "Nothing to cancel".to_string(),
            });
        }
        _ => {}
    }
    Flow::Continue
}

fn request_exit(app: &mut App) -> Flow {
    if app.board.is_finished() || app.disconnected {
        Flow::Exit
    } else {
        app.confirm_exit = true;
        Flow::Continue
    }
}

fn ui(f: &mut Frame, app: &App) {
    let live_height = if app.show_live {
        (app.board.total() as u16).clamp(1, 8) + 2
    } else {
        0
    };
    let [title, table_area, gauge_area, live_area, status_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(5),
        Constraint::Length(3),
        Constraint::Length(live_height),
        Constraint::Length(1),
        Constraint::Length(2),
    ])
    .areas(f.area());

    let board = &app.board;
    f.render_widget(tui::title_bar("Rclone Upload", &board.header()), title);
    f.render_widget(file_table(board), table_area);

    let gauge = Gauge::default()
        .block(tui::panel("Progress"))
        .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
        .ratio(board.overall_ratio().clamp(0.0, 1.0))
        .label(board.overall_label());
    f.render_widget(gauge, gauge_area);

    if app.show_live {
        let lines: Vec<Line> = board.live_lines().into_iter().map(Line::from).collect();
        let skip = lines.len().saturating_sub(live_height.saturating_sub(2) as usize);
        let live = Paragraph::new(Text::from(lines.into_iter().skip(skip).collect::<Vec<_>>()))
            .block(tui::panel("Live output"));
        f.render_widget(live, live_area);
    }

    let mut status = vec![Span::styled(
        board.status_line(),
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
    )];
    if let Some(notice) = &app.notice {
        status.push(Span::raw("  "));
        status.push(Span::styled(notice.clone(), Style::default().fg(Color::Yellow)));
    }
    f.render_widget(Paragraph::new(Line::from(status)), status_area);

    let hide_or_show = if app.show_live { "hide" } else { "show" };
    f.render_widget(
        tui::footer(format!("c cancel current file | l {hide_or_show} live output | q exit")),
        footer_area,
    );

    if app.confirm_exit {
        tui::confirm_dialog(f, "Uploads are still running. Exit and abort them?");
    }
}

fn file_table(board: &TransferBoard) -> TuiTable<'static> {
    let header = Row::new(["File", "%", "Speed", "Size", "ETA", "Status"]).style(
        Style::default()
            .fg(Color::White)
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    );

    let rows: Vec<Row> = board
        .records()
        .iter()
        .map(|r| {
            Row::new(vec![
                TuiCell::from(r.name.clone()).style(Style::default().fg(Color::Cyan)),
                TuiCell::from(dash(&r.percent).to_string()),
                TuiCell::from(dash(&r.speed).to_string()),
                TuiCell::from(dash(&r.size).to_string()),
                TuiCell::from(dash(&r.eta).to_string()),
                TuiCell::from(r.status.to_string()).style(status_style(r.status)),
            ])
        })
        .collect();

    let widths = [
        Constraint::Min(20),
        Constraint::Length(6),
        Constraint::Length(12),
        Constraint::Length(12),
        Constraint::Length(8),
        Constraint::Length(13),
    ];
    TuiTable::new(rows, widths)
        .header(header)
        .block(tui::panel(board.header()))
}

fn status_style(status: FileStatus) -> Style {
    match status {
        FileStatus::Pending => Style::default().fg(Color::Gray),
        FileStatus::Uploading => Style::default().fg(Color::Yellow),
        FileStatus::Done => Style::default().fg(Color::Green),
        FileStatus::Failed => Style::default().fg(Color::Red),
        FileStatus::Cancelled => Style::default().fg(Color::Magenta),
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

pub fn summary_table(board: &TransferBoard) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("file").add_attribute(Attribute::Bold),
        Cell::new("status").add_attribute(Attribute::Bold),
        Cell::new("size").add_attribute(Attribute::Bold),
        Cell::new("speed").add_attribute(Attribute::Bold),
        Cell::new("note").add_attribute(Attribute::Bold),
    ]);
    for r in board.records() {
        table.add_row(vec![
            Cell::new(&r.name).fg(TableColor::Cyan),
            Cell::new(r.status.to_string()).fg(summary_color(r.status)),
            Cell::new(dash(&r.size)),
            Cell::new(dash(&r.speed)),
            Cell::new(r.reason.as_deref().unwrap_or("")),
        ]);
    }
    table
}

fn summary_color(status: FileStatus) -> TableColor {
    match status {
        FileStatus::Pending => TableColor::Grey,
        FileStatus::Uploading => TableColor::Yellow,
        FileStatus::Done => TableColor::Green,
        FileStatus::Failed => TableColor::Red,
        FileStatus::Cancelled => TableColor::Magenta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressFields;
    use crate::transfer::Destination;
    use std::path::PathBuf;

    fn job() -> TransferJob {
        TransferJob {
            files: vec![PathBuf::from("/videos/a.mp4"), PathBuf::from("/videos/b.mp4")],
            destination: Destination::new("Cloud Volume", "trip"),
            mode: TransferMode::Copy,
        }
    }

    fn progress(percent: &str) -> ProgressFields {
        ProgressFields {
            percent: percent.to_string(),
            size: "4.005Mi".to_string(),
            speed: "2.1Mi/s".to_string(),
            eta: Some("1s".to_string()),
        }
    }

    #[test]
    fn test_board_starts_pending() {
        let board = TransferBoard::new(&job());
        assert_eq!(board.total(), 2);
        assert_eq!(board.count(FileStatus::Pending), 2);
        assert_eq!(board.records()[0].name, "a.mp4");
        assert_eq!(board.header(), "Files (2 total) → Cloud Volume:trip");
        assert_eq!(board.overall_label(), "Overall: 0 / 2");
    }

    #[test]
    fn test_board_follows_events() {
        let mut board = TransferBoard::new(&job());
        board.apply(&TransferEvent::FileStart {
            index: 0,
            name: "a.mp4".to_string(),
        });
        assert_eq!(board.records()[0].status, FileStatus::Uploading);
        assert_eq!(board.status_line(), "Uploading 1 of 2…");

        board.apply(&TransferEvent::FileProgress {
            index: 0,
            progress: progress("45%"),
        });
        assert_eq!(board.records()[0].percent.as_deref(), Some("45%"));
        assert_eq!(board.records()[0].eta.as_deref(), Some("1s"));

        board.apply(&TransferEvent::FileDone {
            index: 0,
            speed: Some("2.5Mi/s".to_string()),
            size: None,
        });
        let first = &board.records()[0];
        assert_eq!(first.status, FileStatus::Done);
        assert_eq!(first.percent.as_deref(), Some("100%"));
        assert_eq!(first.speed.as_deref(), Some("2.5Mi/s"));
        assert_eq!(first.size.as_deref(), Some("4.005Mi"));
        assert_eq!(board.current(), None);

        board.apply(&TransferEvent::FileStart {
            index: 1,
            name: "b.mp4".to_string(),
        });
        board.apply(&TransferEvent::FileCancelled { index: 1 });
        board.apply(&TransferEvent::AllDone { completed: 1 });

        assert_eq!(board.records()[1].status, FileStatus::Cancelled);
        assert!(board.is_finished());
        assert_eq!(board.overall_ratio(), 1.0);
        assert_eq!(
            board.status_line(),
            "Finished: Copied 1 of 2 file(s) to Cloud Volume:trip"
        );
    }

    #[test]
    fn test_failed_file_keeps_reason() {
        let mut board = TransferBoard::new(&job());
        board.apply(&TransferEvent::FileStart {
            index: 0,
            name: "a.mp4".to_string(),
        });
        board.apply(&TransferEvent::FileFailed {
            index: 0,
            reason: "transfer exited with exit status: 1".to_string(),
        });
        assert_eq!(board.records()[0].status, FileStatus::Failed);
        assert_eq!(board.live_lines(), vec![
            "[1/2] a.mp4: failed: transfer exited with exit status: 1".to_string()
        ]);
    }

    #[test]
    fn test_mark_aborted() {
        let mut board = TransferBoard::new(&job());
        board.apply(&TransferEvent::FileStart {
            index: 0,
            name: "a.mp4".to_string(),
        });
        board.mark_aborted();
        assert_eq!(board.records()[0].status, FileStatus::Cancelled);
        assert_eq!(board.records()[1].status, FileStatus::Pending);
        assert_eq!(board.completed(), Some(0));
    }

    #[test]
    fn test_live_lines_skip_pending() {
        let mut board = TransferBoard::new(&job());
        assert!(board.live_lines().is_empty());
        board.apply(&TransferEvent::FileStart {
            index: 0,
            name: "a.mp4".to_string(),
        });
        board.apply(&TransferEvent::FileProgress {
            index: 0,
            progress: progress("10%"),
        });
        assert_eq!(board.live_lines(), vec![
            "[1/2] a.mp4: 10% of 4.005Mi at 2.1Mi/s, ETA 1s".to_string()
        ]);
    }

    #[test]
    fn test_plain_lines() {
        let board = TransferBoard::new(&job());
        let line = plain_line(&board, &TransferEvent::FileStart {
            index: 1,
            name: "b.mp4".to_string(),
        });
        assert_eq!(line, "[2/2] b.mp4: uploading");
        let line = plain_line(&board, &TransferEvent::AllDone { completed: 2 });
        assert_eq!(line, "Finished: Copied 2 of 2 file(s) to Cloud Volume:trip");
    }

    #[test]
    fn test_summary_has_row_per_file() {
        let board = TransferBoard::new(&job());
        let rendered = summary_table(&board).to_string();
        assert!(rendered.contains("a.mp4"));
        assert!(rendered.contains("b.mp4"));
        assert!(rendered.contains("Pending"));
    }
}
