//! Terminal plumbing shared by the tray and upload views.

use color_eyre::eyre::Context;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use crossterm::{cursor, execute};
use ratatui::Frame;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Flex, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use std::io::{self, Stdout};
use std::time::Duration;

pub type Term = Terminal<CrosstermBackend<Stdout>>;

/// Raw mode and the alternate screen for as long as it lives.
pub struct TerminalGuard;

impl TerminalGuard {
    pub fn new() -> color_eyre::Result<Self> {
        enable_raw_mode().context("failed to enable raw mode")?;
        execute!(io::stdout(), EnterAlternateScreen, cursor::Hide)
            .context("failed to enter alternate screen")?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, cursor::Show);
    }
}

pub fn init() -> color_eyre::Result<(TerminalGuard, Term)> {
    let guard = TerminalGuard::new()?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend).context("failed to initialize terminal")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok((guard, terminal))
}

/// Wait up to `timeout` for a key press.
pub fn next_key(timeout: Duration) -> color_eyre::Result<Option<KeyEvent>> {
    if event::poll(timeout).context("failed to poll terminal events")?
        && let Event::Key(key) = event::read().context("failed to read terminal event")?
        && key.kind == KeyEventKind::Press
    {
        return Ok(Some(key));
    }
    Ok(None)
}

pub fn is_interrupt(key: &KeyEvent) -> bool {
    key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL)
}

pub fn title_bar(title: &str, detail: &str) -> Paragraph<'static> {
    let bar_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let line = Line::from(vec![
        Span::styled(format!(" {title} "), bar_style.add_modifier(Modifier::BOLD)),
        Span::styled(" | ", bar_style),
        Span::styled(detail.to_string(), bar_style),
    ]);
    Paragraph::new(Text::from(line)).style(bar_style)
}

pub fn footer(text: impl Into<String>) -> Paragraph<'static> {
    Paragraph::new(text.into())
        .block(Block::default().borders(Borders::TOP))
        .style(Style::default().fg(Color::DarkGray))
}

pub fn panel(title: impl Into<String>) -> Block<'static> {
    Block::default()
        .title(title.into())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
}

/// A small yes/no box over the middle of the frame.
pub fn confirm_dialog(f: &mut Frame, question: &str) {
    let area = centered(f.area(), 52, 5);
    let text = Text::from(vec![
        Line::from(question.to_string()),
        Line::from(""),
        Line::from(Span::styled(
            "y confirm | n / Esc back",
            Style::default().fg(Color::DarkGray),
        )),
    ]);
    let dialog = Paragraph::new(text)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .title("Confirm")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        );
    f.render_widget(Clear, area);
    f.render_widget(dialog, area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let [row] = Layout::vertical([Constraint::Length(height)])
        .flex(Flex::Center)
        .areas(area);
    let [cell] = Layout::horizontal([Constraint::Length(width.min(area.width))])
        .flex(Flex::Center)
        .areas(row);
    cell
}
