use crate::config::Policy;
use crate::launcher::Launcher;
use crate::probe::ProcessProbe;
use crate::state::{DisplayState, ReconciliationTick};
use crate::supervisor::{ManualAction, Supervisor};
use crate::sys;
use crate::tui;
use crossterm::event::{KeyCode, KeyEvent};
use owo_colors::OwoColorize;
use ratatui::Frame;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{List, ListItem, ListState, Paragraph};
use std::time::Duration;
use tracing::info;

const FRAME_RATE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    Toggle,
    Start,
    Stop,
    Exit,
}

impl MenuItem {
    pub const ALL: [MenuItem; 4] = [MenuItem::Toggle, MenuItem::Start, MenuItem::Stop, MenuItem::Exit];

    pub fn label(&self) -> &'static str {
        match self {
            MenuItem::Toggle => "Toggle",
            MenuItem::Start => "Start",
            MenuItem::Stop => "Stop",
            MenuItem::Exit => "Exit",
        }
    }

    pub fn hotkey(&self) -> char {
        match self {
            MenuItem::Toggle => 't',
            MenuItem::Start => 's',
            MenuItem::Stop => 'x',
            MenuItem::Exit => 'q',
        }
    }

    pub fn from_hotkey(c: char) -> Option<MenuItem> {
        Self::ALL.into_iter().find(|item| item.hotkey() == c.to_ascii_lowercase())
    }

    /// `None` for Exit.
    pub fn action(&self) -> Option<ManualAction> {
        match self {
            MenuItem::Toggle => Some(ManualAction::Toggle),
            MenuItem::Start => Some(ManualAction::Start),
            MenuItem::Stop => Some(ManualAction::Stop),
            MenuItem::Exit => None,
        }
    }
}

pub fn dot_color(state: DisplayState) -> Color {
    match state {
        DisplayState::Stopped => Color::Red,
        DisplayState::Running => Color::Green,
        DisplayState::Busy => Color::Yellow,
    }
}

// ---------------------------------------------------------------------------
// Terminal tray
// ---------------------------------------------------------------------------

struct App<'a> {
    display_name: &'a str,
    policy: &'a Policy,
    menu: ListState,
    state: DisplayState,
    tick: Option<ReconciliationTick>,
    in_flight: usize,
    notice: Option<String>,
}

/// Draw the tray until the user picks Exit. The caller shuts the supervisor
/// down afterwards.
pub fn run_tui<P: ProcessProbe, L: Launcher>(
    supervisor: &Supervisor<P, L>,
    display_name: &str,
    policy: &Policy,
) -> color_eyre::Result<()> {
    let display_rx = supervisor.subscribe();
    let ticks_rx = supervisor.ticks();
    let mut app = App {
        display_name,
        policy,
        menu: ListState::default().with_selected(Some(0)),
        state: *display_rx.borrow(),
        tick: None,
        in_flight: 0,
        notice: None,
    };

    let (_guard, mut terminal) = tui::init()?;
    loop {
        app.state = *display_rx.borrow();
        app.tick = ticks_rx.borrow().clone();
        app.in_flight = supervisor.in_flight();
        terminal.draw(|f| ui(f, &mut app))?;

        let Some(key) = tui::next_key(FRAME_RATE)? else {
            continue;
        };
        let Some(item) = menu_choice(&mut app, &key) else {
            continue;
        };
        match item.action() {
            Some(action) => {
                supervisor.request(action);
                app.notice = Some(format!(
                    "{} requested at {}",
                    item.label(),
                    chrono::Local::now().format("%H:%M:%S")
                ));
            }
            None => break,
        }
    }
    terminal.show_cursor().ok();
    Ok(())
}

fn menu_choice(app: &mut App, key: &KeyEvent) -> Option<MenuItem> {
    if tui::is_interrupt(key) {
        return Some(MenuItem::Exit);
    }
    let selected = app.menu.selected().unwrap_or(0);
    match key.code {
        KeyCode::Down | KeyCode::Char('j') => {
            app.menu.select(Some((selected + 1) % MenuItem::ALL.len()));
            None
        }
        KeyCode::Up | KeyCode::Char('k') => {
            let len = MenuItem::ALL.len();
            app.menu.select(Some((selected + len - 1) % len));
            None
        }
        KeyCode::Enter => MenuItem::ALL.get(selected).copied(),
        KeyCode::Esc => Some(MenuItem::Exit),
        KeyCode::Char(c) => MenuItem::from_hotkey(c),
        _ => None,
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let [title, status_area, menu_area, tick_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(4),
        Constraint::Length(MenuItem::ALL.len() as u16 + 2),
        Constraint::Min(4),
        Constraint::Length(2),
    ])
    .areas(f.area());

    f.render_widget(tui::title_bar("Rclone Tray", &app.policy.to_string()), title);

    let color = dot_color(app.state);
    let mut status = vec![Line::from(vec![
        Span::styled("● ", Style::default().fg(color)),
        Span::styled(
            app.state.tooltip(app.display_name),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
    ])];
    if app.in_flight > 0 {
        status.push(Line::from(Span::styled(
            format!("{} action(s) in flight", app.in_flight),
            Style::default().fg(Color::Yellow),
        )));
    }
    f.render_widget(
        Paragraph::new(Text::from(status)).block(tui::panel("Status")),
        status_area,
    );

    let items: Vec<ListItem> = MenuItem::ALL
        .iter()
        .map(|item| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("[{}] ", item.hotkey()), Style::default().fg(Color::DarkGray)),
                Span::raw(item.label()),
            ]))
        })
        .collect();
    let menu = List::new(items)
        .block(tui::panel("Menu"))
        .highlight_style(
            Style::default()
                .bg(Color::LightBlue)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");
    f.render_stateful_widget(menu, menu_area, &mut app.menu);

    f.render_widget(tick_widget(app.tick.as_ref(), app.policy), tick_area);

    let footer = match &app.notice {
        Some(notice) => format!("↑/↓ move | enter select | t/s/x/q | {notice}"),
        None => "↑/↓ move | enter select | t/s/x/q".to_string(),
    };
    f.render_widget(tui::footer(footer), footer_area);
}

fn tick_widget(tick: Option<&ReconciliationTick>, policy: &Policy) -> Paragraph<'static> {
    let label = Style::default().fg(Color::Gray);
    let lines = match tick {
        None => vec![Line::from(Span::styled(
            "waiting for the first check (startup grace)",
            label,
        ))],
        Some(tick) => {
            let mut lines = vec![
                Line::from(vec![
                    Span::styled("checked at ", label),
                    Span::raw(tick.at.format("%H:%M:%S").to_string()),
                ]),
                Line::from(vec![
                    Span::styled("managed running ", label),
                    Span::raw(yes_no(tick.managed_running)),
                ]),
            ];
            if policy.is_activity_aware() {
                lines.push(Line::from(vec![
                    Span::styled("competing activity ", label),
                    Span::raw(yes_no(tick.competing_active)),
                ]));
            }
            lines
        }
    };
    Paragraph::new(Text::from(lines)).block(tui::panel("Last check"))
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

// ---------------------------------------------------------------------------
// Headless
// ---------------------------------------------------------------------------

/// Print state changes until Ctrl-C / SIGTERM.
pub async fn run_headless<P: ProcessProbe, L: Launcher>(
    supervisor: &Supervisor<P, L>,
    display_name: &str,
) {
    let mut display_rx = supervisor.subscribe();
    print_state(*display_rx.borrow_and_update(), display_name);

    let shutdown = sys::signal_shutdown();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            changed = display_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *display_rx.borrow_and_update();
                print_state(state, display_name);
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }
}

fn print_state(state: DisplayState, display_name: &str) {
    let tooltip = state.tooltip(display_name);
    match state {
        DisplayState::Stopped => println!("{} {}", "●".red(), tooltip),
        DisplayState::Running => println!("{} {}", "●".green(), tooltip),
        DisplayState::Busy => println!("{} {}", "●".yellow(), tooltip),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hotkeys() {
        assert_eq!(MenuItem::from_hotkey('t'), Some(MenuItem::Toggle));
        assert_eq!(MenuItem::from_hotkey('S'), Some(MenuItem::Start));
        assert_eq!(MenuItem::from_hotkey('x'), Some(MenuItem::Stop));
        assert_eq!(MenuItem::from_hotkey('q'), Some(MenuItem::Exit));
        assert_eq!(MenuItem::from_hotkey('z'), None);
    }

    #[test]
    fn test_menu_actions() {
        assert_eq!(MenuItem::Toggle.action(), Some(ManualAction::Toggle));
        assert_eq!(MenuItem::Start.action(), Some(ManualAction::Start));
        assert_eq!(MenuItem::Stop.action(), Some(ManualAction::Stop));
        assert_eq!(MenuItem::Exit.action(), None);
    }

    #[test]
    fn test_dot_colors() {
        assert_eq!(dot_color(DisplayState::Stopped), Color::Red);
        assert_eq!(dot_color(DisplayState::Running), Color::Green);
        assert_eq!(dot_color(DisplayState::Busy), Color::Yellow);
    }

    #[test]
    fn test_menu_navigation_wraps() {
        let policy = Policy::Always;
        let mut app = App {
            display_name: "Rclone",
            policy: &policy,
            menu: ListState::default().with_selected(Some(0)),
            state: DisplayState::Stopped,
            tick: None,
            in_flight: 0,
            notice: None,
        };
        let up = KeyEvent::from(KeyCode::Up);
        assert_eq!(menu_choice(&mut app, &up), None);
        assert_eq!(app.menu.selected(), Some(3));
        let enter = KeyEvent::from(KeyCode::Enter);
        assert_eq!(menu_choice(&mut app, &enter), Some(MenuItem::Exit));
        let down = KeyEvent::from(KeyCode::Down);
        menu_choice(&mut app, &down);
        assert_eq!(app.menu.selected(), Some(0));
    }
}
