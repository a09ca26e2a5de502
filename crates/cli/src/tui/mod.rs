//! Interactive console.
//!
//! Left pane lists agents, right pane is the terminal transcript, bottom is
//! the prompt. Remote calls run on the session's worker thread; agent list
//! refreshes are blocking and happen on start, on F5 and on the refresh
//! interval.

use std::cell::Cell;
use std::io::stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use fleetdesk_api_client::{ApiError, ConsoleClient};
use fleetdesk_config::Settings;
use fleetdesk_protocol::AgentRecord;
use fleetdesk_terminal::{
    build_options, find_agent, ConsoleSession, Direction, LogKind, TargetOption,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame, Terminal,
};

use crate::fleet;
use crate::shell::HttpShell;
use crate::util;

/// Why the console closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    Quit,
    SessionExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Targets,
    Input,
}

struct ConsoleApp {
    session: ConsoleSession,
    client: ConsoleClient,
    operator: String,
    agents: Vec<AgentRecord>,
    options: Vec<TargetOption>,
    selected: usize,
    focus: Focus,
    /// Lines scrolled up from the bottom of the transcript
    scroll: usize,
    /// Output pane height at the last draw
    log_height: Cell<usize>,
    threshold: chrono::Duration,
    refresh_every: Option<Duration>,
    last_refresh: Instant,
    notice: Option<(Color, String)>,
    /// Agent refresh got a 401
    refresh_rejected: bool,
    should_quit: bool,
    show_help: bool,
}

impl ConsoleApp {
    fn new(client: ConsoleClient, settings: &Settings, operator: String) -> Self {
        let shell: Arc<dyn fleetdesk_terminal::RemoteShell> = Arc::new(HttpShell::new(client.clone()));
        Self {
            session: ConsoleSession::threaded(shell, settings.poll_delay()),
            client,
            operator,
            agents: Vec::new(),
            options: Vec::new(),
            selected: 0,
            focus: Focus::Targets,
            scroll: 0,
            log_height: Cell::new(0),
            threshold: fleet::online_threshold(settings),
            refresh_every: settings.refresh_interval(),
            last_refresh: Instant::now(),
            notice: None,
            refresh_rejected: false,
            should_quit: false,
            show_help: false,
        }
    }

    fn refresh_agents(&mut self) {
        self.last_refresh = Instant::now();
        match self.client.list_agents() {
            Ok(agents) => {
                let selected_value = self.options.get(self.selected).map(|o| o.value.clone());
                self.options = build_options(&agents, Utc::now(), self.threshold);
                self.agents = agents;
                self.selected = selected_value
                    .and_then(|v| self.options.iter().position(|o| o.value == v))
                    .unwrap_or(0);
                self.notice = None;
                log::debug!("agent list refreshed: {} agents", self.options.len());
            }
            Err(ApiError::Unauthorized(_)) => {
                log::warn!("agent refresh rejected: session expired");
                self.session.disconnect(Instant::now());
                self.refresh_rejected = true;
                self.should_quit = true;
            }
            Err(e) => {
                log::warn!("agent refresh failed: {}", e);
                self.notice = Some((Color::Yellow, format!("refresh failed: {}", e)));
            }
        }
    }

    fn connect_to(&mut self, query: &str) {
        let Some(agent) = find_agent(&self.agents, query) else {
            self.notice = Some((Color::Red, format!("no agent matches {:?}", query)));
            return;
        };
        if let Some(idx) = self.options.iter().position(|o| o.target.token == agent.token) {
            self.selected = idx;
            self.select_current();
        }
    }

    fn select_current(&mut self) {
        let Some(option) = self.options.get(self.selected) else {
            return;
        };
        if !option.is_selectable() {
            self.notice = Some((Color::Yellow, format!("{} is offline", option.target.label())));
            return;
        }
        let target = option.target.clone();
        self.session.select_target(target, Instant::now());
        self.focus = Focus::Input;
        self.scroll = 0;
        self.notice = None;
    }

    fn tick(&mut self) {
        let now = Instant::now();
        if self.session.tick(now) {
            self.scroll = 0;
        }
        if self.session.is_expired() {
            self.should_quit = true;
        }
        if let Some(every) = self.refresh_every {
            if now.duration_since(self.last_refresh) >= every {
                self.refresh_agents();
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if self.show_help {
            // Any key dismisses help
            self.show_help = false;
            return;
        }

        let now = Instant::now();
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => self.should_quit = true,
            KeyCode::F(1) => self.show_help = true,
            KeyCode::F(5) => self.refresh_agents(),
            KeyCode::Tab | KeyCode::BackTab => {
                self.focus = match self.focus {
                    Focus::Targets => Focus::Input,
                    Focus::Input => Focus::Targets,
                };
            }
            KeyCode::Esc => {
                self.session.disconnect(now);
                self.focus = Focus::Targets;
            }
            KeyCode::PageUp => self.scroll = self.scroll.saturating_add(10).min(self.max_scroll()),
            KeyCode::PageDown => self.scroll = self.scroll.saturating_sub(10),
            _ => match self.focus {
                Focus::Targets => self.handle_targets_key(key),
                Focus::Input => self.handle_input_key(key, now),
            },
        }
    }

    fn handle_targets_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < self.options.len() {
                    self.selected += 1;
                }
            }
            KeyCode::Enter => self.select_current(),
            KeyCode::Char('q') => self.should_quit = true,
            _ => {}
        }
    }

    fn handle_input_key(&mut self, key: KeyEvent, now: Instant) {
        match key.code {
            KeyCode::Enter => {
                self.session.submit_input(now);
                self.scroll = 0;
            }
            KeyCode::Up => self.session.navigate_history(Direction::Older, now),
            KeyCode::Down => self.session.navigate_history(Direction::Newer, now),
            KeyCode::Backspace => self.session.backspace(),
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => self.session.insert_char(c),
            _ => {}
        }
    }

    // ── Drawing ─────────────────────────────────────────────────────

    fn draw(&self, frame: &mut Frame) {
        let area = frame.area();
        let chunks = Layout::vertical([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(area);

        self.draw_title(frame, chunks[0]);
        self.draw_status(frame, chunks[1]);

        let body = Layout::horizontal([Constraint::Length(42), Constraint::Min(20)]).split(chunks[2]);
        self.draw_targets(frame, body[0]);
        self.draw_log(frame, body[1]);

        self.draw_prompt(frame, chunks[3]);
        self.draw_footer(frame, chunks[4]);

        if self.show_help {
            self.draw_help(frame, area);
        }
    }

    fn draw_title(&self, frame: &mut Frame, area: Rect) {
        let online = self.options.iter().filter(|o| o.is_selectable()).count();
        let title = format!(
            " fleetdesk: {} @ {} | {} agents ({} online) ",
            self.operator,
            self.client.api_base(),
            self.options.len(),
            online
        );
        let para = Paragraph::new(Line::from(Span::styled(
            title,
            Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD),
        )))
        .style(Style::default().bg(Color::Cyan));
        frame.render_widget(para, area);
    }

    fn draw_status(&self, frame: &mut Frame, area: Rect) {
        let status = self.session.status();
        let color = if status.connected { Color::Green } else { Color::Red };
        let mut spans = vec![Span::styled(
            format!(" {} ", status.status_text()),
            Style::default().fg(Color::Black).bg(color).add_modifier(Modifier::BOLD),
        )];
        if let Some(label) = &status.target_label {
            spans.push(Span::raw(format!("  {}", label)));
        }
        if let Some(ticket) = self.session.panel().pending() {
            spans.push(Span::styled(format!("  waiting {}", ticket), Style::default().fg(Color::DarkGray)));
        }
        if let Some((color, text)) = &self.notice {
            spans.push(Span::styled(format!("  {}", text), Style::default().fg(*color)));
        }
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn draw_targets(&self, frame: &mut Frame, area: Rect) {
        let inner_width = area.width.saturating_sub(2) as usize;
        let visible = area.height.saturating_sub(2) as usize;
        let start = if visible == 0 { 0 } else { self.selected.saturating_sub(visible - 1) };

        let lines: Vec<Line> = self
            .options
            .iter()
            .enumerate()
            .skip(start)
            .take(visible)
            .map(|(i, opt)| {
                let mut style = if opt.is_selectable() {
                    Style::default().fg(Color::White)
                } else {
                    Style::default().fg(Color::DarkGray)
                };
                if i == self.selected {
                    style = style.add_modifier(Modifier::REVERSED);
                }
                Line::from(Span::styled(util::pad_right(&opt.label, inner_width), style))
            })
            .collect();

        let lines = if lines.is_empty() {
            vec![Line::from(Span::styled(" no agents (F5 to refresh)", Style::default().fg(Color::DarkGray)))]
        } else {
            lines
        };

        frame.render_widget(Paragraph::new(lines).block(self.pane(" Targets ", self.focus == Focus::Targets)), area);
    }

    /// Transcript height in screen rows (multi-line output spans several).
    fn log_rows(&self) -> usize {
        self.session.transcript().lines().iter().map(|line| line.text.lines().count()).sum()
    }

    fn max_scroll(&self) -> usize {
        self.log_rows().saturating_sub(self.log_height.get())
    }

    fn draw_log(&self, frame: &mut Frame, area: Rect) {
        let lines: Vec<Line> = self
            .session
            .transcript()
            .lines()
            .iter()
            .flat_map(|line| {
                let style = log_style(line.kind);
                line.text
                    .lines()
                    .map(move |text| Line::from(Span::styled(text.to_string(), style)))
                    .collect::<Vec<_>>()
            })
            .collect();

        let visible = area.height.saturating_sub(2) as usize;
        self.log_height.set(visible);
        let max_scroll = lines.len().saturating_sub(visible);
        let scroll = self.scroll.min(max_scroll);
        let top = (max_scroll - scroll) as u16;

        let title = if scroll > 0 { format!(" Output (+{}) ", scroll) } else { " Output ".to_string() };
        let para = Paragraph::new(lines).block(self.pane(&title, false)).scroll((top, 0));
        frame.render_widget(para, area);
    }

    fn draw_prompt(&self, frame: &mut Frame, area: Rect) {
        let status = self.session.status();
        let prompt = format!("{} ", status.prompt);
        let line = if self.session.input_enabled() {
            Line::from(vec![
                Span::styled(prompt.clone(), Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
                Span::raw(self.session.input().to_string()),
            ])
        } else {
            Line::from(vec![
                Span::styled(prompt.clone(), Style::default().fg(Color::DarkGray)),
                Span::styled("select a target (Tab, Enter)", Style::default().fg(Color::DarkGray)),
            ])
        };
        frame.render_widget(Paragraph::new(line), area);

        if self.focus == Focus::Input && self.session.input_enabled() {
            let x = util::display_width(&prompt) + util::display_width(self.session.input());
            let x = area.x.saturating_add(x as u16).min(area.right().saturating_sub(1));
            frame.set_cursor_position((x, area.y));
        }
    }

    fn draw_footer(&self, frame: &mut Frame, area: Rect) {
        let text = " Tab: focus  Enter: run/select  Up/Down: history  PgUp/PgDn: scroll  Esc: disconnect  F5: refresh  F1: help  Ctrl+C: quit ";
        let para = Paragraph::new(Line::from(Span::styled(
            util::truncate_display(text, area.width as usize),
            Style::default().fg(Color::Black).bg(Color::DarkGray),
        )))
        .style(Style::default().bg(Color::DarkGray));
        frame.render_widget(para, area);
    }

    fn draw_help(&self, frame: &mut Frame, area: Rect) {
        let help_lines = [
            "",
            "  Targets",
            "  -------",
            "  Up / Down         Move selection",
            "  Enter             Connect (online only)",
            "  F5                Refresh agent list",
            "",
            "  Terminal",
            "  --------",
            "  Enter             Run command",
            "  Up / Down         Command history",
            "  PgUp / PgDn       Scroll output",
            "  Esc               Disconnect",
            "  help, clear, exit, result",
            "",
            "  General",
            "  -------",
            "  Tab               Switch focus",
            "  Ctrl+C            Quit",
            "",
        ];
        let help_width: u16 = 44;
        let help_height: u16 = help_lines.len() as u16 + 2;

        let x = area.width.saturating_sub(help_width) / 2;
        let y = area.height.saturating_sub(help_height) / 2;
        let popup = Rect::new(
            area.x + x,
            area.y + y,
            help_width.min(area.width),
            help_height.min(area.height),
        );

        let lines: Vec<Line> = help_lines
            .iter()
            .map(|s| Line::from(Span::styled(*s, Style::default().fg(Color::White))))
            .collect();

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Keybindings ")
            .title_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
            .style(Style::default().bg(Color::Black));

        frame.render_widget(Clear, popup);
        frame.render_widget(Paragraph::new(lines).block(block), popup);
    }

    fn pane<'a>(&self, title: &'a str, focused: bool) -> Block<'a> {
        let color = if focused { Color::Cyan } else { Color::DarkGray };
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color))
            .title(title)
    }
}

fn log_style(kind: LogKind) -> Style {
    match kind {
        LogKind::Info => Style::default().fg(Color::Cyan),
        LogKind::Warning => Style::default().fg(Color::Yellow),
        LogKind::Error => Style::default().fg(Color::Red),
        LogKind::Output => Style::default().fg(Color::White),
        LogKind::Command => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
    }
}

pub fn run(
    client: ConsoleClient,
    settings: &Settings,
    operator: String,
    target: Option<String>,
) -> Result<ConsoleExit, String> {
    let mut app = ConsoleApp::new(client, settings, operator);
    app.refresh_agents();
    if let Some(query) = target {
        app.connect_to(&query);
    }
    if app.should_quit {
        return Ok(ConsoleExit::SessionExpired);
    }

    terminal::enable_raw_mode().map_err(|e| format!("failed to enable raw mode: {}", e))?;
    stdout()
        .execute(EnterAlternateScreen)
        .map_err(|e| format!("failed to enter alternate screen: {}", e))?;

    struct Cleanup;
    impl Drop for Cleanup {
        fn drop(&mut self) {
            let _ = stdout().execute(LeaveAlternateScreen);
            let _ = terminal::disable_raw_mode();
        }
    }
    let _cleanup = Cleanup;

    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend).map_err(|e| format!("failed to create terminal: {}", e))?;

    loop {
        app.tick();

        terminal
            .draw(|frame| app.draw(frame))
            .map_err(|e| format!("draw error: {}", e))?;

        if event::poll(Duration::from_millis(100)).map_err(|e| format!("event poll error: {}", e))? {
            if let Event::Key(key) = event::read().map_err(|e| format!("event read error: {}", e))? {
                app.handle_key(key);
            }
        }

        if app.should_quit {
            break;
        }
    }

    log::info!("console closed");
    if app.session.is_expired() || app.refresh_rejected {
        Ok(ConsoleExit::SessionExpired)
    } else {
        Ok(ConsoleExit::Quit)
    }
}
