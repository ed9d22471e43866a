mod help;

use crate::cli::Cli;
use crate::config::ConsoleConfig;
use crate::controller::{run_controller, UiCommand};
use crate::host::{HostApi, HttpHost};
use crate::model::{ConsoleEvent, FormFields, JobStatus, PosterRequest};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs},
    Terminal,
};
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

const TAB_SCRAPE: usize = 0;
const TAB_POSTER: usize = 1;
const TAB_HELP: usize = 2;

/// One editable form field. `key` is the host's payload name; the value
/// passes through verbatim.
struct Field {
    key: &'static str,
    label: &'static str,
    value: String,
    masked: bool,
}

impl Field {
    fn new(key: &'static str, label: &'static str, value: String) -> Self {
        Self {
            key,
            label,
            value,
            masked: false,
        }
    }

    fn masked(key: &'static str, label: &'static str, value: String) -> Self {
        Self {
            key,
            label,
            value,
            masked: true,
        }
    }
}

/// Display mirror fed by `ConsoleEvent`s. Every affordance rule lives in the
/// controller; this state only renders what it was told.
struct UiState {
    tab: usize,
    status: JobStatus,
    logs: Vec<String>,
    /// Lines scrolled up from the bottom of the log.
    log_scroll: usize,
    output_path: Option<String>,
    resume_visible: bool,
    resume_enabled: bool,
    submit_enabled: bool,
    poster_enabled: bool,
    poster_notice: String,
    info: String,

    scrape_fields: Vec<Field>,
    scrape_selected: usize,
    poster_fields: Vec<Field>,
    poster_selected: usize,
}

impl UiState {
    fn new(defaults: &FormFields) -> Self {
        let get = |key: &str| defaults.get(key).cloned().unwrap_or_default();
        let scrape_fields = vec![
            Field::new("email", "Email", get("email")),
            Field::masked("password", "Password", get("password")),
            Field::new("searchTerm", "Search term", get("searchTerm")),
            Field::new("notes", "Notes", get("notes")),
            Field::new("pages", "Pages", get("pages")),
            Field::new("sortBy", "Sort by", get("sortBy")),
            Field::new("datePosted", "Date posted", get("datePosted")),
            Field::new("location", "Location", get("location")),
            Field::new("industry", "Industry", get("industry")),
            Field::new("title", "Title", get("title")),
            Field::new("company", "Company", get("company")),
        ];
        let poster_fields = vec![
            Field::new("email", "Email", get("email")),
            Field::masked("password", "Password", get("password")),
            Field::new("title", "Title", String::new()),
            Field::new("counter", "Counter", String::new()),
            Field::new("timer", "Timer", String::new()),
            Field::new("schedule", "Schedule", String::new()),
        ];
        Self {
            tab: TAB_SCRAPE,
            status: JobStatus::Idle,
            logs: Vec::new(),
            log_scroll: 0,
            output_path: None,
            resume_visible: false,
            resume_enabled: true,
            submit_enabled: true,
            poster_enabled: true,
            poster_notice: String::new(),
            info: String::new(),
            scrape_fields,
            scrape_selected: 0,
            poster_fields,
            poster_selected: 0,
        }
    }

    fn active_form(&mut self) -> Option<(&mut Vec<Field>, &mut usize)> {
        match self.tab {
            TAB_SCRAPE => Some((&mut self.scrape_fields, &mut self.scrape_selected)),
            TAB_POSTER => Some((&mut self.poster_fields, &mut self.poster_selected)),
            _ => None,
        }
    }

    fn move_selection(&mut self, delta: isize) {
        if let Some((fields, selected)) = self.active_form() {
            let len = fields.len() as isize;
            *selected = ((*selected as isize + delta).rem_euclid(len)) as usize;
        }
    }

    fn insert(&mut self, c: char) {
        if let Some((fields, selected)) = self.active_form() {
            fields[*selected].value.push(c);
        }
    }

    fn backspace(&mut self) {
        if let Some((fields, selected)) = self.active_form() {
            fields[*selected].value.pop();
        }
    }

    fn scrape_payload(&self) -> FormFields {
        self.scrape_fields
            .iter()
            .map(|f| (f.key.to_string(), f.value.clone()))
            .collect()
    }

    fn poster_request(&self) -> PosterRequest {
        let get = |key: &str| {
            self.poster_fields
                .iter()
                .find(|f| f.key == key)
                .map(|f| f.value.clone())
                .unwrap_or_default()
        };
        PosterRequest {
            email: get("email"),
            password: get("password"),
            title: get("title"),
            counter: get("counter"),
            timer: get("timer"),
            schedule: get("schedule"),
        }
    }

    fn submit(&mut self, cmd_tx: &UnboundedSender<UiCommand>) {
        match self.tab {
            TAB_SCRAPE => {
                // The view boundary rejects a second start while disabled;
                // flip locally too so a double Enter can't race the event
                // round trip.
                if self.submit_enabled {
                    self.submit_enabled = false;
                    let _ = cmd_tx.send(UiCommand::StartScrape(self.scrape_payload()));
                }
            }
            TAB_POSTER => {
                if self.poster_enabled {
                    let _ = cmd_tx.send(UiCommand::PosterPost(self.poster_request()));
                }
            }
            _ => {}
        }
    }
}

fn apply_event(state: &mut UiState, event: ConsoleEvent) {
    match event {
        ConsoleEvent::StatusChanged(status) => state.status = status,
        ConsoleEvent::LogsReplaced(lines) => state.logs = lines,
        ConsoleEvent::LogLine(line) => state.logs.push(line),
        ConsoleEvent::ResumeVisible(visible) => state.resume_visible = visible,
        ConsoleEvent::ResumeEnabled(enabled) => state.resume_enabled = enabled,
        ConsoleEvent::OutputSaved(path) => state.output_path = Some(path),
        ConsoleEvent::OutputCleared => state.output_path = None,
        ConsoleEvent::SubmitEnabled(enabled) => state.submit_enabled = enabled,
        ConsoleEvent::PosterEnabled(enabled) => state.poster_enabled = enabled,
        ConsoleEvent::PosterNotice(message) => state.poster_notice = message,
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let config = crate::config::load_or_warn();
    let host: Arc<dyn HostApi> =
        Arc::new(HttpHost::new(&args.host_url(&config)).context("set up host client")?);

    // Unbounded channels avoid backpressure between the UI thread and the
    // controller.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<ConsoleEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the
    // Tokio runtime.
    let opts = args.controller_options(&config);
    let ui_args = args.clone();
    let ui_handle = std::thread::spawn(move || run_threaded(ui_args, config, event_rx, cmd_tx));

    let res = run_controller(host, opts, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    args: Cli,
    config: ConsoleConfig,
    mut event_rx: UnboundedReceiver<ConsoleEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; no cross-thread mutation.
    let mut state = UiState::new(&args.form_fields(&config));

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain events without blocking to keep the UI responsive.
        while let Ok(event) = event_rx.try_recv() {
            apply_event(&mut state, event);
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match (k.modifiers, k.code) {
                    (KeyModifiers::CONTROL, KeyCode::Char('c'))
                    | (KeyModifiers::CONTROL, KeyCode::Char('q')) => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                    (KeyModifiers::CONTROL, KeyCode::Char('r')) => {
                        if state.resume_visible && state.resume_enabled {
                            let _ = cmd_tx.send(UiCommand::Resume);
                        }
                    }
                    (KeyModifiers::CONTROL, KeyCode::Char('l')) => {
                        if state.tab == TAB_POSTER && state.poster_enabled {
                            let _ = cmd_tx.send(UiCommand::PosterLogin(state.poster_request()));
                        }
                    }
                    (KeyModifiers::CONTROL, KeyCode::Char('y')) => {
                        if let Some(path) = state.output_path.clone() {
                            match arboard::Clipboard::new()
                                .and_then(|mut cb| cb.set_text(path.clone()))
                            {
                                Ok(()) => state.info = format!("Copied: {path}"),
                                Err(_) => state.info = "Clipboard unavailable".to_string(),
                            }
                        }
                    }
                    (_, KeyCode::Tab) => {
                        state.tab = (state.tab + 1) % 3;
                    }
                    (_, KeyCode::BackTab) => {
                        state.tab = (state.tab + 2) % 3;
                    }
                    (_, KeyCode::F(1)) => {
                        state.tab = TAB_HELP;
                    }
                    (_, KeyCode::Up) => state.move_selection(-1),
                    (_, KeyCode::Down) => state.move_selection(1),
                    (_, KeyCode::PageUp) => {
                        state.log_scroll = (state.log_scroll + 10).min(state.logs.len());
                    }
                    (_, KeyCode::PageDown) => {
                        state.log_scroll = state.log_scroll.saturating_sub(10);
                    }
                    (_, KeyCode::Enter) => state.submit(&cmd_tx),
                    (_, KeyCode::Backspace) => state.backspace(),
                    (_, KeyCode::Char(c)) if !k.modifiers.contains(KeyModifiers::CONTROL) => {
                        state.insert(c);
                    }
                    _ => {}
                }
            }
        }
    };

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    res
}

fn status_color(status: JobStatus) -> Color {
    match status {
        JobStatus::Idle => Color::Green,
        JobStatus::Running => Color::Yellow,
        JobStatus::Verification => Color::Magenta,
        JobStatus::Error => Color::Red,
    }
}

/// Window of log lines ending `scroll_up` lines above the bottom.
fn log_window(lines: &[String], height: usize, scroll_up: usize) -> &[String] {
    let end = lines.len().saturating_sub(scroll_up.min(lines.len()));
    let start = end.saturating_sub(height);
    &lines[start..end]
}

fn field_lines(fields: &[Field], selected: usize) -> Vec<Line<'static>> {
    fields
        .iter()
        .enumerate()
        .map(|(i, f)| {
            let value = if f.masked {
                "•".repeat(f.value.chars().count())
            } else {
                f.value.clone()
            };
            let label_style = if i == selected {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::Gray)
            };
            let mut spans = vec![
                Span::styled(format!("{:>12}: ", f.label), label_style),
                Span::raw(value),
            ];
            if i == selected {
                spans.push(Span::styled("▌", Style::default().fg(Color::Yellow)));
            }
            Line::from(spans)
        })
        .collect()
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(area);

    let tabs = Tabs::new(vec![
        Line::from("Scrape"),
        Line::from("Poster"),
        Line::from("Help"),
    ])
    .select(state.tab)
    .block(Block::default().borders(Borders::ALL).title("scrapedeck"))
    .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        TAB_SCRAPE => draw_scrape(chunks[1], f, state),
        TAB_POSTER => draw_poster(chunks[1], f, state),
        _ => help::draw_help(chunks[1], f),
    }

    draw_status_bar(chunks[2], f, state);
}

fn draw_log_pane(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let height = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = log_window(&state.logs, height, state.log_scroll)
        .iter()
        .map(|l| Line::from(l.clone()))
        .collect();
    let title = if state.log_scroll > 0 {
        format!("Job Log ({} lines, scrolled {})", state.logs.len(), state.log_scroll)
    } else {
        format!("Job Log ({} lines)", state.logs.len())
    };
    let pane = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(pane, area);
}

fn draw_scrape(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(42), Constraint::Percentage(58)])
        .split(area);

    let mut lines = field_lines(&state.scrape_fields, state.scrape_selected);
    lines.push(Line::from(""));
    if state.submit_enabled {
        lines.push(Line::from(vec![
            Span::styled("Enter", Style::default().fg(Color::Magenta)),
            Span::raw("  Start job"),
        ]));
    } else {
        lines.push(Line::from(Span::styled(
            "Job in progress...",
            Style::default().fg(Color::Yellow),
        )));
    }
    if state.resume_visible {
        let style = if state.resume_enabled {
            Style::default().fg(Color::Magenta)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Verification required: press Ctrl-R to continue",
            style,
        )));
    }
    if let Some(path) = &state.output_path {
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            Span::styled("Saved: ", Style::default().fg(Color::Gray)),
            Span::styled(path.clone(), Style::default().fg(Color::Green)),
        ]));
        lines.push(Line::from(Span::styled(
            "Ctrl-Y copies the path",
            Style::default().fg(Color::DarkGray),
        )));
    }

    let form =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Scrape Job"));
    f.render_widget(form, cols[0]);

    draw_log_pane(cols[1], f, state);
}

fn draw_poster(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(42), Constraint::Percentage(58)])
        .split(area);

    let mut lines = field_lines(&state.poster_fields, state.poster_selected);
    lines.push(Line::from(""));
    if state.poster_enabled {
        lines.push(Line::from(vec![
            Span::styled("Enter", Style::default().fg(Color::Magenta)),
            Span::raw("  Generate and post    "),
            Span::styled("Ctrl-L", Style::default().fg(Color::Magenta)),
            Span::raw("  Login only"),
        ]));
    } else {
        lines.push(Line::from(Span::styled(
            "Request in flight...",
            Style::default().fg(Color::Yellow),
        )));
    }
    if !state.poster_notice.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            state.poster_notice.clone(),
            Style::default().fg(Color::Cyan),
        )));
    }

    let form = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Poster"));
    f.render_widget(form, cols[0]);

    draw_log_pane(cols[1], f, state);
}

fn draw_status_bar(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let mut spans = vec![
        Span::styled("Status: ", Style::default().fg(Color::Gray)),
        Span::styled(
            state.status.as_str(),
            Style::default().fg(status_color(state.status)),
        ),
    ];
    if !state.info.is_empty() {
        spans.push(Span::raw("   "));
        spans.push(Span::styled(
            state.info.clone(),
            Style::default().fg(Color::Cyan),
        ));
    }
    spans.push(Span::raw("   "));
    spans.push(Span::styled(
        "Tab switch · Enter submit · Ctrl-R resume · PgUp/PgDn log · Ctrl-Q quit",
        Style::default().fg(Color::DarkGray),
    ));
    let bar = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(bar, area);
}
