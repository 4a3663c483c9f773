use anyhow::{Context, Result};
use chrono::Local;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::clients::load_clients;
use crate::enrich::LoadedApplications;
use crate::gateway::Gateway;
use crate::models::Client;
use crate::render::{Marker, RowView};
use crate::view::{ApplicationsView, LoadRequest};

enum LoadMessage {
    Clients { token: u64, result: Result<Vec<Client>> },
    Applications { token: u64, result: Result<LoadedApplications> },
}

/// Runs gateway calls on the blocking pool and reports back over a channel.
struct Loader {
    runtime: Runtime,
    gateway: Arc<dyn Gateway>,
    tx: UnboundedSender<LoadMessage>,
}

impl Loader {
    fn clients(&self, view: &mut ApplicationsView) {
        let gateway = Arc::clone(&self.gateway);
        let tx = self.tx.clone();
        let identity = view.identity().clone();
        let token = view.begin_clients_load();
        self.runtime.spawn_blocking(move || {
            let result = load_clients(gateway.as_ref(), &identity);
            let _ = tx.send(LoadMessage::Clients { token, result });
        });
    }

    fn applications(&self, request: LoadRequest) {
        let gateway = Arc::clone(&self.gateway);
        let tx = self.tx.clone();
        debug!(token = request.token, "starting application load");
        self.runtime.spawn_blocking(move || {
            let result = request.run(gateway.as_ref());
            let _ = tx.send(LoadMessage::Applications { token: request.token, result });
        });
    }
}

struct AppState {
    view: ApplicationsView,
    selected: usize,
    // Some while the search box has focus.
    search_input: Option<String>,
}

impl AppState {
    fn new(view: ApplicationsView) -> Self {
        Self { view, selected: 0, search_input: None }
    }

    fn visible_len(&self) -> usize {
        self.view.visible().len()
    }

    fn clamp_selection(&mut self) {
        let len = self.visible_len();
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }

    fn next(&mut self) {
        let len = self.visible_len();
        if len > 0 && self.selected < len - 1 {
            self.selected += 1;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    fn toggle_current(&mut self) {
        let id = self.view.visible().get(self.selected).map(|r| r.application.id);
        if let Some(id) = id {
            self.view.toggle_expanded(id);
        }
    }

    fn apply(&mut self, message: LoadMessage) {
        match message {
            LoadMessage::Clients { token, result } => {
                if !self.view.apply_clients(token, result) {
                    debug!(token, "discarded stale client list");
                }
            }
            LoadMessage::Applications { token, result } => {
                if !self.view.finish_load(token, result) {
                    debug!(token, "discarded stale application load");
                }
                self.clamp_selection();
            }
        }
    }
}

pub fn run_browse(view: ApplicationsView, gateway: Arc<dyn Gateway>) -> Result<()> {
    let runtime = Runtime::new().context("Failed to start load runtime")?;
    let (tx, rx) = mpsc::unbounded_channel();
    let loader = Loader { runtime, gateway, tx };

    let mut state = AppState::new(view);
    loader.clients(&mut state.view);
    loader.applications(state.view.begin_load(Local::now().date_naive()));

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, &loader, rx);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    // Don't wait on a request that is still in flight.
    loader.runtime.shutdown_background();
    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState,
    loader: &Loader,
    mut rx: UnboundedReceiver<LoadMessage>,
) -> Result<()> {
    let mut list_state = ListState::default();

    loop {
        while let Ok(message) = rx.try_recv() {
            state.apply(message);
        }

        list_state.select((state.visible_len() > 0).then_some(state.selected));
        terminal.draw(|frame| draw(frame, state, &mut list_state))?;

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        let Event::Key(key) = event::read()? else { continue };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if let Some(input) = state.search_input.as_mut() {
            match key.code {
                KeyCode::Enter | KeyCode::Esc => state.search_input = None,
                KeyCode::Backspace => {
                    input.pop();
                }
                KeyCode::Char(c) => input.push(c),
                _ => {}
            }
            let term = state.search_input.clone();
            if let Some(term) = term {
                state.view.set_search(term);
            }
            state.clamp_selection();
            continue;
        }

        let today = Local::now().date_naive();
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => break,
            KeyCode::Down | KeyCode::Char('j') => state.next(),
            KeyCode::Up | KeyCode::Char('k') => state.prev(),
            KeyCode::Enter | KeyCode::Char(' ') => state.toggle_current(),
            KeyCode::Char('/') => {
                state.search_input = Some(state.view.filters().search.clone());
            }
            KeyCode::Char('f') => {
                let flagged_only = !state.view.filters().flagged_only;
                loader.applications(state.view.set_flagged_only(flagged_only, today));
            }
            KeyCode::Char('c') => {
                let next = state.view.next_client();
                loader.applications(state.view.set_client(next, today));
            }
            KeyCode::Char('r') => {
                let next = state.view.filters().range.next();
                loader.applications(state.view.set_range(next, today));
            }
            KeyCode::Char('R') => {
                loader.clients(&mut state.view);
                loader.applications(state.view.begin_load(today));
            }
            _ => {}
        }
    }
    Ok(())
}

fn draw(frame: &mut Frame, state: &AppState, list_state: &mut ListState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.area());

    frame.render_widget(build_header(state), chunks[0]);

    let view = &state.view;
    let visible = view.visible();
    let title = format!(" Applications ({}) ", visible.len());
    let block = Block::default().borders(Borders::ALL).title(title);

    if visible.is_empty() {
        let (message, style) = if view.is_loading() {
            ("Loading applications...".to_string(), Style::default().fg(Color::Yellow))
        } else if let Some(err) = view.last_error() {
            (err.to_string(), Style::default().fg(Color::Red))
        } else {
            ("No applications found".to_string(), Style::default().fg(Color::DarkGray))
        };
        let empty = Paragraph::new(Span::styled(message, style))
            .block(block)
            .wrap(Wrap { trim: false });
        frame.render_widget(empty, chunks[1]);
    } else {
        let width = chunks[1].width.saturating_sub(8).max(20) as usize;
        let items: Vec<ListItem> = visible
            .iter()
            .map(|record| {
                let row = RowView::build(record, view.is_expanded(record.application.id));
                ListItem::new(row_lines(&row, width))
            })
            .collect();

        let list = List::new(items)
            .block(block)
            .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, chunks[1], list_state);
    }

    let help = match &state.search_input {
        Some(_) => " type to search  enter/esc:done".to_string(),
        None => " j/k:navigate  enter:details  /:search  f:flagged  c:client  r:range  R:reload  q:quit".to_string(),
    };
    frame.render_widget(
        Paragraph::new(help).style(Style::default().fg(Color::DarkGray)),
        chunks[2],
    );
}

fn build_header(state: &AppState) -> Paragraph<'_> {
    let view = &state.view;
    let identity = view.identity();
    let stats = view.stats();
    let filters = view.filters();

    let mut lines = vec![
        Line::from(vec![
            Span::styled(
                format!(" {} ", identity.name),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("({})", identity.role.as_str()), Style::default().fg(Color::DarkGray)),
            Span::raw(format!(
                "   Total {}   Flagged {}   Today {}",
                stats.total, stats.flagged, stats.today
            )),
            if view.is_loading() {
                Span::styled("   loading...", Style::default().fg(Color::Yellow))
            } else {
                Span::raw("")
            },
        ]),
        Line::from(format!(
            " Client: {} (of {})   Range: {}   Flagged only: {}",
            view.selected_client_name().unwrap_or_else(|| "All Clients".to_string()),
            view.clients().len(),
            filters.range.label(),
            if filters.flagged_only { "yes" } else { "no" },
        )),
    ];

    let search = match &state.search_input {
        Some(input) => Span::styled(format!(" Search: {}_", input), Style::default().fg(Color::Cyan)),
        None if filters.search.is_empty() => Span::styled(" Search: (none)", Style::default().fg(Color::DarkGray)),
        None => Span::raw(format!(" Search: {}", filters.search)),
    };
    lines.push(Line::from(search));

    if let Some(err) = view.clients_error() {
        lines.push(Line::from(Span::styled(format!(" {}", err), Style::default().fg(Color::Red))));
    }

    // A failed reload keeps the old rows on screen; say so.
    if let Some(err) = view.last_error() {
        if !view.records().is_empty() {
            lines.push(Line::from(Span::styled(format!(" {}", err), Style::default().fg(Color::Red))));
        }
    }

    Paragraph::new(lines)
}

fn row_lines(row: &RowView, width: usize) -> Text<'static> {
    let marker_style = match row.marker {
        Marker::Flagged => Style::default().fg(Color::Red),
        Marker::Ok => Style::default().fg(Color::Green),
    };

    let mut lines = vec![
        Line::from(vec![
            Span::styled(format!("{} ", row.marker.symbol()), marker_style),
            Span::styled(row.company.clone(), Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(format!(" • {}", row.job_title)),
        ]),
        Line::from(Span::styled(
            format!("  {} • {} • {}", row.client, row.date, row.source),
            Style::default().fg(Color::DarkGray),
        )),
    ];

    if let Some(details) = &row.details {
        for (label, value) in &details.fields {
            lines.push(Line::from(format!("    {}: {}", label, value)));
        }
        for (label, url) in &details.links {
            lines.push(Line::from(Span::styled(
                format!("    {}: {}", label, url),
                Style::default().fg(Color::Cyan),
            )));
        }
        if let Some(reason) = &details.flag_reason {
            for line in textwrap::fill(&format!("Flag: {}", reason), width).lines() {
                lines.push(Line::from(Span::styled(
                    format!("    {}", line),
                    Style::default().fg(Color::Red),
                )));
            }
        }
    }

    Text::from(lines)
}
