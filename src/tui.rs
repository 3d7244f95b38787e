use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::app::{ProgressEvent, ProgressSink};
use crate::error::ScfError;
use crate::report::{self, ReportEvent, ReportSink};

const EVENTS_MAX: usize = 6;
const LOGS_MAX: usize = 200;
const REPORT_MAX: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Fetch,
    Summary,
    Overtime,
    Plot,
}

impl Operation {
    fn label(self) -> &'static str {
        match self {
            Operation::Fetch => "Fetch",
            Operation::Summary => "Summary",
            Operation::Overtime => "Overtime",
            Operation::Plot => "Plot",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Report,
    Logs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Resolve,
    Fetch,
    Extract,
    Load,
    Aggregate,
    Write,
    Plot,
}

impl Phase {
    const ALL: [Phase; 7] = [
        Phase::Resolve,
        Phase::Fetch,
        Phase::Extract,
        Phase::Load,
        Phase::Aggregate,
        Phase::Write,
        Phase::Plot,
    ];

    fn label(self) -> &'static str {
        match self {
            Phase::Resolve => "Resolve",
            Phase::Fetch => "Fetch",
            Phase::Extract => "Extract",
            Phase::Load => "Load",
            Phase::Aggregate => "Aggregate",
            Phase::Write => "Write",
            Phase::Plot => "Plot",
        }
    }
}

#[derive(Debug)]
struct State {
    status: String,
    phase: Phase,
    latency_ms: Option<u128>,
    requests: u64,
    events: VecDeque<String>,
    logs: VecDeque<String>,
    report: VecDeque<String>,
    view: View,
    started: Instant,
}

pub struct Tui {
    operation: Operation,
    state: Arc<Mutex<State>>,
    scroll: u16,
}

struct TuiSink {
    state: Arc<Mutex<State>>,
}

impl ProgressSink for TuiSink {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut state) = self.state.lock() {
            let message = event.message.trim().to_string();
            if let Some((phase, payload)) = parse_phase(&message) {
                state.phase = phase;
                state.status = payload.to_string();
                if phase == Phase::Fetch && payload.starts_with("GET ") {
                    state.requests = state.requests.saturating_add(1);
                }
            } else if let Some(elapsed) = event.elapsed {
                state.latency_ms = Some(elapsed.as_millis());
            } else {
                state.status = message.clone();
            }
            push_bounded(&mut state.events, message.clone(), EVENTS_MAX);
            push_bounded(
                &mut state.logs,
                format!("[{}] {message}", Local::now().format("%H:%M:%S")),
                LOGS_MAX,
            );
        }
    }
}

impl ReportSink for TuiSink {
    fn report(&self, event: ReportEvent<'_>) {
        if let Ok(mut state) = self.state.lock() {
            for line in report::render_event(event).lines() {
                push_bounded(&mut state.report, line.to_string(), REPORT_MAX);
            }
        }
    }
}

impl Tui {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            state: Arc::new(Mutex::new(State {
                status: "starting".to_string(),
                phase: Phase::Resolve,
                latency_ms: None,
                requests: 0,
                events: VecDeque::new(),
                logs: VecDeque::new(),
                report: VecDeque::new(),
                view: View::Report,
                started: Instant::now(),
            })),
            scroll: 0,
        }
    }

    /// Runs `f` on a worker thread while the main thread renders progress.
    /// Esc aborts the view; the worker is left to finish on its own.
    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink, &dyn ReportSink) -> Result<R, ScfError> + Send + 'static,
        R: Send + 'static,
    {
        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let (tx, rx) = std::sync::mpsc::channel();
        let sink = TuiSink {
            state: self.state.clone(),
        };
        let handle = thread::spawn(move || tx.send(f(&sink, &sink)));

        let mut tick = 0usize;
        loop {
            if let Ok(state) = self.state.lock() {
                terminal
                    .draw(|frame| draw_ui(frame, self.operation, &state, self.scroll, tick))
                    .into_diagnostic()?;
            }

            if let Ok(result) = rx.try_recv() {
                leave_screen()?;
                handle.join().ok();
                return result.map_err(miette::Report::new);
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()?
                && let Event::Key(key) = event::read().into_diagnostic()?
                && self.handle_key(key)
            {
                break;
            }

            tick = tick.wrapping_add(1);
        }

        leave_screen()?;
        Err(miette::Report::msg("aborted"))
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        match key.code {
            KeyCode::Esc => return true,
            KeyCode::F(4) | KeyCode::Char('l') => self.toggle_view(),
            KeyCode::PageUp | KeyCode::Up => self.scroll = self.scroll.saturating_sub(1),
            KeyCode::PageDown | KeyCode::Down => self.scroll = self.scroll.saturating_add(1),
            _ => {}
        }
        false
    }

    fn toggle_view(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.view = match state.view {
                View::Report => View::Logs,
                View::Logs => View::Report,
            };
        }
        self.scroll = 0;
    }
}

fn leave_screen() -> miette::Result<()> {
    disable_raw_mode().into_diagnostic()?;
    io::stdout()
        .execute(LeaveAlternateScreen)
        .into_diagnostic()?;
    Ok(())
}

fn draw_ui(
    frame: &mut ratatui::Frame,
    operation: Operation,
    state: &State,
    scroll: u16,
    tick: usize,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(8),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    frame.render_widget(draw_header(operation, tick), chunks[0]);
    frame.render_widget(draw_status(state), chunks[1]);
    let body = match state.view {
        View::Report => draw_lines("REPORT", &state.report, scroll),
        View::Logs => draw_lines("LOGS", &state.logs, scroll),
    };
    frame.render_widget(body, chunks[2]);
    frame.render_widget(
        Paragraph::new("Esc abort   F4/l toggle logs   ↑/↓ scroll")
            .style(Style::default().fg(Color::Gray)),
        chunks[3],
    );
}

fn draw_header(operation: Operation, tick: usize) -> Paragraph<'static> {
    let hb = if tick % 2 == 0 { "*" } else { " " };
    Paragraph::new(Line::from(vec![
        Span::styled(
            "SCF-WG",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw("   Source: federalreserve.gov   Op: "),
        Span::styled(operation.label(), Style::default().fg(Color::Cyan)),
        Span::raw("   "),
        Span::styled(hb, Style::default().fg(Color::Green)),
    ]))
    .alignment(Alignment::Left)
    .block(Block::default().borders(Borders::BOTTOM))
}

fn draw_status(state: &State) -> Paragraph<'static> {
    let elapsed = state.started.elapsed().as_secs();
    let latency = state
        .latency_ms
        .map(|v| format!("{v} ms"))
        .unwrap_or_else(|| "--".to_string());
    let mut lines = vec![
        Line::from(vec![
            Span::styled("Phase: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{:<9} ", state.phase.label()),
                Style::default().fg(Color::Cyan),
            ),
            Span::raw(phase_track(state.phase)),
        ]),
        Line::from(vec![
            Span::styled("Status: ", Style::default().fg(Color::Gray)),
            Span::raw(state.status.clone()),
        ]),
        Line::from(vec![
            Span::styled("Downloads: ", Style::default().fg(Color::Gray)),
            Span::raw(state.requests.to_string()),
            Span::styled("   Last download: ", Style::default().fg(Color::Gray)),
            Span::raw(latency),
            Span::styled("   Elapsed: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{elapsed}s")),
        ]),
    ];
    for event in state.events.iter().rev().take(4) {
        lines.push(Line::from(format!("- {event}")));
    }
    Paragraph::new(lines)
        .block(Block::default().borders(Borders::BOTTOM))
        .wrap(Wrap { trim: true })
}

fn draw_lines(title: &'static str, lines: &VecDeque<String>, scroll: u16) -> Paragraph<'static> {
    let mut out = vec![Line::from(Span::styled(
        title,
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    ))];
    out.extend(lines.iter().map(|line| Line::from(line.clone())));
    Paragraph::new(out)
        .scroll((scroll, 0))
        .wrap(Wrap { trim: false })
}

fn phase_track(current: Phase) -> String {
    let position = Phase::ALL
        .iter()
        .position(|phase| *phase == current)
        .unwrap_or(0);
    let mut out = String::from("[");
    for i in 0..Phase::ALL.len() {
        out.push(match i.cmp(&position) {
            std::cmp::Ordering::Less => '#',
            std::cmp::Ordering::Equal => '>',
            std::cmp::Ordering::Greater => '.',
        });
    }
    out.push(']');
    out
}

fn parse_phase(message: &str) -> Option<(Phase, &str)> {
    let rest = message.strip_prefix("phase=")?;
    let (name, payload) = rest.split_once(';')?;
    let phase = Phase::ALL
        .into_iter()
        .find(|phase| phase.label() == name.trim())?;
    Some((phase, payload.trim()))
}

fn push_bounded(buffer: &mut VecDeque<String>, item: String, max: usize) {
    buffer.push_back(item);
    while buffer.len() > max {
        buffer.pop_front();
    }
}
