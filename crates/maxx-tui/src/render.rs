//! Terminal carousel.
//!
//! The render loop never waits on the core: each frame it takes the latest
//! committed snapshot if there is a new one and otherwise redraws what it
//! already has.  `Scene::build` is the pure part (snapshot → what to show);
//! `draw` puts a scene on a ratatui frame.

use std::io;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use maxx_proto::machine::Phase;
use maxx_proto::state::{Snapshot, StateReader};
use ratatui::crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::diagnostics::Diagnostic;
use crate::theme::{
    phase_color, style_default, style_focused_border, style_muted, style_secondary,
    style_selected, style_unfocused_border, C_BG, C_ERROR, C_PLAYING, C_STARS, C_TAG,
};

/// Columns per carousel card, borders included.
const CARD_WIDTH: u16 = 30;

/// How long a warning stays on the status line.
const DIAGNOSTIC_TTL: Duration = Duration::from_secs(5);

/// The most recent warning, until it expires.
#[derive(Default)]
struct DiagnosticSlot {
    current: Option<(String, Instant)>,
}

impl DiagnosticSlot {
    fn set(&mut self, diagnostic: &Diagnostic, now: Instant) {
        self.current = Some((diagnostic.to_string(), now));
    }

    /// Clear an expired line.  Returns whether anything changed.
    fn expire(&mut self, now: Instant) -> bool {
        match &self.current {
            Some((_, since)) if now.duration_since(*since) >= DIAGNOSTIC_TTL => {
                self.current = None;
                true
            }
            _ => false,
        }
    }

    fn line(&self) -> Option<&str> {
        self.current.as_ref().map(|(line, _)| line.as_str())
    }
}

/// One carousel card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub index: usize,
    pub title: String,
    /// `None` when the catalog did not give one.
    pub year: Option<u32>,
    pub rating: String,
    pub genres: String,
    pub banner: String,
    pub selected: bool,
    pub playing: bool,
}

/// Everything one frame shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scene {
    pub header: String,
    pub phase: Phase,
    pub cards: Vec<Card>,
    pub status: String,
    pub status_is_error: bool,
}

impl Scene {
    /// Lay out `visible` cards centred on the selection.
    pub fn build(
        snapshot: &Snapshot,
        visible: usize,
        remotes: usize,
        diagnostic: Option<&str>,
    ) -> Self {
        let header = format!(
            " streammaxx │ {} │ query: {} │ {} titles │ {} remote{}",
            snapshot.phase.label(),
            snapshot.query.as_deref().unwrap_or("-"),
            snapshot.entries.len(),
            remotes,
            if remotes == 1 { "" } else { "s" },
        );

        let cards = window(snapshot.selection, snapshot.entries.len(), visible)
            .map(|index| {
                let entry = &snapshot.entries[index];
                Card {
                    index,
                    title: entry.title.clone(),
                    year: (entry.year > 0).then_some(entry.year),
                    rating: entry.rating.clone(),
                    genres: entry.genres.join(" / "),
                    banner: entry.banner_ref.clone(),
                    selected: index == snapshot.selection,
                    playing: snapshot.phase == Phase::Requesting
                        && snapshot.playing.as_deref() == Some(entry.title.as_str()),
                }
            })
            .collect();

        let (status, status_is_error) = if let Some(err) = snapshot.last_error.as_deref() {
            (err.to_string(), true)
        } else if let Some(line) = diagnostic {
            (line.to_string(), true)
        } else if let Some(title) = snapshot.playing.as_deref() {
            let quality = snapshot.quality.as_deref().unwrap_or("resolving quality…");
            (format!("▶ {} [{}]", title, quality), false)
        } else {
            ("q quit".to_string(), false)
        };

        Self {
            header,
            phase: snapshot.phase,
            cards,
            status,
            status_is_error,
        }
    }
}

/// Indices of the `visible` entries around `selection`, clamped to the list.
fn window(selection: usize, len: usize, visible: usize) -> Range<usize> {
    let visible = visible.max(1).min(len);
    let start = selection
        .saturating_sub(visible / 2)
        .min(len.saturating_sub(visible));
    start..start + visible
}

fn truncate(text: &str, max: usize) -> String {
    if text.width() <= max {
        return text.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}

pub fn draw(frame: &mut Frame, snapshot: &Snapshot, remotes: usize, diagnostic: Option<&str>) {
    let area = frame.area();
    frame.render_widget(Block::default().style(Style::default().bg(C_BG)), area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(area);

    let visible = (rows[1].width / CARD_WIDTH).max(1) as usize;
    let scene = Scene::build(snapshot, visible, remotes, diagnostic);

    draw_header(frame, rows[0], &scene);
    draw_cards(frame, rows[1], &scene);
    draw_status(frame, rows[2], &scene);
}

fn draw_header(frame: &mut Frame, area: Rect, scene: &Scene) {
    let line = Line::from(vec![
        Span::styled("●", Style::default().fg(phase_color(scene.phase))),
        Span::styled(scene.header.clone(), style_default()),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn draw_cards(frame: &mut Frame, area: Rect, scene: &Scene) {
    if scene.cards.is_empty() {
        frame.render_widget(
            Paragraph::new("loading…").style(style_muted()),
            area,
        );
        return;
    }

    let constraints: Vec<Constraint> = scene
        .cards
        .iter()
        .map(|_| Constraint::Ratio(1, scene.cards.len() as u32))
        .collect();
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area);

    for (card, column) in scene.cards.iter().zip(columns.iter()) {
        let inner_width = column.width.saturating_sub(2) as usize;
        let border = if card.selected {
            style_focused_border()
        } else {
            style_unfocused_border()
        };
        let title_style = if card.playing {
            Style::default().fg(C_PLAYING).add_modifier(Modifier::BOLD)
        } else if card.selected {
            style_selected()
        } else {
            style_default()
        };

        let mut lines = vec![
            Line::from(Span::styled(truncate(&card.title, inner_width), title_style)),
            Line::from(Span::styled(
                card.year.map(|y| y.to_string()).unwrap_or_else(|| "—".into()),
                style_secondary(),
            )),
            Line::from(Span::styled(
                format!("★ {}", card.rating),
                Style::default().fg(C_STARS),
            )),
        ];
        if !card.genres.is_empty() {
            lines.push(Line::from(Span::styled(
                truncate(&card.genres, inner_width),
                Style::default().fg(C_TAG),
            )));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            truncate(&card.banner, inner_width),
            style_muted(),
        )));
        if card.playing {
            lines.push(Line::from(Span::styled("▶ playing", Style::default().fg(C_PLAYING))));
        }

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(border)
            .title(format!(" {} ", card.index));
        frame.render_widget(
            Paragraph::new(lines).block(block).wrap(Wrap { trim: true }),
            *column,
        );
    }
}

fn draw_status(frame: &mut Frame, area: Rect, scene: &Scene) {
    let style = if scene.status_is_error {
        Style::default().fg(C_ERROR)
    } else {
        style_secondary()
    };
    let text = truncate(&scene.status, area.width as usize);
    frame.render_widget(Paragraph::new(Span::styled(text, style)), area);
}

fn is_quit(event: &Event) -> bool {
    match event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) => match code {
            KeyCode::Char('q') | KeyCode::Esc => true,
            KeyCode::Char('c') => modifiers.contains(KeyModifiers::CONTROL),
            _ => false,
        },
        _ => false,
    }
}

/// Run the carousel until the user quits.
pub async fn run(
    mut reader: StateReader,
    mut diagnostics: broadcast::Receiver<Diagnostic>,
    connected: Arc<AtomicUsize>,
    fps: u32,
) -> anyhow::Result<()> {
    debug!("render: enabling raw mode");
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, &mut reader, &mut diagnostics, &connected, fps).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    info!("render: terminal restored");
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    reader: &mut StateReader,
    diagnostics: &mut broadcast::Receiver<Diagnostic>,
    connected: &AtomicUsize,
    fps: u32,
) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel::<Event>(64);

    // ── Background task: terminal events ──────────────────────────────────
    tokio::task::spawn_blocking(move || loop {
        if tx.is_closed() {
            break;
        }
        match event::poll(Duration::from_millis(100)) {
            Ok(true) => match event::read() {
                Ok(ev) => {
                    if tx.blocking_send(ev).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            Ok(false) => {}
            Err(_) => break,
        }
    });

    let mut frame_tick = tokio::time::interval(Duration::from_millis(1000 / fps.max(1) as u64));
    frame_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut snapshot = reader.snapshot();
    let mut diagnostic = DiagnosticSlot::default();
    let mut remotes = connected.load(Ordering::Relaxed);
    let mut needs_redraw = true;

    loop {
        if needs_redraw {
            terminal.draw(|f| draw(f, &snapshot, remotes, diagnostic.line()))?;
            needs_redraw = false;
        }

        tokio::select! {
            ev = rx.recv() => match ev {
                Some(ev) if is_quit(&ev) => break,
                Some(Event::Resize(..)) => needs_redraw = true,
                Some(_) => {}
                None => break,
            },

            _ = frame_tick.tick() => {
                if let Some(fresh) = reader.fresh() {
                    snapshot = fresh;
                    needs_redraw = true;
                }
                let now = Instant::now();
                if diagnostic.expire(now) {
                    needs_redraw = true;
                }
                loop {
                    match diagnostics.try_recv() {
                        Ok(line) => {
                            diagnostic.set(&line, now);
                            needs_redraw = true;
                        }
                        Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                        Err(_) => break,
                    }
                }
                let live = connected.load(Ordering::Relaxed);
                if live != remotes {
                    remotes = live;
                    needs_redraw = true;
                }
            }
        }
    }

    Ok(())
}
