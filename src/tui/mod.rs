mod help;
mod state;

use crate::engine::TetherEngine;
use crate::model::{RunConfig, UiCommand};
use crate::orchestrator::{self, MenuItem, Phase, Snapshot, MENU_ITEMS};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Terminal,
};
use state::{KeyAction, UiState};
use std::{io, time::Duration, time::Instant};
use time::macros::format_description;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(cfg: RunConfig) -> Result<()> {
    let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel::<Snapshot>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // Terminal I/O is blocking, so the UI gets its own thread.
    let ui_handle = std::thread::spawn(move || run_threaded(snapshot_rx, cmd_tx));

    let engine = TetherEngine::new(&cfg);
    let res = orchestrator::run_controller(&cfg, engine, snapshot_tx, cmd_rx).await;

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
pub fn run_threaded(
    mut snapshot_rx: UnboundedReceiver<Snapshot>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = match Terminal::new(backend).context("create terminal") {
        Ok(t) => t,
        Err(e) => {
            restore_terminal();
            return Err(e);
        }
    };
    terminal.clear().ok();

    let mut state = UiState::default();
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();
    let mut redraw = true;

    let res = loop {
        // Only the newest snapshot matters.
        let mut controller_gone = false;
        loop {
            match snapshot_rx.try_recv() {
                Ok(snap) => state.snapshot = Some(snap),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    controller_gone = true;
                    break;
                }
            }
        }
        if controller_gone {
            break Ok(());
        }

        if redraw || last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
            redraw = false;
        }

        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match state::map_key(k) {
                    KeyAction::Send(UiCommand::Quit) => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                    KeyAction::Send(cmd) => {
                        state.show_help = false;
                        let _ = cmd_tx.send(cmd);
                    }
                    KeyAction::ToggleHelp => state.show_help = !state.show_help,
                    KeyAction::CloseHelp => state.show_help = false,
                    KeyAction::Ignore => {}
                }
                redraw = true;
            }
        }
    };

    restore_terminal();
    res
}

fn restore_terminal() {
    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(11),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);

    let banner = Paragraph::new(Line::from(vec![
        Span::styled(
            "ADB USB Tethering Manager",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("  v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]))
    .block(Block::default().borders(Borders::ALL).title("adb-tether"));
    f.render_widget(banner, chunks[0]);

    let Some(snap) = state.snapshot.as_ref() else {
        let waiting = Paragraph::new("Starting...")
            .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(waiting, chunks[1]);
        return;
    };

    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(chunks[1]);

    let status = Paragraph::new(state::status_lines(&snap.status, top[0].width))
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, top[0]);

    draw_menu(top[1], f, snap);
    draw_log(chunks[2], f, snap);
    draw_footer(chunks[3], f, snap);

    if state.show_help {
        help::draw_help(area, f);
    }
}

fn draw_menu(area: Rect, f: &mut ratatui::Frame, snap: &Snapshot) {
    let can_act = snap.phase == Phase::Idle && snap.status.device_ready;
    let lines: Vec<Line> = MENU_ITEMS
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let selected = i == snap.cursor;
            let available = match item {
                MenuItem::EnableTethering | MenuItem::DisableTethering => can_act,
                MenuItem::RefreshAndFlush => snap.phase == Phase::Idle,
                MenuItem::Exit => true,
            };
            let mut style = if available {
                Style::default()
            } else {
                Style::default().fg(Color::DarkGray)
            };
            if selected {
                style = style.fg(Color::Black).bg(Color::Cyan);
            }
            let marker = if selected { "> " } else { "  " };
            Line::from(Span::styled(format!("{marker}{}", item.label()), style))
        })
        .collect();

    let menu = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Actions"));
    f.render_widget(menu, area);
}

fn draw_log(area: Rect, f: &mut ratatui::Frame, snap: &Snapshot) {
    let fmt = format_description!("[hour]:[minute]:[second]");
    let visible = area.height.saturating_sub(2) as usize;
    let skip = snap.log.len().saturating_sub(visible);

    let lines: Vec<Line> = snap
        .log
        .iter()
        .skip(skip)
        .map(|entry| {
            let ts = entry.timestamp.format(fmt).unwrap_or_default();
            let color = state::severity_color(entry.severity);
            Line::from(vec![
                Span::styled(format!("{ts} "), Style::default().fg(Color::DarkGray)),
                Span::styled(
                    format!("[{:<5}] ", entry.severity.label()),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ),
                Span::styled(entry.text.clone(), Style::default().fg(color)),
            ])
        })
        .collect();

    let log = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Log ({} entries)", snap.log.len())),
    );
    f.render_widget(log, area);
}

fn draw_footer(area: Rect, f: &mut ratatui::Frame, snap: &Snapshot) {
    let line = match snap.phase.busy_label() {
        Some(busy) => Line::from(Span::styled(busy, Style::default().fg(Color::Yellow))),
        None => Line::from(vec![
            Span::styled("↑/↓", Style::default().fg(Color::Magenta)),
            Span::raw(" move  "),
            Span::styled("Enter", Style::default().fg(Color::Magenta)),
            Span::raw(" select  "),
            Span::styled("r", Style::default().fg(Color::Magenta)),
            Span::raw(" refresh  "),
            Span::styled("?", Style::default().fg(Color::Magenta)),
            Span::raw(" help  "),
            Span::styled("q", Style::default().fg(Color::Magenta)),
            Span::raw(" quit"),
        ]),
    };
    f.render_widget(Paragraph::new(line), area);
}
