use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

fn keybind(keys: &[&'static str], pad: usize, what: &'static str) -> Line<'static> {
    let mut spans = vec![Span::raw("  ")];
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" / "));
        }
        spans.push(Span::styled(*key, Style::default().fg(Color::Magenta)));
    }
    spans.push(Span::raw(" ".repeat(pad)));
    spans.push(Span::raw(what));
    Line::from(spans)
}

/// Centered rectangle of the given size, clamped to `area`.
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(area.height.saturating_sub(height) / 2),
            Constraint::Length(height),
            Constraint::Min(0),
        ])
        .split(area);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(area.width.saturating_sub(width) / 2),
            Constraint::Length(width),
            Constraint::Min(0),
        ])
        .split(vertical[1]);
    horizontal[1]
}

/// Keybind overlay drawn on top of the dashboard.
pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        keybind(&["↑", "k"], 6, "Move up"),
        keybind(&["↓", "j"], 6, "Move down"),
        keybind(&["Enter"], 8, "Run selected item"),
        keybind(&["r"], 12, "Refresh status & flush log"),
        keybind(&["?"], 12, "Toggle this help"),
        keybind(&["q", "Ctrl-C"], 3, "Quit"),
        Line::from(""),
        Line::from("Enable/Disable need a connected, authorized device."),
        Line::from("Status refreshes periodically while idle."),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));

    let rect = centered(area, 58, 12);
    f.render_widget(Clear, rect);
    f.render_widget(p, rect);
}
