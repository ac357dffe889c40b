use crate::model::{ConnectionState, InterfaceState, Severity, Status, UiCommand};
use crate::orchestrator::Snapshot;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    style::{Color, Style},
    text::{Line, Span},
};

/// UI-thread view state. Everything except the help toggle comes from the
/// latest controller snapshot.
#[derive(Default)]
pub struct UiState {
    pub snapshot: Option<Snapshot>,
    pub show_help: bool,
}

/// What a key press asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Send(UiCommand),
    ToggleHelp,
    CloseHelp,
    Ignore,
}

pub fn map_key(k: KeyEvent) -> KeyAction {
    match (k.modifiers, k.code) {
        (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
            KeyAction::Send(UiCommand::Quit)
        }
        (_, KeyCode::Up) | (_, KeyCode::Char('k')) => KeyAction::Send(UiCommand::MoveUp),
        (_, KeyCode::Down) | (_, KeyCode::Char('j')) => KeyAction::Send(UiCommand::MoveDown),
        (_, KeyCode::Enter) => KeyAction::Send(UiCommand::Select),
        (_, KeyCode::Char('r')) => KeyAction::Send(UiCommand::Refresh),
        (_, KeyCode::Char('?')) => KeyAction::ToggleHelp,
        (_, KeyCode::Esc) => KeyAction::CloseHelp,
        _ => KeyAction::Ignore,
    }
}

pub fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Info => Color::White,
        Severity::Warn => Color::Yellow,
        Severity::Error => Color::Red,
        Severity::Command => Color::Cyan,
        Severity::Success => Color::Green,
    }
}

fn connection_color(state: ConnectionState) -> Color {
    match state {
        ConnectionState::Connected => Color::Green,
        ConnectionState::Unknown => Color::Gray,
        ConnectionState::MultipleDevices | ConnectionState::Unauthorized => Color::Yellow,
        _ => Color::Red,
    }
}

pub fn push_wrapped_status_kv(
    out: &mut Vec<Line<'static>>,
    label: &str,
    value: &str,
    value_style: Style,
    status_area_width: u16,
) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }

    // Borders take two columns on each side.
    let usable_width = status_area_width.saturating_sub(4).max(1);
    let label_text = format!("{label}:");
    let label_width = label_text.chars().count() as u16;

    let value_chars: Vec<char> = value.chars().collect();
    let mut remaining = value_chars.as_slice();
    let mut first = true;

    while !remaining.is_empty() {
        let line_width = if first {
            usable_width.saturating_sub(label_width + 1).max(1)
        } else {
            usable_width.saturating_sub(2).max(1)
        };

        let chars_to_take = (remaining.len() as u16).min(line_width) as usize;
        let (line_chars, rest) = remaining.split_at(chars_to_take);
        let line_text: String = line_chars.iter().collect();

        if first {
            out.push(Line::from(vec![
                Span::styled(label_text.clone(), Style::default().fg(Color::Gray)),
                Span::raw(" "),
                Span::styled(line_text, value_style),
            ]));
            first = false;
        } else {
            out.push(Line::from(vec![
                Span::raw("  "),
                Span::styled(line_text, value_style),
            ]));
        }

        remaining = rest;
    }
}

/// Status pane contents, wrapped to `width`.
pub fn status_lines(status: &Status, width: u16) -> Vec<Line<'static>> {
    let plain = Style::default();
    let mut out = Vec::new();

    push_wrapped_status_kv(
        &mut out,
        "ADB Status",
        status.connection.label(),
        Style::default().fg(connection_color(status.connection)),
        width,
    );

    let device = match status.device_identifier.as_deref() {
        Some(id) if id != status.device_display_name => {
            format!("{} ({id})", status.device_display_name)
        }
        _ => status.device_display_name.clone(),
    };
    push_wrapped_status_kv(&mut out, "Device", &device, plain, width);
    push_wrapped_status_kv(&mut out, "USB Mode", &status.current_mode, plain, width);

    let (tether_text, tether_color) = if status.tethering_active {
        ("Active (RNDIS)", Color::Green)
    } else {
        ("Inactive", Color::Gray)
    };
    push_wrapped_status_kv(
        &mut out,
        "Tethering",
        tether_text,
        Style::default().fg(tether_color),
        width,
    );

    let settings = format!(
        "dun_required={} offload_disabled={}",
        status.tether_dun_required.as_deref().unwrap_or("?"),
        status.tether_offload_disabled.as_deref().unwrap_or("?"),
    );
    push_wrapped_status_kv(&mut out, "Settings", &settings, plain, width);

    let iface = match (status.interface_state, status.host_interface.as_deref()) {
        (_, Some(name)) => name.to_string(),
        (InterfaceState::NotChecked, None) => "Checking...".into(),
        (InterfaceState::Failed, None) => "Check failed".into(),
        _ => "Not detected".into(),
    };
    push_wrapped_status_kv(&mut out, "Host Iface", &iface, plain, width);

    let (ip_text, ip_color) = match (status.interface_state, status.host_ipv4.as_deref()) {
        (_, Some(ip)) => (ip.to_string(), Color::Green),
        (InterfaceState::NoAddress, None) => ("No IP (needs DHCP)".to_string(), Color::Yellow),
        _ => ("N/A".to_string(), Color::Gray),
    };
    push_wrapped_status_kv(
        &mut out,
        "Host IP",
        &ip_text,
        Style::default().fg(ip_color),
        width,
    );

    out
}
