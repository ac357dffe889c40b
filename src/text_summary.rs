//! Text summary builder for CLI output.

use crate::model::{ActionResult, AppEvent, InterfaceState, Status};
use crate::orchestrator::log::{truncate_output, EventLog};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

fn or_dash(v: Option<&str>) -> &str {
    v.unwrap_or("-")
}

/// Status block followed by the messages the check produced.
pub(crate) fn build_status_summary(status: &Status, log: &EventLog) -> TextSummary {
    let mut lines = Vec::new();

    lines.push(format!("ADB status: {}", status.connection.label()));
    match status.device_identifier.as_deref() {
        Some(id) if id != status.device_display_name => {
            lines.push(format!("Device: {} ({id})", status.device_display_name))
        }
        _ => lines.push(format!("Device: {}", status.device_display_name)),
    }
    lines.push(format!("USB mode: {}", status.current_mode));
    lines.push(format!(
        "Tethering: {}",
        if status.tethering_active { "active" } else { "inactive" }
    ));
    lines.push(format!(
        "Settings: tether_dun_required={} tether_offload_disabled={}",
        or_dash(status.tether_dun_required.as_deref()),
        or_dash(status.tether_offload_disabled.as_deref()),
    ));

    let iface = match status.interface_state {
        InterfaceState::Failed => "check failed".to_string(),
        _ => or_dash(status.host_interface.as_deref()).to_string(),
    };
    lines.push(format!(
        "Host interface: {iface} / {}",
        or_dash(status.host_ipv4.as_deref())
    ));

    lines.push(String::new());
    for entry in log.iter() {
        lines.push(format!("[{}] {}", entry.severity.label(), entry.text));
    }

    TextSummary { lines }
}

pub(crate) fn build_action_summary(result: &ActionResult) -> TextSummary {
    let mut lines = Vec::new();
    if result.succeeded {
        lines.push(format!(
            "Tethering {}: OK ({} steps)",
            result.action, result.steps_run
        ));
    } else {
        lines.push(format!(
            "Tethering {}: FAILED after {} steps",
            result.action, result.steps_run
        ));
        lines.push(format!(
            "Failed step: {}",
            or_dash(result.failed_step.as_deref())
        ));
        if let Some(out) = result.output.as_deref().filter(|o| !o.is_empty()) {
            lines.push(format!("Output: {}", truncate_output(out)));
        }
    }
    for soft in &result.soft_failures {
        lines.push(format!("Non-critical step failed: {soft}"));
    }
    TextSummary { lines }
}

/// Progress line for a sequence event, if it deserves one.
pub(crate) fn progress_line(ev: &AppEvent) -> Option<String> {
    match ev {
        AppEvent::StepStarted {
            description,
            command_line,
            ..
        } => Some(format!("[CMD] {description}: {command_line}")),
        AppEvent::StepFinished(o) if !o.succeeded => Some(format!(
            "[FAIL] {} ({})",
            o.description,
            truncate_output(&o.output)
        )),
        _ => None,
    }
}
