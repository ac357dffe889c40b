//! Application state machine.
//!
//! Owns the status, the operation log and the menu cursor. Every input and
//! every task completion arrives as an [`AppEvent`]; [`Machine::handle`]
//! applies it and returns the asynchronous work to start next.

use super::log::{truncate_output, EventLog, LogEntry};
use crate::model::{
    ActionResult, AppEvent, DetectionOutcome, FailurePolicy, InterfaceState, ResolutionOutcome,
    ResolutionReport, Severity, Status, StepOutcome, TetherAction, UiCommand,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    EnableTethering,
    DisableTethering,
    RefreshAndFlush,
    Exit,
}

impl MenuItem {
    pub fn label(self) -> &'static str {
        match self {
            MenuItem::EnableTethering => "Enable Tethering",
            MenuItem::DisableTethering => "Disable Tethering",
            MenuItem::RefreshAndFlush => "Refresh & Flush Log",
            MenuItem::Exit => "Exit",
        }
    }
}

pub const MENU_ITEMS: [MenuItem; 4] = [
    MenuItem::EnableTethering,
    MenuItem::DisableTethering,
    MenuItem::RefreshAndFlush,
    MenuItem::Exit,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Resolving {
        device_pending: bool,
        interface_pending: bool,
        /// Log every outcome, not only changes.
        announce: bool,
    },
    RunningSequence(TetherAction),
}

impl Phase {
    pub fn busy_label(self) -> Option<&'static str> {
        match self {
            Phase::Idle => None,
            Phase::Resolving { .. } => Some("Checking status..."),
            Phase::RunningSequence(TetherAction::Enable) => Some("Enabling tethering..."),
            Phase::RunningSequence(TetherAction::Disable) => Some("Disabling tethering..."),
        }
    }
}

/// Asynchronous work requested by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ResolveDevice {
        configured: Option<String>,
        previous: Option<String>,
    },
    DetectInterface,
    RunSequence {
        action: TetherAction,
        serial: String,
    },
    Quit,
}

/// Read-only copy of the machine for presentation layers.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub status: Status,
    pub log: Vec<LogEntry>,
    pub cursor: usize,
    pub phase: Phase,
}

pub struct Machine {
    status: Status,
    log: EventLog,
    cursor: usize,
    phase: Phase,
    configured_serial: Option<String>,
    resolved_serial: Option<String>,
    last_resolution: Option<ResolutionOutcome>,
    last_detection: Option<DetectionOutcome>,
}

impl Machine {
    pub fn new(configured_serial: Option<String>, log_capacity: usize) -> Self {
        let mut log = EventLog::new(log_capacity);
        log.push(Severity::Info, "adb-tether initializing...");
        Self {
            status: Status::default(),
            log,
            cursor: 0,
            phase: Phase::Idle,
            configured_serial,
            resolved_serial: None,
            last_resolution: None,
            last_detection: None,
        }
    }

    pub fn warn(&mut self, text: &str) {
        self.log.push(Severity::Warn, text);
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            status: self.status.clone(),
            log: self.log.iter().cloned().collect(),
            cursor: self.cursor,
            phase: self.phase,
        }
    }

    pub fn handle(&mut self, event: AppEvent) -> Vec<Effect> {
        match event {
            AppEvent::Command(cmd) => self.on_command(cmd),
            AppEvent::Tick => {
                if self.phase == Phase::Idle {
                    self.begin_refresh(false)
                } else {
                    tracing::debug!(phase = ?self.phase, "skipping periodic check");
                    Vec::new()
                }
            }
            AppEvent::DeviceResolved(report) => {
                self.apply_resolution(report);
                self.resolving_part_done(true, false);
                Vec::new()
            }
            AppEvent::InterfaceDetected(outcome) => {
                self.apply_detection(outcome);
                self.resolving_part_done(false, true);
                Vec::new()
            }
            AppEvent::StepStarted {
                action,
                description,
                command_line,
            } => {
                tracing::debug!(%action, step = %description, "step started");
                self.log
                    .push(Severity::Command, format!("{description}: `{command_line}`"));
                Vec::new()
            }
            AppEvent::StepFinished(outcome) => {
                self.on_step_finished(outcome);
                Vec::new()
            }
            AppEvent::ActionFinished(result) => self.on_action_finished(result),
        }
    }

    fn on_command(&mut self, cmd: UiCommand) -> Vec<Effect> {
        match cmd {
            UiCommand::MoveUp => {
                self.cursor = self.cursor.saturating_sub(1);
                Vec::new()
            }
            UiCommand::MoveDown => {
                self.cursor = (self.cursor + 1).min(MENU_ITEMS.len() - 1);
                Vec::new()
            }
            UiCommand::Select => match MENU_ITEMS.get(self.cursor).copied() {
                Some(MenuItem::EnableTethering) => self.request_action(TetherAction::Enable),
                Some(MenuItem::DisableTethering) => self.request_action(TetherAction::Disable),
                Some(MenuItem::RefreshAndFlush) => self.request_refresh(),
                Some(MenuItem::Exit) => vec![Effect::Quit],
                None => Vec::new(),
            },
            UiCommand::Refresh => self.request_refresh(),
            UiCommand::Quit => vec![Effect::Quit],
        }
    }

    fn request_refresh(&mut self) -> Vec<Effect> {
        match self.phase {
            Phase::Idle => {
                self.log.clear();
                self.log
                    .push(Severity::Command, "Log flushed. Refreshing status...");
                self.begin_refresh(true)
            }
            Phase::Resolving { .. } => {
                self.log.push(Severity::Info, "Status check already in progress.");
                Vec::new()
            }
            Phase::RunningSequence(running) => {
                self.log.push(
                    Severity::Warn,
                    format!("Cannot refresh while tethering {running} is running."),
                );
                Vec::new()
            }
        }
    }

    fn begin_refresh(&mut self, announce: bool) -> Vec<Effect> {
        self.phase = Phase::Resolving {
            device_pending: true,
            interface_pending: true,
            announce,
        };
        vec![
            Effect::ResolveDevice {
                configured: self.configured_serial.clone(),
                previous: self.resolved_serial.clone(),
            },
            Effect::DetectInterface,
        ]
    }

    fn resolving_part_done(&mut self, device: bool, interface: bool) {
        let Phase::Resolving {
            device_pending,
            interface_pending,
            announce,
        } = self.phase
        else {
            return;
        };
        let device_pending = device_pending && !device;
        let interface_pending = interface_pending && !interface;

        if device_pending || interface_pending {
            self.phase = Phase::Resolving {
                device_pending,
                interface_pending,
                announce,
            };
        } else {
            self.phase = Phase::Idle;
            if announce {
                self.log.push(Severity::Info, "Status refreshed.");
            }
        }
    }

    fn announcing(&self) -> bool {
        matches!(self.phase, Phase::Resolving { announce: true, .. })
    }

    fn request_action(&mut self, action: TetherAction) -> Vec<Effect> {
        match self.phase {
            Phase::RunningSequence(running) => {
                self.log.push(
                    Severity::Warn,
                    format!("Cannot {action}: tethering {running} is already in progress."),
                );
                Vec::new()
            }
            Phase::Resolving { .. } => {
                self.log.push(
                    Severity::Warn,
                    format!("Cannot {action}: status check in progress, try again shortly."),
                );
                Vec::new()
            }
            Phase::Idle => {
                let ready = self.status.device_connected && self.status.device_ready;
                let serial = match (&self.resolved_serial, ready) {
                    (Some(serial), true) => serial.clone(),
                    _ => {
                        self.log.push(
                            Severity::Warn,
                            format!("Cannot {action}: No device connected or authorized."),
                        );
                        return Vec::new();
                    }
                };
                let verb = match action {
                    TetherAction::Enable => "ENABLE",
                    TetherAction::Disable => "DISABLE",
                };
                self.log.push(
                    Severity::Command,
                    format!("Attempting to {verb} tethering on {serial}..."),
                );
                self.phase = Phase::RunningSequence(action);
                vec![Effect::RunSequence { action, serial }]
            }
        }
    }

    fn on_step_finished(&mut self, outcome: StepOutcome) {
        tracing::debug!(index = outcome.index, ok = outcome.succeeded, "step finished");
        if outcome.succeeded {
            return;
        }
        let detail = if outcome.output.is_empty() {
            String::new()
        } else {
            format!(" (Output: {})", truncate_output(&outcome.output))
        };
        match outcome.policy {
            FailurePolicy::AbortOnFailure => self
                .log
                .push(Severity::Error, format!("FAILED: {}{detail}", outcome.description)),
            FailurePolicy::ContinueOnFailure => self.log.push(
                Severity::Warn,
                format!("FAILED (continuing): {}{detail}", outcome.description),
            ),
        }
    }

    fn on_action_finished(&mut self, result: ActionResult) -> Vec<Effect> {
        let past = match result.action {
            TetherAction::Enable => "enabled",
            TetherAction::Disable => "disabled",
        };
        if result.succeeded {
            let soft = match result.soft_failures.len() {
                0 => String::new(),
                n => format!(" ({n} non-critical step(s) failed)"),
            };
            self.log
                .push(Severity::Success, format!("SUCCESS: tethering {past}{soft}."));
            if result.action == TetherAction::Enable {
                self.log.push(
                    Severity::Info,
                    "Reminder: the new host interface may need DHCP configuration.",
                );
            }
        } else {
            let step = result.failed_step.as_deref().unwrap_or("unknown step");
            let detail = match result.output.as_deref() {
                Some(out) if !out.is_empty() => format!(" (Output: {})", truncate_output(out)),
                _ => String::new(),
            };
            self.log.push(
                Severity::Error,
                format!(
                    "Tethering {} aborted after {} step(s) at: {step}{detail}",
                    result.action, result.steps_run
                ),
            );
        }
        self.log
            .push(Severity::Info, "Tethering commands sent. Refreshing status.");
        self.begin_refresh(true)
    }

    fn apply_resolution(&mut self, report: ResolutionReport) {
        let ResolutionReport { outcome, details } = report;
        let status = &mut self.status;

        status.tool_available = outcome != ResolutionOutcome::NoToolFound;
        status.connection = outcome.connection_state();
        status.device_ready = matches!(outcome, ResolutionOutcome::Ready(_));
        status.device_connected =
            matches!(outcome, ResolutionOutcome::Ready(_) | ResolutionOutcome::AuthorizationFailed(_));
        status.device_identifier = match &outcome {
            ResolutionOutcome::Ready(id)
            | ResolutionOutcome::AuthorizationFailed(id)
            | ResolutionOutcome::DeviceNotFound(id) => Some(id.clone()),
            _ => None,
        };

        let details = details.unwrap_or_default();
        status.device_display_name = match &outcome {
            ResolutionOutcome::AmbiguousMultiple(found) => {
                format!("Specify serial (found: {})", found.join(", "))
            }
            ResolutionOutcome::Ready(id) => details.model.clone().unwrap_or_else(|| id.clone()),
            ResolutionOutcome::AuthorizationFailed(id) | ResolutionOutcome::DeviceNotFound(id) => id.clone(),
            _ => "N/A".into(),
        };
        status.current_mode = details.usb_functions.clone().unwrap_or_else(|| "unknown".into());
        status.tethering_active = details
            .usb_functions
            .as_deref()
            .is_some_and(|f| f.split(',').any(|m| m.trim() == crate::engine::TETHER_USB_FUNCTION));
        status.tether_dun_required = details.tether_dun_required;
        status.tether_offload_disabled = details.tether_offload_disabled;

        self.resolved_serial = outcome.identifier().map(String::from);

        let changed = self.last_resolution.as_ref() != Some(&outcome);
        if changed || self.announcing() {
            let (severity, text) = describe_resolution(&outcome);
            self.log.push(severity, text);
        }
        self.last_resolution = Some(outcome);
    }

    fn apply_detection(&mut self, outcome: DetectionOutcome) {
        let status = &mut self.status;
        let (state, name, ipv4) = match &outcome {
            DetectionOutcome::NotDetected => (InterfaceState::NotDetected, None, None),
            DetectionOutcome::DetectedNoAddress(name) => (InterfaceState::NoAddress, Some(name.clone()), None),
            DetectionOutcome::DetectedWithAddress { name, ipv4 } => {
                (InterfaceState::Ready, Some(name.clone()), Some(ipv4.clone()))
            }
            DetectionOutcome::Failed(_) => (InterfaceState::Failed, None, None),
        };
        status.interface_state = state;
        status.host_interface = name;
        status.host_ipv4 = ipv4;

        let changed = self.last_detection.as_ref() != Some(&outcome);
        if changed || self.announcing() {
            let (severity, text) = describe_detection(&outcome);
            self.log.push(severity, text);
        }
        self.last_detection = Some(outcome);
    }
}

fn describe_resolution(outcome: &ResolutionOutcome) -> (Severity, String) {
    match outcome {
        ResolutionOutcome::NoToolFound => (
            Severity::Error,
            "adb command not found. Install android-tools and make sure adb is in PATH, then refresh.".into(),
        ),
        ResolutionOutcome::ListingFailed(output) => (
            Severity::Error,
            format!("adb device listing failed: {}", truncate_output(output)),
        ),
        ResolutionOutcome::NoDeviceFound => (
            Severity::Error,
            "No Android device detected. Connect phone & enable USB debugging.".into(),
        ),
        ResolutionOutcome::AmbiguousMultiple(found) => (
            Severity::Warn,
            format!(
                "Multiple devices found. Restart with --serial to select one: {}",
                found.join(", ")
            ),
        ),
        ResolutionOutcome::DeviceNotFound(id) => (
            Severity::Error,
            format!("Specified device ({id}) not found among connected devices."),
        ),
        ResolutionOutcome::AuthorizationFailed(id) => (
            Severity::Error,
            format!("Failed to communicate with {id}. Ensure authorization (prompt on phone)."),
        ),
        ResolutionOutcome::Ready(id) => (
            Severity::Success,
            format!("ADB connection established with {id}."),
        ),
    }
}

fn describe_detection(outcome: &DetectionOutcome) -> (Severity, String) {
    match outcome {
        DetectionOutcome::NotDetected => (
            Severity::Warn,
            "No active USB tethering interface found on this host.".into(),
        ),
        DetectionOutcome::DetectedNoAddress(name) => (
            Severity::Warn,
            format!("Host interface '{name}' detected, but no IP. Needs DHCP config."),
        ),
        DetectionOutcome::DetectedWithAddress { name, ipv4 } => (
            Severity::Success,
            format!("Host interface '{name}' detected with IP: {ipv4}."),
        ),
        DetectionOutcome::Failed(reason) => (
            Severity::Error,
            format!("Interface check failed: {}", truncate_output(reason)),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeviceDetails;
    use pretty_assertions::assert_eq;

    fn ready_report(id: &str) -> ResolutionReport {
        ResolutionReport {
            outcome: ResolutionOutcome::Ready(id.into()),
            details: Some(DeviceDetails {
                model: Some("Pixel 7".into()),
                usb_functions: Some("mtp,adb".into()),
                tether_dun_required: Some("1".into()),
                tether_offload_disabled: Some("0".into()),
            }),
        }
    }

    /// Machine after a completed refresh that resolved `report`.
    fn refreshed(report: ResolutionReport) -> Machine {
        let mut m = Machine::new(None, 20);
        m.handle(AppEvent::Tick);
        m.handle(AppEvent::DeviceResolved(report));
        m.handle(AppEvent::InterfaceDetected(DetectionOutcome::NotDetected));
        m
    }

    fn last_log(m: &Machine) -> (Severity, String) {
        let entry = m.log().iter().last().expect("log is not empty");
        (entry.severity, entry.text.clone())
    }

    #[test]
    fn tick_schedules_resolution_and_detection() {
        let mut m = Machine::new(Some("ABC123".into()), 20);
        let effects = m.handle(AppEvent::Tick);
        assert_eq!(
            effects,
            vec![
                Effect::ResolveDevice {
                    configured: Some("ABC123".into()),
                    previous: None
                },
                Effect::DetectInterface
            ]
        );
        assert!(matches!(m.phase, Phase::Resolving { .. }));
    }

    #[test]
    fn resolving_ends_only_after_both_results() {
        let mut m = Machine::new(None, 20);
        m.handle(AppEvent::Tick);
        m.handle(AppEvent::InterfaceDetected(DetectionOutcome::DetectedWithAddress {
            name: "rndis0".into(),
            ipv4: "192.168.42.1".into(),
        }));
        assert!(matches!(m.phase, Phase::Resolving { device_pending: true, .. }));

        m.handle(AppEvent::DeviceResolved(ready_report("ABC123")));

        assert_eq!(m.phase, Phase::Idle);
        let status = m.status();
        assert!(status.device_ready && status.device_connected);
        assert_eq!(status.device_identifier.as_deref(), Some("ABC123"));
        assert_eq!(status.device_display_name, "Pixel 7");
        assert_eq!(status.host_interface.as_deref(), Some("rndis0"));
        assert_eq!(status.host_ipv4.as_deref(), Some("192.168.42.1"));
        assert!(!status.tethering_active);
    }

    #[test]
    fn ticks_while_busy_are_ignored() {
        let mut m = Machine::new(None, 20);
        m.handle(AppEvent::Tick);
        assert!(m.handle(AppEvent::Tick).is_empty());
    }

    #[test]
    fn cursor_is_clamped_to_menu() {
        let mut m = Machine::new(None, 20);
        m.handle(AppEvent::Command(UiCommand::MoveUp));
        assert_eq!(m.cursor, 0);
        for _ in 0..10 {
            m.handle(AppEvent::Command(UiCommand::MoveDown));
        }
        assert_eq!(m.cursor, MENU_ITEMS.len() - 1);
    }

    #[test]
    fn ambiguous_devices_block_actions() {
        let mut m = refreshed(ResolutionReport {
            outcome: ResolutionOutcome::AmbiguousMultiple(vec!["ABC123".into(), "XYZ789".into()]),
            details: None,
        });

        assert!(m.handle(AppEvent::Command(UiCommand::Select)).is_empty());
        assert_eq!(m.phase, Phase::Idle);
        assert_eq!(
            last_log(&m),
            (Severity::Warn, "Cannot enable: No device connected or authorized.".into())
        );

        m.handle(AppEvent::Command(UiCommand::MoveDown));
        assert!(m.handle(AppEvent::Command(UiCommand::Select)).is_empty());
        assert_eq!(
            last_log(&m),
            (Severity::Warn, "Cannot disable: No device connected or authorized.".into())
        );
    }

    #[test]
    fn unauthorized_device_is_connected_but_not_ready() {
        let mut m = refreshed(ResolutionReport {
            outcome: ResolutionOutcome::AuthorizationFailed("ABC123".into()),
            details: None,
        });
        assert!(m.status().device_connected);
        assert!(!m.status().device_ready);
        assert!(m.handle(AppEvent::Command(UiCommand::Select)).is_empty());
    }

    #[test]
    fn second_action_is_rejected_while_a_sequence_runs() {
        let mut m = refreshed(ready_report("ABC123"));

        let effects = m.handle(AppEvent::Command(UiCommand::Select));
        assert_eq!(
            effects,
            vec![Effect::RunSequence {
                action: TetherAction::Enable,
                serial: "ABC123".into()
            }]
        );

        m.handle(AppEvent::Command(UiCommand::MoveDown));
        assert!(m.handle(AppEvent::Command(UiCommand::Select)).is_empty());
        assert_eq!(m.phase, Phase::RunningSequence(TetherAction::Enable));
        assert_eq!(
            last_log(&m),
            (
                Severity::Warn,
                "Cannot disable: tethering enable is already in progress.".into()
            )
        );
        assert!(m.handle(AppEvent::Command(UiCommand::Refresh)).is_empty());
    }

    #[test]
    fn finished_action_triggers_a_fresh_check() {
        let mut m = refreshed(ready_report("ABC123"));
        m.handle(AppEvent::Command(UiCommand::Select));

        let effects = m.handle(AppEvent::ActionFinished(ActionResult {
            action: TetherAction::Enable,
            succeeded: false,
            failed_step: Some("Set tether_dun_required to 0".into()),
            output: Some("e".repeat(120)),
            soft_failures: vec![],
            steps_run: 3,
        }));

        assert_eq!(effects.len(), 2);
        assert!(matches!(m.phase, Phase::Resolving { announce: true, .. }));
        let failure = m
            .log()
            .iter()
            .find(|e| e.severity == Severity::Error)
            .expect("failure is logged");
        assert!(failure.text.contains("Set tether_dun_required to 0"));
        assert!(failure.text.ends_with("...)"));
    }

    #[test]
    fn explicit_refresh_flushes_the_log() {
        let mut m = refreshed(ready_report("ABC123"));
        assert!(m.log().iter().count() > 1);

        let effects = m.handle(AppEvent::Command(UiCommand::Refresh));

        assert_eq!(effects.len(), 2);
        assert_eq!(m.log().iter().count(), 1);
    }

    #[test]
    fn unchanged_periodic_results_are_not_relogged() {
        let mut m = refreshed(ready_report("ABC123"));
        let before = m.log().iter().count();

        m.handle(AppEvent::Tick);
        m.handle(AppEvent::DeviceResolved(ready_report("ABC123")));
        m.handle(AppEvent::InterfaceDetected(DetectionOutcome::NotDetected));

        assert_eq!(m.log().iter().count(), before);
    }

    #[test]
    fn resolved_serial_is_forgotten_when_device_disappears() {
        let mut m = refreshed(ready_report("ABC123"));
        m.handle(AppEvent::Tick);
        m.handle(AppEvent::DeviceResolved(ResolutionReport {
            outcome: ResolutionOutcome::NoDeviceFound,
            details: None,
        }));
        m.handle(AppEvent::InterfaceDetected(DetectionOutcome::NotDetected));

        assert_eq!(
            m.handle(AppEvent::Tick)[0],
            Effect::ResolveDevice {
                configured: None,
                previous: None
            }
        );
    }

    #[test]
    fn missing_tool_marks_status_unavailable() {
        let m = refreshed(ResolutionReport {
            outcome: ResolutionOutcome::NoToolFound,
            details: None,
        });
        assert!(!m.status().tool_available);
        assert_eq!(m.phase, Phase::Idle);
    }

    #[test]
    fn quit_is_accepted_in_any_phase() {
        let mut m = refreshed(ready_report("ABC123"));
        m.handle(AppEvent::Command(UiCommand::Select));
        assert_eq!(m.handle(AppEvent::Command(UiCommand::Quit)), vec![Effect::Quit]);
    }
}
