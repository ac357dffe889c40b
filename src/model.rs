use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Runtime settings derived from the command line.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub adb_path: String,
    pub ip_path: String,
    /// Device identifier that overrides auto-selection.
    pub serial: Option<String>,
    pub refresh_interval: Duration,
    pub settle_delay: Duration,
    pub log_capacity: usize,
    /// Problems found before the runtime started, shown once in the log.
    pub startup_warnings: Vec<String>,
}

/// Connection state shown in the status pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionState {
    #[default]
    Unknown,
    ToolMissing,
    ListingFailed,
    Disconnected,
    MultipleDevices,
    NotFound,
    Unauthorized,
    Connected,
}

impl ConnectionState {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Unknown => "Unknown",
            ConnectionState::ToolMissing => "ERROR: adb not found",
            ConnectionState::ListingFailed => "Connection Error",
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::MultipleDevices => "Multiple Devices",
            ConnectionState::NotFound => "Specified Device Not Found",
            ConnectionState::Unauthorized => "Auth Failed",
            ConnectionState::Connected => "Connected",
        }
    }
}

/// Host interface state shown in the status pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum InterfaceState {
    #[default]
    NotChecked,
    NotDetected,
    NoAddress,
    Ready,
    Failed,
}

/// The single authoritative view of the device and host link.
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub tool_available: bool,
    pub connection: ConnectionState,
    /// The device shows up in the listing (ready or unauthorized).
    pub device_connected: bool,
    /// Resolved and authorized; mutating actions are allowed.
    pub device_ready: bool,
    pub device_identifier: Option<String>,
    pub device_display_name: String,
    pub current_mode: String,
    pub tethering_active: bool,
    pub tether_dun_required: Option<String>,
    pub tether_offload_disabled: Option<String>,
    pub interface_state: InterfaceState,
    pub host_interface: Option<String>,
    pub host_ipv4: Option<String>,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            tool_available: true,
            connection: ConnectionState::Unknown,
            device_connected: false,
            device_ready: false,
            device_identifier: None,
            device_display_name: "N/A".into(),
            current_mode: "unknown".into(),
            tethering_active: false,
            tether_dun_required: None,
            tether_offload_disabled: None,
            interface_state: InterfaceState::NotChecked,
            host_interface: None,
            host_ipv4: None,
        }
    }
}

/// Result of one device resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ResolutionOutcome {
    NoToolFound,
    /// The listing command ran but exited non-zero.
    ListingFailed(String),
    NoDeviceFound,
    AmbiguousMultiple(Vec<String>),
    DeviceNotFound(String),
    AuthorizationFailed(String),
    Ready(String),
}

impl ResolutionOutcome {
    /// Identifier worth remembering for the next attempt.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            ResolutionOutcome::Ready(id) | ResolutionOutcome::AuthorizationFailed(id) => Some(id),
            _ => None,
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        match self {
            ResolutionOutcome::NoToolFound => ConnectionState::ToolMissing,
            ResolutionOutcome::ListingFailed(_) => ConnectionState::ListingFailed,
            ResolutionOutcome::NoDeviceFound => ConnectionState::Disconnected,
            ResolutionOutcome::AmbiguousMultiple(_) => ConnectionState::MultipleDevices,
            ResolutionOutcome::DeviceNotFound(_) => ConnectionState::NotFound,
            ResolutionOutcome::AuthorizationFailed(_) => ConnectionState::Unauthorized,
            ResolutionOutcome::Ready(_) => ConnectionState::Connected,
        }
    }
}

/// Best-effort properties read from a ready device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceDetails {
    pub model: Option<String>,
    pub usb_functions: Option<String>,
    pub tether_dun_required: Option<String>,
    pub tether_offload_disabled: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionReport {
    pub outcome: ResolutionOutcome,
    pub details: Option<DeviceDetails>,
}

/// Result of looking for the tethering interface on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DetectionOutcome {
    NotDetected,
    DetectedNoAddress(String),
    DetectedWithAddress { name: String, ipv4: String },
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum TetherAction {
    Enable,
    Disable,
}

impl fmt::Display for TetherAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TetherAction::Enable => write!(f, "enable"),
            TetherAction::Disable => write!(f, "disable"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    AbortOnFailure,
    ContinueOnFailure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub index: usize,
    pub description: String,
    pub policy: FailurePolicy,
    pub succeeded: bool,
    pub output: String,
}

/// Terminal result of one enable/disable sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResult {
    pub action: TetherAction,
    pub succeeded: bool,
    pub failed_step: Option<String>,
    pub output: Option<String>,
    /// Descriptions of continue-on-failure steps that failed.
    pub soft_failures: Vec<String>,
    pub steps_run: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
    Command,
    Success,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Command => "CMD",
            Severity::Success => "OK",
        }
    }
}

/// Commands sent from the presentation layer to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiCommand {
    MoveUp,
    MoveDown,
    Select,
    /// Explicit refresh; flushes the log.
    Refresh,
    Quit,
}

/// Everything the state machine reacts to.
#[derive(Debug, Clone)]
pub enum AppEvent {
    Command(UiCommand),
    /// Initial or periodic status check.
    Tick,
    DeviceResolved(ResolutionReport),
    InterfaceDetected(DetectionOutcome),
    StepStarted {
        action: TetherAction,
        description: String,
        command_line: String,
    },
    StepFinished(StepOutcome),
    ActionFinished(ActionResult),
}
