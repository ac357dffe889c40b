mod adb;
mod device;
mod iface;
mod runner;
mod sequence;

pub use runner::{CommandRunner, SystemRunner};
pub use sequence::{steps_for, TETHER_USB_FUNCTION};

use crate::model::{ActionResult, AppEvent, DetectionOutcome, ResolutionReport, RunConfig, TetherAction};
use std::sync::Arc;
use std::time::Duration;

/// Read-only checks and tethering sequences, bound to the configured tools.
///
/// Cheap to clone; every spawned task owns its own handle.
#[derive(Clone)]
pub struct TetherEngine {
    runner: Arc<dyn CommandRunner>,
    adb: String,
    ip: String,
    settle_delay: Duration,
}

impl TetherEngine {
    pub fn new(cfg: &RunConfig) -> Self {
        Self::with_runner(cfg, Arc::new(SystemRunner))
    }

    pub fn with_runner(cfg: &RunConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            adb: cfg.adb_path.clone(),
            ip: cfg.ip_path.clone(),
            settle_delay: cfg.settle_delay,
        }
    }

    pub async fn resolve(&self, configured: Option<&str>, previous: Option<&str>) -> ResolutionReport {
        device::resolve(self.runner.as_ref(), &self.adb, configured, previous).await
    }

    pub async fn detect_interface(&self) -> DetectionOutcome {
        iface::detect(self.runner.as_ref(), &self.ip).await
    }

    pub async fn run_action<F>(&self, action: TetherAction, serial: &str, emit: F) -> ActionResult
    where
        F: Fn(AppEvent),
    {
        tracing::info!(%action, serial, "starting sequence");
        let steps = steps_for(action);
        sequence::run_sequence(
            self.runner.as_ref(),
            &self.adb,
            serial,
            action,
            &steps,
            self.settle_delay,
            emit,
        )
        .await
    }
}

#[cfg(test)]
pub(crate) use runner::testing;
