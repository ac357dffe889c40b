//! Ordered enable/disable command sequences.
//!
//! A sequence is plain data: each step names its `adb` invocation and what a
//! failure means for the rest of the run. [`run_sequence`] executes the steps
//! one at a time and folds them into a single [`ActionResult`].

use super::adb::AdbInvocation;
use super::runner::{command_line, CommandRunner};
use crate::model::{ActionResult, AppEvent, FailurePolicy, StepOutcome, TetherAction};
use std::time::Duration;

/// USB function that exposes the phone's network to the host.
pub const TETHER_USB_FUNCTION: &str = "rndis";
/// USB functions restored when tethering is turned off.
pub const DEFAULT_USB_FUNCTIONS: &str = "mtp,adb";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceStep {
    pub description: String,
    pub invocation: AdbInvocation,
    pub policy: FailurePolicy,
    /// Pause for the settle delay before the next step is issued.
    pub settle_after: bool,
}

impl SequenceStep {
    fn new(description: impl Into<String>, invocation: AdbInvocation, policy: FailurePolicy) -> Self {
        Self {
            description: description.into(),
            invocation,
            policy,
            settle_after: false,
        }
    }

    fn settle(mut self) -> Self {
        self.settle_after = true;
        self
    }
}

/// A global setting that enable changes and disable puts back.
#[derive(Debug, Clone, Copy)]
pub struct TetherSetting {
    pub key: &'static str,
    pub tether_value: &'static str,
    pub default_value: &'static str,
}

pub const DUN_REQUIRED: TetherSetting = TetherSetting {
    key: "tether_dun_required",
    tether_value: "0",
    default_value: "1",
};

pub const OFFLOAD_DISABLED: TetherSetting = TetherSetting {
    key: "tether_offload_disabled",
    tether_value: "1",
    default_value: "0",
};

pub const TETHER_SETTINGS: [TetherSetting; 2] = [DUN_REQUIRED, OFFLOAD_DISABLED];

impl TetherSetting {
    fn apply(self) -> AdbInvocation {
        AdbInvocation::PutSetting {
            scope: "global",
            key: self.key,
            value: self.tether_value,
        }
    }

    fn restore(self) -> AdbInvocation {
        AdbInvocation::PutSetting {
            scope: "global",
            key: self.key,
            value: self.default_value,
        }
    }
}

fn verify_step() -> SequenceStep {
    SequenceStep::new(
        "Verify device authorization",
        AdbInvocation::Probe,
        FailurePolicy::AbortOnFailure,
    )
}

pub fn steps_for(action: TetherAction) -> Vec<SequenceStep> {
    use FailurePolicy::{AbortOnFailure, ContinueOnFailure};

    match action {
        TetherAction::Enable => vec![
            verify_step(),
            // Fails on stock ROMs; nothing after it depends on root.
            SequenceStep::new("Attempt ADB root", AdbInvocation::Root, ContinueOnFailure),
            SequenceStep::new(
                format!("Set {} to {}", DUN_REQUIRED.key, DUN_REQUIRED.tether_value),
                DUN_REQUIRED.apply(),
                AbortOnFailure,
            ),
            SequenceStep::new(
                "Set USB functions to RNDIS",
                AdbInvocation::SetUsbFunction(TETHER_USB_FUNCTION),
                AbortOnFailure,
            )
            .settle(),
            SequenceStep::new("Disable tether_offload", OFFLOAD_DISABLED.apply(), ContinueOnFailure),
        ],
        TetherAction::Disable => {
            let mut steps = vec![verify_step()];
            // Undo in reverse order of application.
            steps.extend(TETHER_SETTINGS.iter().rev().map(|s| {
                SequenceStep::new(
                    format!("Restore {} to {}", s.key, s.default_value),
                    s.restore(),
                    ContinueOnFailure,
                )
            }));
            steps.push(SequenceStep::new(
                "Restore default USB functions (MTP, ADB)",
                AdbInvocation::SetUsbFunction(DEFAULT_USB_FUNCTIONS),
                AbortOnFailure,
            ));
            steps
        }
    }
}

/// Per-step results collected while a sequence runs.
struct SequenceRun {
    action: TetherAction,
    outcomes: Vec<StepOutcome>,
}

impl SequenceRun {
    fn new(action: TetherAction) -> Self {
        Self {
            action,
            outcomes: Vec::new(),
        }
    }

    fn record(&mut self, outcome: StepOutcome) -> bool {
        let abort = !outcome.succeeded && outcome.policy == FailurePolicy::AbortOnFailure;
        self.outcomes.push(outcome);
        abort
    }

    fn finish(self) -> ActionResult {
        let failed = self
            .outcomes
            .iter()
            .find(|o| !o.succeeded && o.policy == FailurePolicy::AbortOnFailure);
        let soft_failures = self
            .outcomes
            .iter()
            .filter(|o| !o.succeeded && o.policy == FailurePolicy::ContinueOnFailure)
            .map(|o| o.description.clone())
            .collect();

        ActionResult {
            action: self.action,
            succeeded: failed.is_none(),
            failed_step: failed.map(|o| o.description.clone()),
            output: failed.map(|o| o.output.clone()),
            soft_failures,
            steps_run: self.outcomes.len(),
        }
    }
}

/// Execute `steps` strictly in order against `serial`, reporting progress
/// through `emit`. Stops at the first failed abort-on-failure step.
pub(crate) async fn run_sequence<F>(
    runner: &dyn CommandRunner,
    adb: &str,
    serial: &str,
    action: TetherAction,
    steps: &[SequenceStep],
    settle_delay: Duration,
    emit: F,
) -> ActionResult
where
    F: Fn(AppEvent),
{
    let mut run = SequenceRun::new(action);

    for (index, step) in steps.iter().enumerate() {
        let args = step.invocation.args(Some(serial));
        emit(AppEvent::StepStarted {
            action,
            description: step.description.clone(),
            command_line: command_line(adb, &args),
        });

        let outcome = match runner.run(adb, &args).await {
            Ok(out) => StepOutcome {
                index,
                description: step.description.clone(),
                policy: step.policy,
                succeeded: out.success,
                output: out.output,
            },
            // Without the tool no later step can succeed either.
            Err(e) => StepOutcome {
                index,
                description: step.description.clone(),
                policy: FailurePolicy::AbortOnFailure,
                succeeded: false,
                output: e.to_string(),
            },
        };
        tracing::info!(%action, step = %outcome.description, ok = outcome.succeeded, "sequence step finished");
        emit(AppEvent::StepFinished(outcome.clone()));

        if run.record(outcome) {
            break;
        }
        if step.settle_after && !settle_delay.is_zero() {
            tokio::time::sleep(settle_delay).await;
        }
    }

    run.finish()
}
