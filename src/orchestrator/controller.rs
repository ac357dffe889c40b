//! Controller loop.
//!
//! Owns the state machine, turns its effects into spawned tasks and emits
//! snapshots for presentation layers.

use super::machine::{Effect, Machine, Snapshot};
use crate::engine::TetherEngine;
use crate::model::{AppEvent, RunConfig, UiCommand};
use anyhow::Result;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Start the work an effect asks for. Completions come back on `event_tx`.
fn dispatch(engine: &TetherEngine, effect: Effect, event_tx: &UnboundedSender<AppEvent>) {
    let engine = engine.clone();
    let tx = event_tx.clone();
    match effect {
        Effect::ResolveDevice {
            configured,
            previous,
        } => {
            tokio::spawn(async move {
                let report = engine
                    .resolve(configured.as_deref(), previous.as_deref())
                    .await;
                let _ = tx.send(AppEvent::DeviceResolved(report));
            });
        }
        Effect::DetectInterface => {
            tokio::spawn(async move {
                let outcome = engine.detect_interface().await;
                let _ = tx.send(AppEvent::InterfaceDetected(outcome));
            });
        }
        Effect::RunSequence { action, serial } => {
            tokio::spawn(async move {
                let progress = tx.clone();
                let result = engine
                    .run_action(action, &serial, move |ev| {
                        let _ = progress.send(ev);
                    })
                    .await;
                let _ = tx.send(AppEvent::ActionFinished(result));
            });
        }
        // Handled by the loop.
        Effect::Quit => {}
    }
}

/// Periodic refresh timer; `None` when periodic refresh is disabled.
fn refresh_timer(cfg: &RunConfig) -> Option<Interval> {
    if cfg.refresh_interval.is_zero() {
        return None;
    }
    // The initial check is queued explicitly, so the first tick is one period out.
    let mut interval =
        tokio::time::interval_at(Instant::now() + cfg.refresh_interval, cfg.refresh_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(interval)
}

/// Drive the state machine from UI commands, task completions and the
/// refresh timer until the user quits or the UI goes away.
pub(crate) async fn run_controller(
    cfg: &RunConfig,
    engine: TetherEngine,
    snapshot_tx: UnboundedSender<Snapshot>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut machine = Machine::new(cfg.serial.clone(), cfg.log_capacity);
    for warning in &cfg.startup_warnings {
        machine.warn(warning);
    }
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<AppEvent>();
    let mut timer = refresh_timer(cfg);

    tracing::info!(
        adb = %cfg.adb_path,
        ip = %cfg.ip_path,
        serial = ?cfg.serial,
        interval = ?cfg.refresh_interval,
        "controller started"
    );
    let _ = event_tx.send(AppEvent::Tick);
    let _ = snapshot_tx.send(machine.snapshot());

    loop {
        let event = tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(cmd) => AppEvent::Command(cmd),
                None => {
                    tracing::debug!("command channel closed");
                    break;
                }
            },
            Some(ev) = event_rx.recv() => ev,
            _ = async {
                match timer.as_mut() {
                    Some(t) => t.tick().await,
                    None => futures::future::pending().await,
                }
            } => AppEvent::Tick,
        };

        let effects = machine.handle(event);
        if effects.contains(&Effect::Quit) {
            tracing::info!("quit requested");
            break;
        }
        for effect in effects {
            tracing::debug!(?effect, "dispatching");
            dispatch(&engine, effect, &event_tx);
        }

        if snapshot_tx.send(machine.snapshot()).is_err() {
            tracing::debug!("snapshot receiver dropped");
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::ScriptedRunner;
    use crate::orchestrator::Phase;
    use std::sync::Arc;
    use std::time::Duration;

    fn config() -> RunConfig {
        RunConfig {
            adb_path: "adb".into(),
            ip_path: "ip".into(),
            serial: None,
            refresh_interval: Duration::ZERO,
            settle_delay: Duration::ZERO,
            log_capacity: 20,
            startup_warnings: Vec::new(),
        }
    }

    async fn wait_for(
        rx: &mut UnboundedReceiver<Snapshot>,
        pred: impl Fn(&Snapshot) -> bool,
    ) -> Snapshot {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let snap = rx.recv().await.expect("controller alive");
                if pred(&snap) {
                    return snap;
                }
            }
        })
        .await
        .expect("snapshot in time")
    }

    #[tokio::test]
    async fn initial_check_then_enable_then_quit() {
        let cfg = config();
        let runner = Arc::new(
            ScriptedRunner::new()
                .ok("adb devices", "List of devices attached\nABC123\tdevice\n")
                .ok("ip link show", "3: rndis0: <BROADCAST,MULTICAST,UP>"),
        );
        let engine = TetherEngine::with_runner(&cfg, runner.clone());
        let (snap_tx, mut snap_rx) = tokio::sync::mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = tokio::sync::mpsc::unbounded_channel();

        let controller = tokio::spawn(async move { run_controller(&cfg, engine, snap_tx, cmd_rx).await });

        let ready = wait_for(&mut snap_rx, |s| s.phase == Phase::Idle && s.status.device_ready).await;
        assert_eq!(ready.status.device_identifier.as_deref(), Some("ABC123"));
        assert_eq!(ready.status.host_interface.as_deref(), Some("rndis0"));

        cmd_tx.send(UiCommand::Select).unwrap();
        let done = wait_for(&mut snap_rx, |s| {
            s.log.iter().any(|e| e.text.starts_with("SUCCESS")) && s.phase == Phase::Idle
        })
        .await;
        assert!(done.log.iter().any(|e| e.text.contains("setFunctions rndis")));
        assert!(runner
            .calls()
            .contains(&"adb -s ABC123 shell svc usb setFunctions rndis".to_string()));

        cmd_tx.send(UiCommand::Quit).unwrap();
        tokio::time::timeout(Duration::from_secs(5), controller)
            .await
            .expect("controller stops")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn closing_the_command_channel_stops_the_loop() {
        let cfg = config();
        let engine = TetherEngine::with_runner(&cfg, Arc::new(ScriptedRunner::new()));
        let (snap_tx, _snap_rx) = tokio::sync::mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = tokio::sync::mpsc::unbounded_channel::<UiCommand>();
        drop(cmd_tx);

        tokio::time::timeout(Duration::from_secs(5), run_controller(&cfg, engine, snap_tx, cmd_rx))
            .await
            .expect("controller stops")
            .unwrap();
    }

    #[tokio::test]
    async fn startup_warnings_open_the_log() {
        let cfg = RunConfig {
            startup_warnings: vec!["Lifecycle log disabled: create log directory /nope".into()],
            ..config()
        };
        let engine = TetherEngine::with_runner(&cfg, Arc::new(ScriptedRunner::new()));
        let (snap_tx, mut snap_rx) = tokio::sync::mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = tokio::sync::mpsc::unbounded_channel::<UiCommand>();

        let controller = tokio::spawn(async move { run_controller(&cfg, engine, snap_tx, cmd_rx).await });

        let first = snap_rx.recv().await.expect("initial snapshot");
        let warnings: Vec<_> = first
            .log
            .iter()
            .filter(|e| e.severity == crate::model::Severity::Warn)
            .map(|e| e.text.as_str())
            .collect();
        assert_eq!(warnings, vec!["Lifecycle log disabled: create log directory /nope"]);

        cmd_tx.send(UiCommand::Quit).unwrap();
        tokio::time::timeout(Duration::from_secs(5), controller)
            .await
            .expect("controller stops")
            .unwrap()
            .unwrap();
    }
}
