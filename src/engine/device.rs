//! Device resolution: which phone to talk to, and whether it is ready.

use super::adb::AdbInvocation;
use super::runner::{CommandRunner, InvokeError};
use super::sequence::{DUN_REQUIRED, OFFLOAD_DISABLED};
use crate::model::{DeviceDetails, ResolutionOutcome, ResolutionReport};

const LISTING_HEADER: &str = "List of devices attached";
const READY_MARKER: &str = "device";

/// Identifiers of devices in the `device` state, in listing order.
pub fn parse_device_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(LISTING_HEADER) && !line.starts_with('*'))
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let id = tokens.next()?;
            (tokens.next() == Some(READY_MARKER)).then(|| id.to_string())
        })
        .collect()
}

/// What to do after the listing has been parsed.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Selection {
    Decided(ResolutionOutcome),
    Probe(String),
}

/// Pick the target device. A configured identifier wins over the one
/// remembered from the previous attempt; nothing is guessed when several
/// devices are attached and none was asked for.
pub(crate) fn select_device(
    candidates: &[String],
    configured: Option<&str>,
    previous: Option<&str>,
) -> Selection {
    if candidates.is_empty() {
        return Selection::Decided(ResolutionOutcome::NoDeviceFound);
    }
    match (configured.or(previous), candidates) {
        (None, [only]) => Selection::Probe(only.clone()),
        (None, _) => Selection::Decided(ResolutionOutcome::AmbiguousMultiple(candidates.to_vec())),
        (Some(id), _) if candidates.iter().any(|c| c == id) => Selection::Probe(id.to_string()),
        (Some(id), _) => Selection::Decided(ResolutionOutcome::DeviceNotFound(id.to_string())),
    }
}

/// Run the listing and the liveness probe, then read device details when ready.
pub(crate) async fn resolve(
    runner: &dyn CommandRunner,
    adb: &str,
    configured: Option<&str>,
    previous: Option<&str>,
) -> ResolutionReport {
    let outcome = resolve_outcome(runner, adb, configured, previous).await;
    let details = match &outcome {
        ResolutionOutcome::Ready(id) => Some(query_details(runner, adb, id).await),
        _ => None,
    };
    ResolutionReport { outcome, details }
}

async fn resolve_outcome(
    runner: &dyn CommandRunner,
    adb: &str,
    configured: Option<&str>,
    previous: Option<&str>,
) -> ResolutionOutcome {
    let listing = match runner.run(adb, &AdbInvocation::ListDevices.args(None)).await {
        Ok(out) if out.success => out.output,
        Ok(out) => return ResolutionOutcome::ListingFailed(out.output),
        Err(e) => {
            tracing::warn!(error = %e, "device listing failed");
            return ResolutionOutcome::NoToolFound;
        }
    };

    let candidates = parse_device_list(&listing);
    tracing::debug!(?candidates, "parsed device listing");
    let id = match select_device(&candidates, configured, previous) {
        Selection::Decided(outcome) => return outcome,
        Selection::Probe(id) => id,
    };

    match runner.run(adb, &AdbInvocation::Probe.args(Some(&id))).await {
        Ok(out) if out.success && !out.output.to_lowercase().contains("unauthorized") => {
            ResolutionOutcome::Ready(id)
        }
        Ok(_) => ResolutionOutcome::AuthorizationFailed(id),
        Err(InvokeError::ToolNotFound { .. }) => ResolutionOutcome::NoToolFound,
        Err(e) => {
            tracing::warn!(error = %e, "probe could not be spawned");
            ResolutionOutcome::AuthorizationFailed(id)
        }
    }
}

async fn query_details(runner: &dyn CommandRunner, adb: &str, serial: &str) -> DeviceDetails {
    DeviceDetails {
        model: read_value(runner, adb, serial, AdbInvocation::GetProperty("ro.product.model")).await,
        usb_functions: read_value(runner, adb, serial, AdbInvocation::GetUsbFunction).await,
        tether_dun_required: read_value(
            runner,
            adb,
            serial,
            AdbInvocation::GetSetting {
                scope: "global",
                key: DUN_REQUIRED.key,
            },
        )
        .await,
        tether_offload_disabled: read_value(
            runner,
            adb,
            serial,
            AdbInvocation::GetSetting {
                scope: "global",
                key: OFFLOAD_DISABLED.key,
            },
        )
        .await,
    }
}

async fn read_value(
    runner: &dyn CommandRunner,
    adb: &str,
    serial: &str,
    inv: AdbInvocation,
) -> Option<String> {
    match runner.run(adb, &inv.args(Some(serial))).await {
        Ok(out) if out.success && !out.output.is_empty() => Some(out.output),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::runner::testing::ScriptedRunner;
    use pretty_assertions::assert_eq;

    const TWO_DEVICES: &str = "List of devices attached\nABC123\tdevice\nXYZ789\tdevice\n";

    #[test]
    fn parse_skips_header_daemon_chatter_and_offline_devices() {
        let listing = "* daemon not running; starting now at tcp:5037\n\
                       * daemon started successfully\n\
                       List of devices attached\n\
                       ABC123\tdevice\n\
                       DEF456\tunauthorized\n\
                       GHI789\toffline\n\
                       emulator-5554\tdevice product:sdk model:Pixel\n";
        assert_eq!(parse_device_list(listing), vec!["ABC123", "emulator-5554"]);
    }

    #[test]
    fn several_candidates_without_configuration_are_ambiguous() {
        let candidates = parse_device_list(TWO_DEVICES);
        assert_eq!(
            select_device(&candidates, None, None),
            Selection::Decided(ResolutionOutcome::AmbiguousMultiple(vec![
                "ABC123".into(),
                "XYZ789".into()
            ]))
        );
    }

    #[test]
    fn configured_identifier_missing_from_listing_is_not_found() {
        for listing in ["List of devices attached\nABC123\tdevice\n", TWO_DEVICES] {
            let candidates = parse_device_list(listing);
            assert_eq!(
                select_device(&candidates, Some("NOPE42"), None),
                Selection::Decided(ResolutionOutcome::DeviceNotFound("NOPE42".into()))
            );
        }
    }

    #[test]
    fn configured_identifier_overrides_previous() {
        let candidates = parse_device_list(TWO_DEVICES);
        assert_eq!(
            select_device(&candidates, Some("XYZ789"), Some("ABC123")),
            Selection::Probe("XYZ789".into())
        );
        assert_eq!(
            select_device(&candidates, None, Some("ABC123")),
            Selection::Probe("ABC123".into())
        );
    }

    #[tokio::test]
    async fn single_device_is_ready_after_probe() {
        let runner = ScriptedRunner::new()
            .ok("adb devices", "List of devices attached\nABC123\tdevice\n")
            .ok("adb -s ABC123 shell echo test", "test")
            .ok("adb -s ABC123 shell getprop ro.product.model", "SM-S918B")
            .ok("adb -s ABC123 shell svc usb getFunctions", "mtp,adb");

        let report = resolve(&runner, "adb", None, None).await;

        assert_eq!(report.outcome, ResolutionOutcome::Ready("ABC123".into()));
        let details = report.details.expect("ready devices carry details");
        assert_eq!(details.model.as_deref(), Some("SM-S918B"));
        assert_eq!(details.usb_functions.as_deref(), Some("mtp,adb"));
        assert_eq!(details.tether_dun_required, None);
    }

    #[tokio::test]
    async fn unauthorized_probe_fails_authorization() {
        let runner = ScriptedRunner::new()
            .ok("adb devices", "List of devices attached\nABC123\tdevice\n")
            .fail("adb -s ABC123 shell echo test", "error: device unauthorized.");

        let report = resolve(&runner, "adb", None, None).await;

        assert_eq!(
            report.outcome,
            ResolutionOutcome::AuthorizationFailed("ABC123".into())
        );
        assert!(report.details.is_none());
    }

    #[tokio::test]
    async fn ambiguous_listing_issues_no_probe() {
        let runner = ScriptedRunner::new().ok("adb devices", TWO_DEVICES);

        let report = resolve(&runner, "adb", None, None).await;

        assert!(matches!(report.outcome, ResolutionOutcome::AmbiguousMultiple(_)));
        assert_eq!(runner.calls(), vec!["adb devices"]);
    }

    #[tokio::test]
    async fn missing_tool_and_failed_listing_are_distinguished() {
        let runner = ScriptedRunner::new().missing("adb devices");
        assert_eq!(
            resolve(&runner, "adb", None, None).await.outcome,
            ResolutionOutcome::NoToolFound
        );

        let runner = ScriptedRunner::new().fail("adb devices", "cannot connect to daemon");
        assert_eq!(
            resolve(&runner, "adb", None, None).await.outcome,
            ResolutionOutcome::ListingFailed("cannot connect to daemon".into())
        );
    }

    #[tokio::test]
    async fn empty_listing_finds_no_device() {
        let runner = ScriptedRunner::new().ok("adb devices", "List of devices attached");
        assert_eq!(
            resolve(&runner, "adb", None, None).await.outcome,
            ResolutionOutcome::NoDeviceFound
        );
    }
}
