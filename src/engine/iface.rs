//! Host-side detection of the USB tethering network interface.

use super::runner::CommandRunner;
use crate::model::DetectionOutcome;
use regex::Regex;
use std::net::Ipv4Addr;
use std::sync::OnceLock;

static LINK_RE: OnceLock<Regex> = OnceLock::new();
static INET_RE: OnceLock<Regex> = OnceLock::new();

fn link_re() -> &'static Regex {
    LINK_RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*\d+:\s+(usb\d+|rndis\d+|enp\S+u\d+)(?:@\S+)?:\s+<([^>]*)>")
            .expect("static link regex")
    })
}

fn inet_re() -> &'static Regex {
    INET_RE.get_or_init(|| {
        Regex::new(r"inet\s+(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})").expect("static inet regex")
    })
}

/// First tethering-style interface that is administratively up, in host order.
pub fn find_tether_interface(links: &str) -> Option<String> {
    link_re()
        .captures_iter(links)
        .find(|caps| caps[2].split(',').any(|flag| flag == "UP"))
        .map(|caps| caps[1].to_string())
}

/// First valid IPv4 address in `ip -4 addr` output.
pub fn find_ipv4(addrs: &str) -> Option<String> {
    inet_re()
        .captures_iter(addrs)
        .filter_map(|caps| caps[1].parse::<Ipv4Addr>().ok())
        .map(|ip| ip.to_string())
        .next()
}

pub(crate) async fn detect(runner: &dyn CommandRunner, ip: &str) -> DetectionOutcome {
    let link_args: Vec<String> = ["link", "show"].into_iter().map(String::from).collect();
    let links = match runner.run(ip, &link_args).await {
        Ok(out) if out.success => out.output,
        Ok(out) => return DetectionOutcome::Failed(format!("'{ip} link show' failed: {}", out.output)),
        Err(e) => return DetectionOutcome::Failed(e.to_string()),
    };

    let Some(name) = find_tether_interface(&links) else {
        return DetectionOutcome::NotDetected;
    };

    let addr_args: Vec<String> = ["-4", "addr", "show", "dev", name.as_str()]
        .into_iter()
        .map(String::from)
        .collect();
    match runner.run(ip, &addr_args).await {
        Ok(out) if out.success => match find_ipv4(&out.output) {
            Some(ipv4) => DetectionOutcome::DetectedWithAddress { name, ipv4 },
            None => DetectionOutcome::DetectedNoAddress(name),
        },
        _ => DetectionOutcome::DetectedNoAddress(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::runner::testing::ScriptedRunner;
    use pretty_assertions::assert_eq;

    const LINKS: &str = "1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN\n\
                         2: wlp2s0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500\n\
                         3: usb0: <BROADCAST,MULTICAST> mtu 1500 qdisc noop state DOWN\n\
                         4: enp0s20f0u2: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500\n\
                         5: rndis0: <BROADCAST,MULTICAST,UP> mtu 1500\n";

    #[test]
    fn first_up_tether_interface_wins() {
        assert_eq!(find_tether_interface(LINKS).as_deref(), Some("enp0s20f0u2"));
    }

    #[test]
    fn down_or_unrelated_interfaces_are_ignored() {
        let links = "1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536\n3: usb0: <BROADCAST,MULTICAST> mtu 1500\n";
        assert_eq!(find_tether_interface(links), None);
    }

    #[test]
    fn ipv4_must_be_a_real_address() {
        assert_eq!(find_ipv4("inet 999.1.1.1/24\ninet 10.0.0.2/24"), Some("10.0.0.2".into()));
        assert_eq!(find_ipv4("inet6 fe80::1/64"), None);
    }

    #[tokio::test]
    async fn detects_interface_with_address() {
        let runner = ScriptedRunner::new()
            .ok("ip link show", "3: rndis0: <BROADCAST,MULTICAST,UP>")
            .ok(
                "ip -4 addr show dev rndis0",
                "3: rndis0: <BROADCAST,MULTICAST,UP>\n    inet 192.168.42.1/24 brd 192.168.42.255 scope global rndis0",
            );

        assert_eq!(
            detect(&runner, "ip").await,
            DetectionOutcome::DetectedWithAddress {
                name: "rndis0".into(),
                ipv4: "192.168.42.1".into()
            }
        );
    }

    #[tokio::test]
    async fn interface_without_address() {
        let runner = ScriptedRunner::new().ok("ip link show", "7: usb0: <BROADCAST,MULTICAST,UP,LOWER_UP>");
        assert_eq!(
            detect(&runner, "ip").await,
            DetectionOutcome::DetectedNoAddress("usb0".into())
        );
    }

    #[tokio::test]
    async fn missing_ip_tool_is_a_failure() {
        let runner = ScriptedRunner::new().missing("ip link show");
        assert!(matches!(detect(&runner, "ip").await, DetectionOutcome::Failed(_)));
        assert_eq!(runner.calls(), vec!["ip link show"]);
    }
}
