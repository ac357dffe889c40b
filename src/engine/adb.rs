//! The subset of `adb` invocations the engine issues.

/// One `adb` command, independent of the target device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdbInvocation {
    ListDevices,
    /// Cheap round-trip used to check the device answers and is authorized.
    Probe,
    Root,
    GetProperty(&'static str),
    GetSetting {
        scope: &'static str,
        key: &'static str,
    },
    PutSetting {
        scope: &'static str,
        key: &'static str,
        value: &'static str,
    },
    SetUsbFunction(&'static str),
    GetUsbFunction,
}

impl AdbInvocation {
    /// Argument vector, targeted at `serial` when one is given.
    pub fn args(&self, serial: Option<&str>) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        if let (Some(serial), false) = (serial, matches!(self, AdbInvocation::ListDevices)) {
            args.push("-s".into());
            args.push(serial.into());
        }
        let tail: Vec<&str> = match *self {
            AdbInvocation::ListDevices => vec!["devices"],
            AdbInvocation::Probe => vec!["shell", "echo", "test"],
            AdbInvocation::Root => vec!["root"],
            AdbInvocation::GetProperty(name) => vec!["shell", "getprop", name],
            AdbInvocation::GetSetting { scope, key } => vec!["shell", "settings", "get", scope, key],
            AdbInvocation::PutSetting { scope, key, value } => {
                vec!["shell", "settings", "put", scope, key, value]
            }
            AdbInvocation::SetUsbFunction(mode) => vec!["shell", "svc", "usb", "setFunctions", mode],
            AdbInvocation::GetUsbFunction => vec!["shell", "svc", "usb", "getFunctions"],
        };
        args.extend(tail.into_iter().map(String::from));
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_never_targets_a_serial() {
        assert_eq!(AdbInvocation::ListDevices.args(Some("ABC123")), vec!["devices"]);
    }

    #[test]
    fn put_setting_targets_the_device() {
        let inv = AdbInvocation::PutSetting {
            scope: "global",
            key: "tether_dun_required",
            value: "0",
        };
        assert_eq!(
            inv.args(Some("ABC123")).join(" "),
            "-s ABC123 shell settings put global tether_dun_required 0"
        );
    }
}
