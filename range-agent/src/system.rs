//! Hostname and post-configuration actions (reboot / network restart).

use crate::delivery::Sleeper;
use crate::execution::{display_command, CommandRunner};
use crate::platform::Platform;
use anyhow::{bail, Context, Result};
use std::time::Duration;
use tracing::{info, warn};

pub const REBOOT_DELAY: Duration = Duration::from_secs(5);

const LINUX_REBOOT_METHODS: [(&str, &[&str]); 5] = [
    ("systemctl", &["reboot"]),
    ("shutdown", &["-r", "now"]),
    ("reboot", &[]),
    ("/sbin/reboot", &[]),
    ("init", &["6"]),
];

pub fn set_hostname(platform: Platform, runner: &dyn CommandRunner, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("server returned an empty hostname");
    }
    match platform {
        Platform::Linux => {
            runner
                .run_checked("hostnamectl", &["set-hostname", name])
                .context("hostnamectl set-hostname failed")?;
            info!("hostname set to {name}");
        }
        Platform::Windows => {
            hostname::set(name).with_context(|| format!("failed to set computer name to {name}"))?;
            info!("computer name set to {name}, effective after reboot");
        }
        Platform::OpenWrt => info!("leaving OpenWrt hostname unchanged (instance {name})"),
    }
    Ok(())
}

/// Makes the new configuration effective: reboot on Linux and Windows,
/// network restart on OpenWrt.
pub fn finalize(platform: Platform, runner: &dyn CommandRunner, sleeper: &dyn Sleeper) -> Result<()> {
    match platform {
        Platform::Linux => {
            info!("rebooting in {}s", REBOOT_DELAY.as_secs());
            sleeper.sleep(REBOOT_DELAY);
            for (program, args) in LINUX_REBOOT_METHODS {
                match runner.spawn_detached(program, args) {
                    Ok(()) => {
                        info!("reboot requested via {}", display_command(program, args));
                        return Ok(());
                    }
                    Err(e) => warn!("{e}"),
                }
            }
            bail!("no reboot method could be started");
        }
        Platform::Windows => {
            let delay = REBOOT_DELAY.as_secs().to_string();
            runner
                .spawn_detached(
                    "shutdown",
                    &["/r", "/t", delay.as_str(), "/c", "Range network configuration applied"],
                )
                .context("failed to schedule reboot")?;
            info!("reboot scheduled in {delay}s");
        }
        Platform::OpenWrt => {
            if let Err(e) = runner.run_checked("/etc/init.d/network", &["restart"]) {
                warn!("network restart failed: {e}");
            }
        }
    }
    Ok(())
}
