//! Platform family the agent runs on, selected once at start.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const OPENWRT_RELEASE: &str = "/etc/openwrt_release";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
    OpenWrt,
}

impl Platform {
    /// Compile target first, then OpenWrt's release file.
    pub fn detect() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if Path::new(OPENWRT_RELEASE).exists() {
            Platform::OpenWrt
        } else {
            Platform::Linux
        }
    }

    pub fn default_state_dir(self) -> PathBuf {
        match self {
            Platform::Windows => PathBuf::from(r"C:\ProgramData\RangeConfig"),
            Platform::Linux => PathBuf::from("/var/lib/range-config"),
            Platform::OpenWrt => PathBuf::from("/etc/range-config"),
        }
    }

    /// (attempts, delay between attempts)
    pub fn default_retry(self) -> (u32, Duration) {
        match self {
            Platform::Linux => (60, Duration::from_secs(60)),
            Platform::Windows | Platform::OpenWrt => (10, Duration::from_secs(15)),
        }
    }

    /// Interface whose MAC identifies the machine when none is configured.
    /// OpenWrt routers reach the management network through `eth1`.
    pub fn default_interface(self) -> Option<&'static str> {
        match self {
            Platform::OpenWrt => Some("eth1"),
            Platform::Windows | Platform::Linux => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::OpenWrt => "openwrt",
        })
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "windows" => Ok(Platform::Windows),
            "linux" => Ok(Platform::Linux),
            "openwrt" => Ok(Platform::OpenWrt),
            other => Err(format!("unknown platform '{other}' (expected windows, linux or openwrt)")),
        }
    }
}
