//! Runtime knobs read from the environment.
//!
//! - `DSTOOL_BACKEND`: `rusb` (default) or `hidapi`
//! - `DSTOOL_USB_TIMEOUT_MS`: per-transfer timeout, default 1000
//! - `DSTOOL_DISCOVERY_ATTEMPTS`: give up after this many polls, 0 = never (default)

use std::time::Duration;

/// How control transfers reach the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Raw class requests through libusb, detaching the kernel driver.
    Rusb,
    /// Feature reports through the OS HID driver.
    Hidapi,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub backend: Backend,
    pub usb_timeout: Duration,
    /// `None` polls forever.
    pub discovery_attempts: Option<u32>,
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Rusb,
            usb_timeout: Duration::from_millis(1000),
            discovery_attempts: None,
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();

        let backend = match read_string(&lookup, "DSTOOL_BACKEND", "rusb").as_str() {
            "rusb" => Backend::Rusb,
            "hidapi" => Backend::Hidapi,
            other => {
                log::warn!(
                    "Unknown DSTOOL_BACKEND='{}', using rusb (supported: rusb|hidapi)",
                    other
                );
                Backend::Rusb
            }
        };

        let timeout_ms = read_u64(
            &lookup,
            "DSTOOL_USB_TIMEOUT_MS",
            defaults.usb_timeout.as_millis() as u64,
        );

        let discovery_attempts = match read_u64(&lookup, "DSTOOL_DISCOVERY_ATTEMPTS", 0) {
            0 => None,
            n => Some(n.min(u32::MAX as u64) as u32),
        };

        Self {
            backend,
            usb_timeout: Duration::from_millis(timeout_ms),
            discovery_attempts,
            poll_interval: defaults.poll_interval,
        }
    }
}

fn read_u64(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: u64) -> u64 {
    match lookup(name) {
        Some(v) => v.trim().parse::<u64>().unwrap_or_else(|_| {
            log::warn!("Ignoring invalid {}='{}'", name, v);
            default
        }),
        None => default,
    }
}

fn read_string(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    lookup(name)
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
