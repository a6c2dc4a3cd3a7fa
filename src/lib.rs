//! # dstool - factory HID tools for DualShock 4 and DualSense controllers
//!
//! Talks the vendor feature-report protocol over USB control transfers. Provides:
//! - Firmware info, Bluetooth pairing data, IMU calibration and PCBA id access
//! - Flash-mirror reads and raw dumps
//! - Stick and trigger calibration procedures
//!
//! ## Quick Start
//! ```no_run
//! use dstool::{discovery, Config, Device, DeviceFamily};
//!
//! let config = Config::from_env();
//! let channel = discovery::connect(DeviceFamily::Ds4, &config).unwrap();
//! let device = Device::new(channel, DeviceFamily::Ds4);
//! println!("{}", device.version_info().unwrap());
//! ```

pub mod error;
pub mod types;
pub mod protocol;
pub mod hid;
pub mod config;
pub mod discovery;
pub mod device;
pub mod operator;
pub mod calibration;
pub mod command;

pub use config::Config;
pub use device::Device;
pub use error::DsError;
pub use types::*;

/// Result type alias for dstool operations.
pub type Result<T> = std::result::Result<T, DsError>;
