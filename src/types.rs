use crate::protocol::CHUNK_PAYLOAD_MAX;
use crate::{DsError, Result};
use std::fmt;

/// USB vendor/product id pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbId {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl UsbId {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

/// Controller family handled by a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFamily {
    /// DualShock 4 (CUH-ZCT1 / CUH-ZCT2).
    Ds4,
    /// DualSense.
    Ds5,
}

impl DeviceFamily {
    pub fn name(self) -> &'static str {
        match self {
            DeviceFamily::Ds4 => "DualShock 4",
            DeviceFamily::Ds5 => "DualSense",
        }
    }

    /// Vendor/product ids accepted for this family, in probe order.
    pub fn usb_ids(self) -> &'static [UsbId] {
        match self {
            DeviceFamily::Ds4 => crate::protocol::DS4_IDS,
            DeviceFamily::Ds5 => crate::protocol::DS5_IDS,
        }
    }
}

/// Bluetooth device address, in the byte order the controller reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddr(pub [u8; 6]);

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Firmware build and hardware revision block (report 0xa3).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionInfo {
    pub compile_date: String,
    pub compile_time: String,
    pub hw_ver_major: u16,
    pub hw_ver_minor: u16,
    pub sw_ver_major: u32,
    pub sw_ver_minor: u16,
    pub sw_series: u16,
    pub code_size: u32,
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compiled at: {} {}", self.compile_date, self.compile_time)?;
        writeln!(f, "hw_ver:{:04x}.{:04x}", self.hw_ver_major, self.hw_ver_minor)?;
        writeln!(
            f,
            "sw_ver:{:08x}.{:04x} sw_series:{:04x}",
            self.sw_ver_major, self.sw_ver_minor, self.sw_series
        )?;
        write!(f, "code size:{:08x}", self.code_size)
    }
}

/// Bluetooth pairing state (report 0x12).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkInfo {
    pub device_mac: MacAddr,
    pub host_mac: MacAddr,
}

/// Selects a calibration subsystem and the procedure/axis inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationTarget {
    pub device_id: u8,
    pub target_id: u8,
}

impl CalibrationTarget {
    pub const STICK_CENTER: CalibrationTarget = CalibrationTarget::new(1, 1);
    pub const STICK_RANGE: CalibrationTarget = CalibrationTarget::new(1, 2);

    pub const fn new(device_id: u8, target_id: u8) -> Self {
        Self {
            device_id,
            target_id,
        }
    }
}

/// Calibration command opcodes (first byte of 0x90 / 0x82 frames).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CalibrationOp {
    Start = 1,
    Store = 2,
    Sample = 3,
}

/// Trigger position sampled during trigger calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TriggerEdge {
    Release = 1,
    Mid = 2,
    Full = 3,
}

impl TriggerEdge {
    pub fn label(self) -> &'static str {
        match self {
            TriggerEdge::Release => "release",
            TriggerEdge::Mid => "mid",
            TriggerEdge::Full => "full",
        }
    }
}

/// Trigger axis selector. `Both` is only used by start/commit frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TriggerAxis {
    L2 = 1,
    R2 = 2,
    Both = 3,
}

impl fmt::Display for TriggerAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerAxis::L2 => f.write_str("L2"),
            TriggerAxis::R2 => f.write_str("R2"),
            TriggerAxis::Both => f.write_str("L2+R2"),
        }
    }
}

/// One record of the calibration debug log (report 0x93), as received.
///
/// `data_len` is untrusted until [`ChunkRecord::data`] checks it; sentinel
/// records carry filler there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub device_id: u8,
    pub target_id: u8,
    pub num_chunks: u8,
    pub cur_chunk: u8,
    pub data_len: u8,
    pub payload: [u8; CHUNK_PAYLOAD_MAX],
}

impl ChunkRecord {
    /// Build a record holding `data`; fails if it does not fit.
    pub fn new(
        device_id: u8,
        target_id: u8,
        num_chunks: u8,
        cur_chunk: u8,
        data: &[u8],
    ) -> Result<Self> {
        let data_len = checked_payload_len(data.len())?;
        let mut payload = [0u8; CHUNK_PAYLOAD_MAX];
        payload[..data.len()].copy_from_slice(data);
        Ok(Self {
            device_id,
            target_id,
            num_chunks,
            cur_chunk,
            data_len,
            payload,
        })
    }

    /// The controller has no debug data to report.
    pub fn is_empty_sentinel(&self) -> bool {
        self.device_id == 0xff && self.target_id == 0xff
    }

    /// Either id is 0xff: no further chunks follow.
    pub fn is_end_marker(&self) -> bool {
        self.device_id == 0xff || self.target_id == 0xff
    }

    /// The valid part of the payload.
    pub fn data(&self) -> Result<&[u8]> {
        let len = checked_payload_len(self.data_len as usize)?;
        Ok(&self.payload[..len as usize])
    }
}

fn checked_payload_len(len: usize) -> Result<u8> {
    if len > CHUNK_PAYLOAD_MAX {
        return Err(DsError::InvalidLength {
            what: "debug chunk payload",
            expected: CHUNK_PAYLOAD_MAX,
            actual: len,
        });
    }
    Ok(len as u8)
}

/// Persistence mode of the flash mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashMirrorMode {
    /// Changes live in RAM only and are lost on power cycle.
    Temporary,
    /// Changes are written back to flash.
    Permanent,
}

/// Result of a reset request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// The controller dropped off the bus mid-transfer, as a reset should.
    Disconnected,
    /// The transfer completed and the controller is still attached.
    StillConnected,
}

bitflags::bitflags! {
    /// Calibration status bitmap reported by the DualShock 4 (report 0x10).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CalibrationFlags: u32 {
        const STICK_MIN_MAX = 1 << 8;
        const STICK_CENTER  = 1 << 9;
        const L2            = 1 << 10;
        const R2            = 1 << 11;
        const GYROSCOPE     = 1 << 24;
        const ACCELEROMETER = 1 << 25;
    }
}
