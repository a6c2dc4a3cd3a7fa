use crate::types::{
    CalibrationFlags, CalibrationOp, CalibrationTarget, ChunkRecord, LinkInfo, MacAddr,
    TriggerAxis, UsbId, VersionInfo,
};
use crate::{DsError, Result};

// -- USB identifiers --
pub const SONY_VID: u16 = 0x054C;
pub const DS4_IDS: &[UsbId] = &[UsbId::new(SONY_VID, 0x05C4), UsbId::new(SONY_VID, 0x09CC)];
pub const DS5_IDS: &[UsbId] = &[UsbId::new(SONY_VID, 0x0CE6)];
pub const HID_INTERFACE: u8 = 0;

// -- HID class requests --
pub const REQUEST_TYPE_DEV_TO_HOST: u8 = 0xA1;
pub const REQUEST_TYPE_HOST_TO_DEV: u8 = 0x21;
pub const HID_GET_REPORT: u8 = 0x01;
pub const HID_SET_REPORT: u8 = 0x09;
pub const FEATURE_REPORT_TYPE: u16 = 3;

// -- Report ids --
pub const REPORT_IMU_CALIBRATION: u8 = 0x02;
pub const REPORT_SET_IMU_CALIBRATION: u8 = 0x04;
pub const REPORT_FLASH_MIRROR_ADDR: u8 = 0x08;
pub const REPORT_CALIBRATION_FLAGS: u8 = 0x10;
pub const REPORT_FLASH_MIRROR_DATA: u8 = 0x11;
pub const REPORT_BT_LINK_INFO: u8 = 0x12;
pub const REPORT_SET_BT_LINK_INFO: u8 = 0x13;
pub const REPORT_SET_BT_MAC: u8 = 0x80;
pub const REPORT_BT_MAC: u8 = 0x81;
pub const REPORT_SET_PCBA_ID: u8 = 0x85;
pub const REPORT_PCBA_ID: u8 = 0x86;
pub const REPORT_DS4_CALIBRATION_CMD: u8 = 0x90;
pub const REPORT_DS4_CALIBRATION_STATUS: u8 = 0x91;
pub const REPORT_DS4_CALIBRATION_STATUS2: u8 = 0x92;
pub const REPORT_DS4_CALIBRATION_DEBUG: u8 = 0x93;
pub const REPORT_SYSTEM_CMD: u8 = 0xA0;
pub const REPORT_SET_BT_ENABLE: u8 = 0xA1;
pub const REPORT_VERSION_INFO: u8 = 0xA3;
pub const REPORT_DS5_NVS: u8 = 0x80;
pub const REPORT_DS5_CALIBRATION_CMD: u8 = 0x82;
pub const REPORT_DS5_CALIBRATION_STATUS: u8 = 0x83;

// -- Payload sizes --
pub const MAC_SIZE: usize = 6;
pub const LINK_KEY_SIZE: usize = 16;
pub const LINK_INFO_SIZE: usize = 15;
pub const LINK_UPDATE_SIZE: usize = MAC_SIZE + LINK_KEY_SIZE;
pub const IMU_CALIBRATION_SIZE: usize = 41;
pub const IMU_CALIBRATION_SET_SIZE: usize = 36;
pub const VERSION_INFO_SIZE: usize = 0x30;
pub const PCBA_ID_SIZE: usize = 6;
pub const SERIAL_NUMBER_SIZE: usize = 2;
pub const CALIBRATION_FLAGS_SIZE: usize = 4;
pub const CHUNK_RECORD_SIZE: usize = 13;
pub const CHUNK_PAYLOAD_MAX: usize = 8;
pub const DS4_STATUS_SIZE: usize = 3;
pub const DS5_STATUS_SIZE: usize = 4;

// -- Flash mirror --
pub const FLASH_MIRROR_SIZE: u16 = 0x800;
pub const FLASH_MIRROR_WORD: usize = 2;
pub const FLASH_MIRROR_READ: u8 = 0xFF;
pub const FLASH_MIRROR_SERIAL_NUMBER: u8 = 0x10;
pub const FLASH_MIRROR_STATUS_OFFSET: u16 = 12;
pub const FLASH_MIRROR_BT_ENABLE_OFFSET: u16 = 0x700;

// -- Fixed command payloads --
pub const SYSTEM_CMD_RESET: &[u8] = &[4, 1, 0];
pub const SYSTEM_CMD_MIRROR_TEMPORARY: &[u8] = &[10, 1, 0];
pub const SYSTEM_CMD_MIRROR_PERMANENT: &[u8] = &[10, 2, 0x3E, 0x71, 0x7F, 0x89];
pub const NVS_UNLOCK: &[u8] = &[3, 2, 101, 50, 64, 12];
pub const NVS_LOCK: &[u8] = &[3, 1];
pub const LINK_INFO_RESERVED: [u8; 3] = [0x08, 0x25, 0x00];

// -- Calibration --
pub const TRIGGER_DEVICE_ID: u8 = 3;
pub const STATUS_NONE: u8 = 0xFF;

/// Copy `data` into a fixed-size array, failing unless the length matches exactly.
pub fn fixed<const N: usize>(what: &'static str, data: &[u8]) -> Result<[u8; N]> {
    data.try_into().map_err(|_| DsError::InvalidLength {
        what,
        expected: N,
        actual: data.len(),
    })
}

/// Extract a NUL-padded string from a byte slice.
pub fn extract_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).to_string()
}

fn pad_string<const N: usize>(s: &str) -> [u8; N] {
    let mut buf = [0u8; N];
    let len = s.len().min(N);
    buf[..len].copy_from_slice(&s.as_bytes()[..len]);
    buf
}

pub fn decode_mac(data: &[u8]) -> Result<MacAddr> {
    Ok(MacAddr(fixed("MAC address", data)?))
}

pub fn encode_mac(mac: &MacAddr) -> [u8; MAC_SIZE] {
    mac.0
}

/// Parse report 0x12: `[device_mac(6), 08 25 00, host_mac(6)]`.
pub fn decode_link_info(data: &[u8]) -> Result<LinkInfo> {
    let buf: [u8; LINK_INFO_SIZE] = fixed("link info", data)?;
    if buf[6..9] != LINK_INFO_RESERVED {
        return Err(DsError::ReservedMismatch {
            report_id: REPORT_BT_LINK_INFO,
            expected: LINK_INFO_RESERVED.to_vec(),
            actual: buf[6..9].to_vec(),
        });
    }
    Ok(LinkInfo {
        device_mac: decode_mac(&buf[0..6])?,
        host_mac: decode_mac(&buf[9..15])?,
    })
}

pub fn encode_link_info(info: &LinkInfo) -> [u8; LINK_INFO_SIZE] {
    let mut buf = [0u8; LINK_INFO_SIZE];
    buf[0..6].copy_from_slice(&info.device_mac.0);
    buf[6..9].copy_from_slice(&LINK_INFO_RESERVED);
    buf[9..15].copy_from_slice(&info.host_mac.0);
    buf
}

/// Build report 0x13: `[host_mac(6), link_key(16)]`.
pub fn encode_link_update(host: &MacAddr, link_key: &[u8; LINK_KEY_SIZE]) -> [u8; LINK_UPDATE_SIZE] {
    let mut buf = [0u8; LINK_UPDATE_SIZE];
    buf[..MAC_SIZE].copy_from_slice(&host.0);
    buf[MAC_SIZE..].copy_from_slice(link_key);
    buf
}

pub fn decode_link_update(data: &[u8]) -> Result<(MacAddr, [u8; LINK_KEY_SIZE])> {
    let buf: [u8; LINK_UPDATE_SIZE] = fixed("link update", data)?;
    Ok((decode_mac(&buf[..MAC_SIZE])?, fixed("link key", &buf[MAC_SIZE..])?))
}

/// Parse the 0x30-byte version block (report 0xa3).
///
/// Layout (little-endian):
/// - `[0..16]`: compile date, ASCII, NUL padded
/// - `[16..32]`: compile time, ASCII, NUL padded
/// - `[32..36]`: hw major, hw minor (u16)
/// - `[36..40]`: sw major (u32)
/// - `[40..44]`: sw minor, sw series (u16)
/// - `[44..48]`: code size (u32)
pub fn decode_version_info(data: &[u8]) -> Result<VersionInfo> {
    let d: [u8; VERSION_INFO_SIZE] = fixed("version info", data)?;
    Ok(VersionInfo {
        compile_date: extract_string(&d[0..16]),
        compile_time: extract_string(&d[16..32]),
        hw_ver_major: u16::from_le_bytes([d[32], d[33]]),
        hw_ver_minor: u16::from_le_bytes([d[34], d[35]]),
        sw_ver_major: u32::from_le_bytes([d[36], d[37], d[38], d[39]]),
        sw_ver_minor: u16::from_le_bytes([d[40], d[41]]),
        sw_series: u16::from_le_bytes([d[42], d[43]]),
        code_size: u32::from_le_bytes([d[44], d[45], d[46], d[47]]),
    })
}

pub fn encode_version_info(info: &VersionInfo) -> [u8; VERSION_INFO_SIZE] {
    let mut buf = [0u8; VERSION_INFO_SIZE];
    buf[0..16].copy_from_slice(&pad_string::<16>(&info.compile_date));
    buf[16..32].copy_from_slice(&pad_string::<16>(&info.compile_time));
    buf[32..34].copy_from_slice(&info.hw_ver_major.to_le_bytes());
    buf[34..36].copy_from_slice(&info.hw_ver_minor.to_le_bytes());
    buf[36..40].copy_from_slice(&info.sw_ver_major.to_le_bytes());
    buf[40..42].copy_from_slice(&info.sw_ver_minor.to_le_bytes());
    buf[42..44].copy_from_slice(&info.sw_series.to_le_bytes());
    buf[44..48].copy_from_slice(&info.code_size.to_le_bytes());
    buf
}

/// Build the 0x08 address frame selecting a flash-mirror word.
/// Format: `[0xFF, offset_hi, offset_lo]`.
pub fn encode_flash_mirror_address(offset: u16) -> Result<[u8; 3]> {
    if offset >= FLASH_MIRROR_SIZE {
        return Err(DsError::OffsetOutOfRange(offset));
    }
    let [hi, lo] = offset.to_be_bytes();
    Ok([FLASH_MIRROR_READ, hi, lo])
}

/// Build the 0x08 frame that rewrites the serial number word.
pub fn encode_serial_number(serial: &[u8; SERIAL_NUMBER_SIZE]) -> [u8; 3] {
    [FLASH_MIRROR_SERIAL_NUMBER, serial[0], serial[1]]
}

/// Parse a debug-chunk record (report 0x93).
///
/// Layout: `[device_id, target_id, num_chunks, cur_chunk, data_len, data(8)]`.
/// Only the record size is checked here; see [`ChunkRecord::data`].
pub fn decode_chunk_record(data: &[u8]) -> Result<ChunkRecord> {
    let d: [u8; CHUNK_RECORD_SIZE] = fixed("debug chunk", data)?;
    let mut payload = [0u8; CHUNK_PAYLOAD_MAX];
    payload.copy_from_slice(&d[5..]);
    Ok(ChunkRecord {
        device_id: d[0],
        target_id: d[1],
        num_chunks: d[2],
        cur_chunk: d[3],
        data_len: d[4],
        payload,
    })
}

pub fn encode_chunk_record(record: &ChunkRecord) -> [u8; CHUNK_RECORD_SIZE] {
    let mut buf = [0u8; CHUNK_RECORD_SIZE];
    buf[0] = record.device_id;
    buf[1] = record.target_id;
    buf[2] = record.num_chunks;
    buf[3] = record.cur_chunk;
    buf[4] = record.data_len;
    buf[5..].copy_from_slice(&record.payload);
    buf
}

/// Stick calibration command: `[op, device_id, target_id]`.
pub fn encode_stick_command(op: CalibrationOp, target: CalibrationTarget) -> [u8; 3] {
    [op as u8, target.device_id, target.target_id]
}

/// Trigger calibration command: `[op, 3, edge, axis]`. Start and commit use edge 0.
pub fn encode_trigger_command(op: CalibrationOp, edge: u8, axis: TriggerAxis) -> [u8; 4] {
    [op as u8, TRIGGER_DEVICE_ID, edge, axis as u8]
}

/// Expected DualShock 4 status frame (reports 0x91 / 0x92).
pub fn ds4_status_frame(target: CalibrationTarget, status: u8) -> [u8; DS4_STATUS_SIZE] {
    [target.device_id, target.target_id, status]
}

/// Expected DualSense status frame (report 0x83).
pub fn ds5_status_frame(target: CalibrationTarget, status: u8) -> [u8; DS5_STATUS_SIZE] {
    [target.device_id, target.target_id, status, STATUS_NONE]
}

/// Compare a status report against its expected sentinel bytes.
pub fn check_status(report_id: u8, actual: &[u8], expected: &[u8]) -> Result<()> {
    if actual != expected {
        return Err(DsError::UnexpectedStatus {
            report_id,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        });
    }
    Ok(())
}

/// Parse the calibration flags bitmap (report 0x10, big-endian u32).
pub fn decode_calibration_flags(data: &[u8]) -> Result<CalibrationFlags> {
    let d: [u8; CALIBRATION_FLAGS_SIZE] = fixed("calibration flags", data)?;
    Ok(CalibrationFlags::from_bits_retain(u32::from_be_bytes(d)))
}

pub fn encode_calibration_flags(flags: CalibrationFlags) -> [u8; CALIBRATION_FLAGS_SIZE] {
    flags.bits().to_be_bytes()
}
