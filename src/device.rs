use crate::hid::{ControlChannel, HidTransport};
use crate::protocol::{self, *};
use crate::types::{
    CalibrationFlags, DeviceFamily, FlashMirrorMode, LinkInfo, MacAddr, ResetOutcome, VersionInfo,
};
use crate::Result;
use std::io::Write;

/// An opened controller and the typed operations it supports.
///
/// The session owns its channel exclusively; nothing else talks to the
/// device while it is alive.
pub struct Device<C> {
    hid: HidTransport<C>,
    family: DeviceFamily,
}

impl<C: ControlChannel> Device<C> {
    pub fn new(channel: C, family: DeviceFamily) -> Self {
        Self {
            hid: HidTransport::new(channel),
            family,
        }
    }

    pub fn family(&self) -> DeviceFamily {
        self.family
    }

    /// Access the framed transport for raw report exchanges.
    pub fn hid(&self) -> &HidTransport<C> {
        &self.hid
    }

    /// Rebind the session after the controller re-enumerated.
    pub fn reconnect(&mut self, channel: C) {
        drop(self.hid.replace_channel(channel));
    }

    /// Read the firmware version block.
    pub fn version_info(&self) -> Result<VersionInfo> {
        let data = self.hid.get_report(REPORT_VERSION_INFO, VERSION_INFO_SIZE)?;
        protocol::decode_version_info(&data)
    }

    /// Read the controller's own Bluetooth address.
    pub fn bt_mac_addr(&self) -> Result<MacAddr> {
        let data = self.hid.get_report(REPORT_BT_MAC, MAC_SIZE)?;
        protocol::decode_mac(&data)
    }

    pub fn set_bt_mac_addr(&self, mac: &MacAddr) -> Result<()> {
        self.hid
            .set_report(REPORT_SET_BT_MAC, &protocol::encode_mac(mac))
    }

    /// Read the paired host and the controller address.
    pub fn bt_link_info(&self) -> Result<LinkInfo> {
        let data = self.hid.get_report(REPORT_BT_LINK_INFO, LINK_INFO_SIZE)?;
        protocol::decode_link_info(&data)
    }

    /// Pair the controller with `host` using `link_key`.
    pub fn set_bt_link_info(&self, host: &MacAddr, link_key: &[u8; LINK_KEY_SIZE]) -> Result<()> {
        self.hid.set_report(
            REPORT_SET_BT_LINK_INFO,
            &protocol::encode_link_update(host, link_key),
        )
    }

    /// Raw IMU calibration blob.
    pub fn imu_calibration(&self) -> Result<[u8; IMU_CALIBRATION_SIZE]> {
        let data = self
            .hid
            .get_report(REPORT_IMU_CALIBRATION, IMU_CALIBRATION_SIZE)?;
        protocol::fixed("IMU calibration", &data)
    }

    pub fn set_imu_calibration(&self, data: &[u8; IMU_CALIBRATION_SET_SIZE]) -> Result<()> {
        self.hid.set_report(REPORT_SET_IMU_CALIBRATION, data)
    }

    /// Read the 2-byte word at `offset` of the flash mirror.
    ///
    /// Offsets past the mirror are rejected before touching the device.
    pub fn flash_mirror_read(&self, offset: u16) -> Result<[u8; FLASH_MIRROR_WORD]> {
        let address = protocol::encode_flash_mirror_address(offset)?;
        self.hid.set_report(REPORT_FLASH_MIRROR_ADDR, &address)?;
        let data = self
            .hid
            .get_report(REPORT_FLASH_MIRROR_DATA, FLASH_MIRROR_WORD)?;
        protocol::fixed("flash mirror word", &data)
    }

    /// Copy the whole flash mirror into `sink`, word by word.
    ///
    /// The image is written as read; no checksum is verified.
    pub fn dump_flash_mirror<W: Write>(&self, sink: &mut W) -> Result<usize> {
        let mut written = 0;
        for offset in (0..FLASH_MIRROR_SIZE).step_by(FLASH_MIRROR_WORD) {
            let word = self.flash_mirror_read(offset)?;
            log::trace!("{:03x} : {:02x?}", offset, word);
            sink.write_all(&word)?;
            written += word.len();
        }
        sink.flush()?;
        Ok(written)
    }

    /// Whether flash-mirror changes are temporary (non-zero) or permanent (0).
    pub fn flash_mirror_status(&self) -> Result<u8> {
        Ok(self.flash_mirror_read(FLASH_MIRROR_STATUS_OFFSET)?[0])
    }

    pub fn set_flash_mirror_mode(&self, mode: FlashMirrorMode) -> Result<()> {
        let cmd = match mode {
            FlashMirrorMode::Temporary => SYSTEM_CMD_MIRROR_TEMPORARY,
            FlashMirrorMode::Permanent => SYSTEM_CMD_MIRROR_PERMANENT,
        };
        self.hid.set_report(REPORT_SYSTEM_CMD, cmd)
    }

    pub fn pcba_id(&self) -> Result<[u8; PCBA_ID_SIZE]> {
        let data = self.hid.get_report(REPORT_PCBA_ID, PCBA_ID_SIZE)?;
        protocol::fixed("PCBA id", &data)
    }

    pub fn set_pcba_id(&self, id: &[u8; PCBA_ID_SIZE]) -> Result<()> {
        self.hid.set_report(REPORT_SET_PCBA_ID, id)
    }

    /// Bluetooth enable byte, read from the flash mirror.
    pub fn bt_enable(&self) -> Result<u8> {
        Ok(self.flash_mirror_read(FLASH_MIRROR_BT_ENABLE_OFFSET)?[0])
    }

    pub fn set_bt_enable(&self, enable: bool) -> Result<()> {
        self.hid
            .set_report(REPORT_SET_BT_ENABLE, &[u8::from(enable)])
    }

    pub fn set_serial_number(&self, serial: &[u8; SERIAL_NUMBER_SIZE]) -> Result<()> {
        self.hid.set_report(
            REPORT_FLASH_MIRROR_ADDR,
            &protocol::encode_serial_number(serial),
        )
    }

    pub fn calibration_flags(&self) -> Result<CalibrationFlags> {
        let data = self
            .hid
            .get_report(REPORT_CALIBRATION_FLAGS, CALIBRATION_FLAGS_SIZE)?;
        protocol::decode_calibration_flags(&data)
    }

    /// Ask the controller to reset itself.
    ///
    /// A successful reset tears the device off the bus while the request is
    /// still in flight, so a transfer failure here means it worked.
    pub fn reset(&self) -> Result<ResetOutcome> {
        match self.hid.set_report(REPORT_SYSTEM_CMD, SYSTEM_CMD_RESET) {
            Ok(()) => Ok(ResetOutcome::StillConnected),
            Err(e) if e.is_transfer_failure() => {
                log::debug!("Reset severed the transfer: {}", e);
                Ok(ResetOutcome::Disconnected)
            }
            Err(e) => Err(e),
        }
    }

    pub fn nvs_unlock(&self) -> Result<()> {
        log::info!("Unlocking NVS");
        self.hid.set_report(REPORT_DS5_NVS, NVS_UNLOCK)
    }

    pub fn nvs_lock(&self) -> Result<()> {
        log::info!("Re-locking NVS");
        self.hid.set_report(REPORT_DS5_NVS, NVS_LOCK)
    }

    /// Run `f` with NVS writes unlocked, relocking afterwards.
    ///
    /// The relock is attempted even when `f` fails. An error from `f` wins
    /// over a relock error; a relock error after success is returned.
    pub fn with_nvs_unlocked<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.nvs_unlock()?;
        let result = f(self);
        let relock = self.nvs_lock();
        match (result, relock) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), relock) => {
                if let Err(relock_err) = relock {
                    log::error!("Re-locking NVS failed: {}", relock_err);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::mock::{ScriptedChannel, Transfer};
    use crate::DsError;

    fn ds4(channel: &ScriptedChannel) -> Device<&ScriptedChannel> {
        Device::new(channel, DeviceFamily::Ds4)
    }

    #[test]
    fn test_flash_mirror_read() {
        let channel = ScriptedChannel::new();
        channel.respond(REPORT_FLASH_MIRROR_DATA, &[0x12, 0x34]);
        let word = ds4(&channel).flash_mirror_read(0x10).unwrap();
        assert_eq!(word, [0x12, 0x34]);
        assert_eq!(
            channel.transfers(),
            vec![
                Transfer::Set(0x08, vec![0x08, 0xff, 0x00, 0x10]),
                Transfer::Get(0x11),
            ]
        );
    }

    #[test]
    fn test_flash_mirror_read_rejects_offset_without_io() {
        let channel = ScriptedChannel::new();
        let err = ds4(&channel).flash_mirror_read(0x800).unwrap_err();
        assert!(matches!(err, DsError::OffsetOutOfRange(0x800)));
        assert!(channel.transfers().is_empty());
    }

    #[test]
    fn test_dump_flash_mirror() {
        let channel = ScriptedChannel::new();
        for i in 0..0x400u16 {
            channel.respond(REPORT_FLASH_MIRROR_DATA, &i.to_le_bytes());
        }
        let mut image = Vec::new();
        let written = ds4(&channel).dump_flash_mirror(&mut image).unwrap();
        assert_eq!(written, 0x800);
        assert_eq!(image.len(), 0x800);
        assert_eq!(&image[0x7fe..], &0x3ffu16.to_le_bytes());
        let addresses = channel.sets_to(REPORT_FLASH_MIRROR_ADDR);
        assert_eq!(addresses.len(), 0x400);
        assert_eq!(addresses[1], vec![0xff, 0x00, 0x02]);
        assert_eq!(addresses[0x3ff], vec![0xff, 0x07, 0xfe]);
    }

    #[test]
    fn test_link_info() {
        let channel = ScriptedChannel::new();
        channel.respond(
            REPORT_BT_LINK_INFO,
            &[1, 2, 3, 4, 5, 6, 0x08, 0x25, 0x00, 9, 8, 7, 6, 5, 4],
        );
        let info = ds4(&channel).bt_link_info().unwrap();
        assert_eq!(info.host_mac, MacAddr([9, 8, 7, 6, 5, 4]));
    }

    #[test]
    fn test_set_bt_link_info() {
        let channel = ScriptedChannel::new();
        let key = [0xab; LINK_KEY_SIZE];
        ds4(&channel)
            .set_bt_link_info(&MacAddr([1, 2, 3, 4, 5, 6]), &key)
            .unwrap();
        let sent = channel.sets_to(REPORT_SET_BT_LINK_INFO);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].len(), LINK_UPDATE_SIZE);
        assert_eq!(&sent[0][6..], &key);
    }

    #[test]
    fn test_status_bytes_from_mirror() {
        let channel = ScriptedChannel::new();
        channel.respond(REPORT_FLASH_MIRROR_DATA, &[1, 0]);
        channel.respond(REPORT_FLASH_MIRROR_DATA, &[0, 0xff]);
        let device = ds4(&channel);
        assert_eq!(device.flash_mirror_status().unwrap(), 1);
        assert_eq!(device.bt_enable().unwrap(), 0);
        let addresses = channel.sets_to(REPORT_FLASH_MIRROR_ADDR);
        assert_eq!(addresses, vec![vec![0xff, 0x00, 0x0c], vec![0xff, 0x07, 0x00]]);
    }

    #[test]
    fn test_set_flash_mirror_mode() {
        let channel = ScriptedChannel::new();
        let device = ds4(&channel);
        device.set_flash_mirror_mode(FlashMirrorMode::Temporary).unwrap();
        device.set_flash_mirror_mode(FlashMirrorMode::Permanent).unwrap();
        assert_eq!(
            channel.sets_to(REPORT_SYSTEM_CMD),
            vec![vec![10, 1, 0], vec![10, 2, 0x3e, 0x71, 0x7f, 0x89]]
        );
    }

    #[test]
    fn test_simple_writes() {
        let channel = ScriptedChannel::new();
        let device = ds4(&channel);
        device.set_bt_enable(true).unwrap();
        device.set_serial_number(&[0xbe, 0xef]).unwrap();
        device.set_pcba_id(&[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(channel.sets_to(REPORT_SET_BT_ENABLE), vec![vec![1]]);
        assert_eq!(
            channel.sets_to(REPORT_FLASH_MIRROR_ADDR),
            vec![vec![0x10, 0xbe, 0xef]]
        );
        assert_eq!(channel.sets_to(REPORT_SET_PCBA_ID), vec![vec![1, 2, 3, 4, 5, 6]]);
    }

    #[test]
    fn test_reset_disconnect_is_success() {
        let channel = ScriptedChannel::new();
        channel.fail_set(REPORT_SYSTEM_CMD);
        assert_eq!(ds4(&channel).reset().unwrap(), ResetOutcome::Disconnected);
        assert_eq!(channel.sets_to(REPORT_SYSTEM_CMD), vec![vec![4, 1, 0]]);
    }

    #[test]
    fn test_reset_without_disconnect() {
        let channel = ScriptedChannel::new();
        assert_eq!(ds4(&channel).reset().unwrap(), ResetOutcome::StillConnected);
    }

    #[test]
    fn test_nvs_relocks_after_failure() {
        let channel = ScriptedChannel::new();
        let mut device = Device::new(&channel, DeviceFamily::Ds5);
        let result: Result<()> = device.with_nvs_unlocked(|_| {
            Err(DsError::InvalidArgument("operation failed".into()))
        });
        assert!(matches!(result, Err(DsError::InvalidArgument(_))));
        assert_eq!(
            channel.sets_to(REPORT_DS5_NVS),
            vec![vec![3, 2, 101, 50, 64, 12], vec![3, 1]]
        );
    }

    #[test]
    fn test_nvs_unlock_failure_skips_operation() {
        let channel = ScriptedChannel::new();
        channel.fail_set(REPORT_DS5_NVS);
        let mut device = Device::new(&channel, DeviceFamily::Ds5);
        let mut ran = false;
        let result = device.with_nvs_unlocked(|_| {
            ran = true;
            Ok(())
        });
        assert!(result.unwrap_err().is_transfer_failure());
        assert!(!ran);
        assert_eq!(channel.transfers().len(), 1);
    }

    #[test]
    fn test_calibration_flags() {
        let channel = ScriptedChannel::new();
        channel.respond(REPORT_CALIBRATION_FLAGS, &[0x00, 0x00, 0x0c, 0x00]);
        let flags = ds4(&channel).calibration_flags().unwrap();
        assert_eq!(flags, CalibrationFlags::L2 | CalibrationFlags::R2);
    }
}
