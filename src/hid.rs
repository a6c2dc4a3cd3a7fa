use crate::protocol::{
    FEATURE_REPORT_TYPE, HID_GET_REPORT, HID_SET_REPORT, REQUEST_TYPE_DEV_TO_HOST,
    REQUEST_TYPE_HOST_TO_DEV,
};
use crate::{DsError, Result};
use hidapi::HidDevice;
use rusb::{DeviceHandle, GlobalContext};
use std::time::Duration;

/// Raw GET_REPORT / SET_REPORT primitive offered by a backend.
///
/// Both directions work on id-prefixed buffers: `buf[0]` holds the report id
/// on the way out and its echo on the way in.
pub trait ControlChannel {
    /// Fill `buf` with the report and return the number of bytes transferred.
    fn get_report(&self, report_id: u8, buf: &mut [u8]) -> Result<usize>;

    /// Send `data` (report id first) to the device.
    fn set_report(&self, report_id: u8, data: &[u8]) -> Result<()>;
}

impl<C: ControlChannel + ?Sized> ControlChannel for &C {
    fn get_report(&self, report_id: u8, buf: &mut [u8]) -> Result<usize> {
        (**self).get_report(report_id, buf)
    }

    fn set_report(&self, report_id: u8, data: &[u8]) -> Result<()> {
        (**self).set_report(report_id, data)
    }
}

impl<C: ControlChannel + ?Sized> ControlChannel for Box<C> {
    fn get_report(&self, report_id: u8, buf: &mut [u8]) -> Result<usize> {
        (**self).get_report(report_id, buf)
    }

    fn set_report(&self, report_id: u8, data: &[u8]) -> Result<()> {
        (**self).set_report(report_id, data)
    }
}

/// Class requests sent straight to the interface through libusb.
pub struct UsbChannel {
    handle: DeviceHandle<GlobalContext>,
    interface: u16,
    timeout: Duration,
}

impl UsbChannel {
    pub fn new(handle: DeviceHandle<GlobalContext>, interface: u8, timeout: Duration) -> Self {
        Self {
            handle,
            interface: interface as u16,
            timeout,
        }
    }
}

impl ControlChannel for UsbChannel {
    fn get_report(&self, report_id: u8, buf: &mut [u8]) -> Result<usize> {
        let len = self.handle.read_control(
            REQUEST_TYPE_DEV_TO_HOST,
            HID_GET_REPORT,
            report_id as u16,
            self.interface,
            buf,
            self.timeout,
        )?;
        Ok(len)
    }

    fn set_report(&self, report_id: u8, data: &[u8]) -> Result<()> {
        let written = self.handle.write_control(
            REQUEST_TYPE_HOST_TO_DEV,
            HID_SET_REPORT,
            (FEATURE_REPORT_TYPE << 8) | report_id as u16,
            self.interface,
            data,
            self.timeout,
        )?;
        check_written(report_id, written, data.len())
    }
}

/// A control write that moved fewer bytes than requested left the device
/// with a truncated report.
fn check_written(report_id: u8, written: usize, expected: usize) -> Result<()> {
    if written != expected {
        log::error!(
            "SET_REPORT 0x{:02x}: wrote {} of {} bytes",
            report_id,
            written,
            expected
        );
        return Err(DsError::Usb(rusb::Error::Io));
    }
    Ok(())
}

/// Feature reports through the OS HID driver.
///
/// Used where the kernel driver cannot be detached. hidapi always addresses
/// feature reports, so GET_REPORT carries report type 3 here.
pub struct HidapiChannel {
    device: HidDevice,
}

impl HidapiChannel {
    pub fn new(device: HidDevice) -> Self {
        Self { device }
    }
}

impl ControlChannel for HidapiChannel {
    fn get_report(&self, report_id: u8, buf: &mut [u8]) -> Result<usize> {
        buf[0] = report_id;
        Ok(self.device.get_feature_report(buf)?)
    }

    fn set_report(&self, _report_id: u8, data: &[u8]) -> Result<()> {
        Ok(self.device.send_feature_report(data)?)
    }
}

/// HID transport layer: report-id framing on top of a [`ControlChannel`].
///
/// No retries happen here; every call is a single blocking exchange.
pub struct HidTransport<C> {
    channel: C,
}

impl<C: ControlChannel> HidTransport<C> {
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    /// Swap in a freshly opened channel, returning the old one.
    pub fn replace_channel(&mut self, channel: C) -> C {
        std::mem::replace(&mut self.channel, channel)
    }

    /// Read `size` payload bytes of report `report_id`.
    ///
    /// Requests `size + 1` bytes and drops the leading report-id echo. Any
    /// other length is a protocol error.
    pub fn get_report(&self, report_id: u8, size: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; size + 1];
        buf[0] = report_id;
        let len = self.channel.get_report(report_id, &mut buf)?;
        if len != size + 1 {
            return Err(DsError::ShortReport {
                report_id,
                expected: size + 1,
                actual: len,
            });
        }
        log::debug!("GET 0x{:02x} <- {:02x?}", report_id, &buf[1..]);
        Ok(buf.split_off(1))
    }

    /// Write `payload` as report `report_id`.
    pub fn set_report(&self, report_id: u8, payload: &[u8]) -> Result<()> {
        let mut buf = Vec::with_capacity(payload.len() + 1);
        buf.push(report_id);
        buf.extend_from_slice(payload);
        log::debug!("SET 0x{:02x} -> {:02x?}", report_id, payload);
        self.channel.set_report(report_id, &buf)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::ControlChannel;
    use crate::{DsError, Result};
    use std::cell::RefCell;
    use std::collections::{HashSet, VecDeque};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Transfer {
        Get(u8),
        Set(u8, Vec<u8>),
    }

    /// Replays canned GET responses in order and records every transfer.
    #[derive(Default)]
    pub struct ScriptedChannel {
        responses: RefCell<VecDeque<(u8, Vec<u8>)>>,
        transfers: RefCell<Vec<Transfer>>,
        failing_sets: RefCell<HashSet<u8>>,
    }

    impl ScriptedChannel {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue the payload (without the id echo) returned by the next GET.
        pub fn respond(&self, report_id: u8, payload: &[u8]) -> &Self {
            self.responses
                .borrow_mut()
                .push_back((report_id, payload.to_vec()));
            self
        }

        /// Make every SET of `report_id` fail like a dropped transfer.
        pub fn fail_set(&self, report_id: u8) -> &Self {
            self.failing_sets.borrow_mut().insert(report_id);
            self
        }

        pub fn transfers(&self) -> Vec<Transfer> {
            self.transfers.borrow().clone()
        }

        /// Payloads (without the id prefix) of every SET sent to `report_id`.
        pub fn sets_to(&self, report_id: u8) -> Vec<Vec<u8>> {
            self.transfers
                .borrow()
                .iter()
                .filter_map(|t| match t {
                    Transfer::Set(id, data) if *id == report_id => Some(data[1..].to_vec()),
                    _ => None,
                })
                .collect()
        }

        pub fn pending_responses(&self) -> usize {
            self.responses.borrow().len()
        }
    }

    impl ControlChannel for ScriptedChannel {
        fn get_report(&self, report_id: u8, buf: &mut [u8]) -> Result<usize> {
            self.transfers.borrow_mut().push(Transfer::Get(report_id));
            let (id, payload) = self
                .responses
                .borrow_mut()
                .pop_front()
                .ok_or(DsError::Usb(rusb::Error::Pipe))?;
            assert_eq!(id, report_id, "scripted response for wrong report");
            let len = (payload.len() + 1).min(buf.len());
            buf[0] = report_id;
            buf[1..len].copy_from_slice(&payload[..len - 1]);
            Ok(len)
        }

        fn set_report(&self, report_id: u8, data: &[u8]) -> Result<()> {
            self.transfers
                .borrow_mut()
                .push(Transfer::Set(report_id, data.to_vec()));
            if self.failing_sets.borrow().contains(&report_id) {
                return Err(DsError::Usb(rusb::Error::NoDevice));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{ScriptedChannel, Transfer};
    use super::*;

    #[test]
    fn test_get_report_strips_echo() {
        let channel = ScriptedChannel::new();
        channel.respond(0x81, &[1, 2, 3, 4, 5, 6]);
        let hid = HidTransport::new(&channel);
        assert_eq!(hid.get_report(0x81, 6).unwrap(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_short_control_write_is_a_transfer_failure() {
        assert!(check_written(0x80, 7, 7).is_ok());
        let err = check_written(0x80, 4, 7).unwrap_err();
        assert!(matches!(err, DsError::Usb(rusb::Error::Io)));
        assert!(err.is_transfer_failure());
    }

    #[test]
    fn test_get_report_short_read() {
        let channel = ScriptedChannel::new();
        channel.respond(0x12, &[0u8; 10]);
        let hid = HidTransport::new(&channel);
        let err = hid.get_report(0x12, 15).unwrap_err();
        assert!(matches!(
            err,
            DsError::ShortReport {
                report_id: 0x12,
                expected: 16,
                actual: 11
            }
        ));
        assert!(err.is_protocol_error());
    }

    #[test]
    fn test_set_report_prefixes_id() {
        let channel = ScriptedChannel::new();
        let hid = HidTransport::new(&channel);
        hid.set_report(0xa1, &[1]).unwrap();
        assert_eq!(channel.transfers(), vec![Transfer::Set(0xa1, vec![0xa1, 1])]);
    }

    #[test]
    fn test_transfer_failure_is_io_error() {
        let channel = ScriptedChannel::new();
        channel.fail_set(0xa0);
        let hid = HidTransport::new(&channel);
        let err = hid.set_report(0xa0, &[4, 1, 0]).unwrap_err();
        assert!(err.is_transfer_failure());
    }
}
