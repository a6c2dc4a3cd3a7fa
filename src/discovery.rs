use crate::config::{Backend, Config};
use crate::hid::{ControlChannel, HidapiChannel, UsbChannel};
use crate::protocol::HID_INTERFACE;
use crate::types::{DeviceFamily, UsbId};
use crate::{DsError, Result};
use hidapi::HidApi;
use std::time::Duration;

/// Boxed channel used by the binaries once a backend has been picked.
pub type DynChannel = Box<dyn ControlChannel>;

/// Something that can look for a controller matching a set of USB ids.
pub trait Discovery {
    type Channel: ControlChannel;

    /// Return the first attached device matching one of `ids`, or `None`.
    fn find(&mut self, ids: &[UsbId]) -> Result<Option<(UsbId, Self::Channel)>>;
}

/// Poll `discovery` until a device of `family` shows up.
///
/// Waits `config.poll_interval` between polls. Polls forever unless
/// `config.discovery_attempts` is set.
pub fn wait_for_device<D: Discovery>(
    discovery: &mut D,
    family: DeviceFamily,
    config: &Config,
) -> Result<D::Channel> {
    log::info!("Waiting for a {}...", family.name());
    let mut attempts = 0u32;
    loop {
        if let Some((id, channel)) = discovery.find(family.usb_ids())? {
            log::info!(
                "Found a {}: vendorId={:04x} productId={:04x}",
                family.name(),
                id.vendor_id,
                id.product_id
            );
            return Ok(channel);
        }

        attempts += 1;
        if let Some(max) = config.discovery_attempts {
            if attempts >= max {
                return Err(DsError::DeviceNotFound);
            }
        }
        std::thread::sleep(config.poll_interval);
    }
}

/// Wait for a controller using the backend selected in `config`.
pub fn connect(family: DeviceFamily, config: &Config) -> Result<DynChannel> {
    match config.backend {
        Backend::Rusb => {
            let mut discovery = RusbDiscovery::new(config.usb_timeout);
            let channel = wait_for_device(&mut discovery, family, config)?;
            Ok(Box::new(channel))
        }
        Backend::Hidapi => {
            let mut discovery = HidapiDiscovery::new()?;
            let channel = wait_for_device(&mut discovery, family, config)?;
            Ok(Box::new(channel))
        }
    }
}

/// libusb enumeration. Detaches the kernel HID driver on open.
pub struct RusbDiscovery {
    timeout: Duration,
}

impl RusbDiscovery {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Discovery for RusbDiscovery {
    type Channel = UsbChannel;

    fn find(&mut self, ids: &[UsbId]) -> Result<Option<(UsbId, UsbChannel)>> {
        let devices = rusb::devices()?;
        for id in ids {
            let usb_device = devices.iter().find(|d| {
                d.device_descriptor()
                    .map(|desc| {
                        desc.vendor_id() == id.vendor_id && desc.product_id() == id.product_id
                    })
                    .unwrap_or(false)
            });

            if let Some(usb_device) = usb_device {
                let handle = usb_device.open()?;
                detach_kernel_driver(&handle, HID_INTERFACE)?;
                return Ok(Some((
                    *id,
                    UsbChannel::new(handle, HID_INTERFACE, self.timeout),
                )));
            }
        }
        Ok(None)
    }
}

/// Take the interface away from the kernel HID driver, if it holds it.
///
/// Windows has no kernel driver to detach. The driver is not re-attached.
fn detach_kernel_driver(
    handle: &rusb::DeviceHandle<rusb::GlobalContext>,
    interface: u8,
) -> Result<()> {
    if cfg!(target_os = "windows") {
        return Ok(());
    }
    match handle.kernel_driver_active(interface) {
        Ok(true) => {
            handle
                .detach_kernel_driver(interface)
                .map_err(DsError::DriverDetach)?;
            log::info!("Detached kernel driver from interface {}", interface);
            Ok(())
        }
        Ok(false) | Err(rusb::Error::NotSupported) => Ok(()),
        Err(e) => Err(DsError::DriverDetach(e)),
    }
}

/// OS HID enumeration.
pub struct HidapiDiscovery {
    api: HidApi,
}

impl HidapiDiscovery {
    pub fn new() -> Result<Self> {
        Ok(Self {
            api: HidApi::new()?,
        })
    }
}

impl Discovery for HidapiDiscovery {
    type Channel = HidapiChannel;

    fn find(&mut self, ids: &[UsbId]) -> Result<Option<(UsbId, HidapiChannel)>> {
        self.api.refresh_devices()?;
        for id in ids {
            let present = self
                .api
                .device_list()
                .any(|d| d.vendor_id() == id.vendor_id && d.product_id() == id.product_id);
            if present {
                let device = self.api.open(id.vendor_id, id.product_id)?;
                return Ok(Some((*id, HidapiChannel::new(device))));
            }
        }
        Ok(None)
    }
}
