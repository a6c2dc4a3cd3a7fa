//! Command-line surfaces of the three tools.
//!
//! Raw clap subcommands are validated into typed actions before the device
//! is touched; each action maps onto exactly one [`Device`] operation.

use crate::calibration;
use crate::device::Device;
use crate::hid::ControlChannel;
use crate::operator::Operator;
use crate::protocol::{
    IMU_CALIBRATION_SET_SIZE, LINK_KEY_SIZE, MAC_SIZE, PCBA_ID_SIZE, SERIAL_NUMBER_SIZE,
};
use crate::types::{CalibrationFlags, FlashMirrorMode, MacAddr, ResetOutcome};
use crate::{DsError, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ds4-tool", about = "Play with the DS4 controller", version)]
pub struct Ds4ToolCli {
    #[command(subcommand)]
    pub action: Option<Ds4Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Ds4Command {
    /// Dump the flash mirror
    DumpFlash {
        /// Output file to write the dump to
        output_file: String,
    },
    /// Print info about the DS4
    Info,
    /// Reset the DS4
    Reset,
    /// Get the Bluetooth MAC Address
    GetBtMacAddr,
    /// Set the Bluetooth MAC Address
    SetBtMacAddr {
        /// New MAC address to store (6 bytes hex)
        new_mac_addr: String,
    },
    /// Get Bluetooth link information
    GetBtLinkInfo,
    /// Update Bluetooth link information
    SetBtLinkInfo {
        /// Host MAC Address to connect to (6 bytes hex)
        host_addr: String,
        /// Bluetooth link key (16 bytes hex)
        link_key: String,
    },
    /// Retrieve IMU calibration data
    GetImuCalibration,
    /// Change IMU calibration data
    SetImuCalibration {
        /// New calibration data to store (36 bytes hex)
        data: String,
    },
    /// Get flash-mirror status
    GetFlashMirrorStatus,
    /// Change how flash mirror works
    SetFlashMirrorStatus {
        /// Set if changes in configuration are temporary(1) or permanent(0)
        #[arg(allow_hyphen_values = true)]
        temporary: String,
    },
    /// Get the PCBA manufacturer ID
    GetPcbaId,
    /// Change the PCBA manufacturer ID
    SetPcbaId {
        /// New manufacturer ID (6 bytes hex)
        data: String,
    },
    /// Read BT enable bit
    GetBtEnable,
    /// Change the BT enable bit
    SetBtEnable {
        /// 0 to disable and 1 to enable
        #[arg(allow_hyphen_values = true)]
        enable: String,
    },
    /// Read the serial number
    GetSerialNumber,
    /// Set the serial number
    SetSerialNumber {
        /// 2 bytes hex
        data: String,
    },
    /// Read which calibrations the DS4 reports as done
    GetCalibrationFlags,
}

/// A validated ds4-tool action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ds4Action {
    DumpFlash(PathBuf),
    Info,
    Reset,
    GetBtMacAddr,
    SetBtMacAddr(MacAddr),
    GetBtLinkInfo,
    SetBtLinkInfo {
        host: MacAddr,
        link_key: [u8; LINK_KEY_SIZE],
    },
    GetImuCalibration,
    SetImuCalibration([u8; IMU_CALIBRATION_SET_SIZE]),
    GetFlashMirrorStatus,
    SetFlashMirrorStatus(FlashMirrorMode),
    GetPcbaId,
    SetPcbaId([u8; PCBA_ID_SIZE]),
    GetBtEnable,
    SetBtEnable(bool),
    GetSerialNumber,
    SetSerialNumber([u8; SERIAL_NUMBER_SIZE]),
    GetCalibrationFlags,
}

impl Ds4Command {
    /// Check every argument; no I/O happens here.
    pub fn validate(self) -> Result<Ds4Action> {
        Ok(match self {
            Ds4Command::DumpFlash { output_file } => Ds4Action::DumpFlash(dump_path(&output_file)),
            Ds4Command::Info => Ds4Action::Info,
            Ds4Command::Reset => Ds4Action::Reset,
            Ds4Command::GetBtMacAddr => Ds4Action::GetBtMacAddr,
            Ds4Command::SetBtMacAddr { new_mac_addr } => {
                Ds4Action::SetBtMacAddr(MacAddr(parse_hex("MAC address", &new_mac_addr)?))
            }
            Ds4Command::GetBtLinkInfo => Ds4Action::GetBtLinkInfo,
            Ds4Command::SetBtLinkInfo {
                host_addr,
                link_key,
            } => Ds4Action::SetBtLinkInfo {
                host: MacAddr(parse_hex::<MAC_SIZE>("host addr", &host_addr)?),
                link_key: parse_hex("link key", &link_key)?,
            },
            Ds4Command::GetImuCalibration => Ds4Action::GetImuCalibration,
            Ds4Command::SetImuCalibration { data } => {
                Ds4Action::SetImuCalibration(parse_hex("IMU calibration", &data)?)
            }
            Ds4Command::GetFlashMirrorStatus => Ds4Action::GetFlashMirrorStatus,
            Ds4Command::SetFlashMirrorStatus { temporary } => {
                Ds4Action::SetFlashMirrorStatus(if parse_flag("temporary", &temporary)? {
                    FlashMirrorMode::Temporary
                } else {
                    FlashMirrorMode::Permanent
                })
            }
            Ds4Command::GetPcbaId => Ds4Action::GetPcbaId,
            Ds4Command::SetPcbaId { data } => Ds4Action::SetPcbaId(parse_hex("PCBA id", &data)?),
            Ds4Command::GetBtEnable => Ds4Action::GetBtEnable,
            Ds4Command::SetBtEnable { enable } => {
                Ds4Action::SetBtEnable(parse_flag("enable", &enable)?)
            }
            Ds4Command::GetSerialNumber => Ds4Action::GetSerialNumber,
            Ds4Command::SetSerialNumber { data } => {
                Ds4Action::SetSerialNumber(parse_hex("serial number", &data)?)
            }
            Ds4Command::GetCalibrationFlags => Ds4Action::GetCalibrationFlags,
        })
    }
}

/// Decode a hex argument that must be exactly `N` bytes long.
pub fn parse_hex<const N: usize>(what: &str, input: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(input.trim())
        .map_err(|e| DsError::InvalidArgument(format!("{} is not valid hex: {}", what, e)))?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| {
        DsError::InvalidArgument(format!("{} must be {} bytes, got {}", what, N, len))
    })
}

/// Accept exactly `0` or `1`.
pub fn parse_flag(what: &str, input: &str) -> Result<bool> {
    match input.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(DsError::InvalidArgument(format!(
            "{} must be 0 or 1, got '{}'",
            what, other
        ))),
    }
}

const FORBIDDEN_PATH_CHARS: &[char] = &['*', '<', '>', '?', ':', '|'];

pub fn strip_forbidden_path_chars(path: &str) -> String {
    path.chars()
        .filter(|c| !FORBIDDEN_PATH_CHARS.contains(c))
        .collect()
}

/// Output path for a flash dump. Windows rejects some characters in file
/// names, so they are dropped there.
pub fn dump_path(raw: &str) -> PathBuf {
    if cfg!(target_os = "windows") {
        PathBuf::from(strip_forbidden_path_chars(raw))
    } else {
        PathBuf::from(raw)
    }
}

/// Validate `command` and run it against `device`.
///
/// `reconnect` waits for the controller to come back after a reset.
pub fn run_ds4_command<C: ControlChannel>(
    device: &mut Device<C>,
    command: Ds4Command,
    reconnect: impl FnOnce() -> Result<C>,
) -> Result<()> {
    let action = command.validate()?;
    run_ds4_action(device, action, reconnect)
}

pub fn run_ds4_action<C: ControlChannel>(
    device: &mut Device<C>,
    action: Ds4Action,
    reconnect: impl FnOnce() -> Result<C>,
) -> Result<()> {
    match action {
        Ds4Action::DumpFlash(path) => {
            println!("Dumping flash mirror to {}...", path.display());
            let mut sink = BufWriter::new(File::create(&path)?);
            let written = device.dump_flash_mirror(&mut sink)?;
            log::info!("Wrote {} bytes to {}", written, path.display());
            println!("done");
        }
        Ds4Action::Info => {
            println!("{}", device.version_info()?);
        }
        Ds4Action::Reset => {
            println!("Send reset command...");
            match device.reset()? {
                ResetOutcome::Disconnected => {
                    device.reconnect(reconnect()?);
                    println!("Reset completed");
                }
                ResetOutcome::StillConnected => {
                    log::warn!("Controller acknowledged the reset but did not disconnect");
                }
            }
        }
        Ds4Action::GetBtMacAddr => {
            println!("DS4 MAC: {}", device.bt_mac_addr()?);
        }
        Ds4Action::SetBtMacAddr(mac) => {
            println!("Setting DS4 MAC to {}", mac);
            device.set_bt_mac_addr(&mac)?;
        }
        Ds4Action::GetBtLinkInfo => {
            let info = device.bt_link_info()?;
            println!("DS4 MAC: {}", info.device_mac);
            println!("Host MAC: {}", info.host_mac);
        }
        Ds4Action::SetBtLinkInfo { host, link_key } => {
            println!(
                "Setting host_addr={} link_key={}",
                host,
                hex::encode(link_key)
            );
            device.set_bt_link_info(&host, &link_key)?;
        }
        Ds4Action::GetImuCalibration => {
            println!("Raw data: {}", hex::encode(device.imu_calibration()?));
        }
        Ds4Action::SetImuCalibration(data) => {
            println!("Update IMU calibration data to: {}", hex::encode(data));
            device.set_imu_calibration(&data)?;
        }
        Ds4Action::GetFlashMirrorStatus => {
            print_flash_mirror_status(device)?;
        }
        Ds4Action::SetFlashMirrorStatus(mode) => {
            match mode {
                FlashMirrorMode::Temporary => println!("Set to: temporary"),
                FlashMirrorMode::Permanent => println!("Set to: permanent"),
            }
            device.set_flash_mirror_mode(mode)?;
            println!("Re-reading flash mirror status..");
            print_flash_mirror_status(device)?;
        }
        Ds4Action::GetPcbaId => {
            println!("PCBA Id: {}", hex::encode(device.pcba_id()?));
        }
        Ds4Action::SetPcbaId(id) => {
            println!("Set to: {}", hex::encode(id));
            device.set_pcba_id(&id)?;
        }
        Ds4Action::GetBtEnable => {
            println!("BT Enable: {}", device.bt_enable()?);
        }
        Ds4Action::SetBtEnable(enable) => {
            println!("Set to: {:02x}", u8::from(enable));
            device.set_bt_enable(enable)?;
        }
        Ds4Action::GetSerialNumber => {
            // The serial number location in the flash mirror is unknown.
            println!("get-serial-number isn't implemented yet");
        }
        Ds4Action::SetSerialNumber(serial) => {
            device.set_serial_number(&serial)?;
            println!("Change serial number to: {}", hex::encode(serial));
        }
        Ds4Action::GetCalibrationFlags => {
            let flags = device.calibration_flags()?;
            println!("Calibration flags: {:032b}", flags.bits());
            for (name, flag) in [
                ("Stick min-max", CalibrationFlags::STICK_MIN_MAX),
                ("Stick center", CalibrationFlags::STICK_CENTER),
                ("L2", CalibrationFlags::L2),
                ("R2", CalibrationFlags::R2),
                ("Gyroscope", CalibrationFlags::GYROSCOPE),
                ("Accelerometer", CalibrationFlags::ACCELEROMETER),
            ] {
                println!("    {}: {}", name, flags.contains(flag));
            }
        }
    }
    Ok(())
}

fn print_flash_mirror_status<C: ControlChannel>(device: &Device<C>) -> Result<()> {
    println!(
        "Changes in flash mirror are temporary: {}",
        device.flash_mirror_status()?
    );
    Ok(())
}

/// Parse the process arguments. Help and version output exit 0, every
/// other usage error exits 1.
pub fn parse_cli<P: Parser>() -> P {
    match P::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = usage_exit_code(&e);
            let _ = e.print();
            std::process::exit(code);
        }
    }
}

/// Exit status for a clap parse failure.
pub fn usage_exit_code(e: &clap::Error) -> i32 {
    if e.use_stderr() {
        1
    } else {
        0
    }
}

/// Calibrations offered by the ds4-calibration-tool menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ds4Calibration {
    StickCenter,
    StickRange,
    Triggers,
}

pub const DS4_CALIBRATION_MENU: &str = "Choose what you want to calibrate:\n\
1. Analog stick center\n\
2. Analog stick range (min-max)\n\
3. L2 / R2 (beta)";

impl Ds4Calibration {
    pub fn from_menu_choice(input: &str) -> Option<Self> {
        match input.trim().parse::<u32>().ok()? {
            1 => Some(Ds4Calibration::StickCenter),
            2 => Some(Ds4Calibration::StickRange),
            3 => Some(Ds4Calibration::Triggers),
            _ => None,
        }
    }

    /// Run the calibration and fetch the controller's debug log about it.
    ///
    /// The log is informational: once the calibration succeeded, a failed
    /// dump is logged and reported as `None`.
    pub fn run<C: ControlChannel, O: Operator + ?Sized>(
        self,
        device: &Device<C>,
        operator: &mut O,
    ) -> Result<Option<Vec<Vec<u8>>>> {
        match self {
            Ds4Calibration::StickCenter => calibration::calibrate_stick_center(device, operator)?,
            Ds4Calibration::StickRange => calibration::calibrate_stick_range(device, operator)?,
            Ds4Calibration::Triggers => calibration::calibrate_triggers(device, operator)?,
        }
        match calibration::dump_debug_chunks(device) {
            Ok(chunks) => Ok(Some(chunks)),
            Err(e) => {
                log::warn!("Could not read calibration debug data: {}", e);
                Ok(None)
            }
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "ds5-calibration-tool", version)]
pub struct Ds5ToolCli {
    /// make changes permanent
    #[arg(short, long, global = true)]
    pub permanent: bool,

    #[command(subcommand)]
    pub action: Option<Ds5Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Ds5Command {
    /// calibrate the center the analog sticks
    AnalogCenter,
    /// calibrate the range of analog sticks
    AnalogRange,
}

/// Run a DualSense calibration, inside an NVS unlock when `permanent`.
pub fn run_ds5_command<C: ControlChannel, O: Operator + ?Sized>(
    device: &mut Device<C>,
    command: Ds5Command,
    permanent: bool,
    operator: &mut O,
) -> Result<()> {
    let mut calibrate = |device: &mut Device<C>| match command {
        Ds5Command::AnalogCenter => calibration::calibrate_stick_center(device, operator),
        Ds5Command::AnalogRange => calibration::calibrate_stick_range(device, operator),
    };
    if permanent {
        device.with_nvs_unlocked(calibrate)
    } else {
        calibrate(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hid::mock::{ScriptedChannel, Transfer};
    use crate::operator::StickAction;
    use crate::types::DeviceFamily;
    use clap::CommandFactory;

    struct NoOperator;

    impl Operator for NoOperator {
        fn choose_stick_action(&mut self) -> Result<StickAction> {
            Ok(StickAction::Store)
        }

        fn confirm(&mut self, _message: &str) -> Result<()> {
            Ok(())
        }
    }

    fn no_reconnect<'a>() -> Result<&'a ScriptedChannel> {
        Err(DsError::DeviceNotFound)
    }

    #[test]
    fn test_cli_definitions() {
        Ds4ToolCli::command().debug_assert();
        Ds5ToolCli::command().debug_assert();
    }

    #[test]
    fn test_parse_ds4_subcommands() {
        let cli = Ds4ToolCli::try_parse_from(["ds4-tool", "set-bt-mac-addr", "a0b1c2d3e4f5"]).unwrap();
        assert_eq!(
            cli.action.unwrap().validate().unwrap(),
            Ds4Action::SetBtMacAddr(MacAddr([0xa0, 0xb1, 0xc2, 0xd3, 0xe4, 0xf5]))
        );

        let cli = Ds4ToolCli::try_parse_from(["ds4-tool"]).unwrap();
        assert!(cli.action.is_none());
    }

    #[test]
    fn test_usage_errors_exit_one() {
        for args in [
            &["ds4-tool", "frobnicate"][..],
            &["ds4-tool", "set-bt-mac-addr"][..],
            &["ds4-tool", "set-bt-link-info", "010203040506"][..],
        ] {
            let err = Ds4ToolCli::try_parse_from(args).unwrap_err();
            assert_eq!(usage_exit_code(&err), 1, "{:?}", args);
        }
        let err = Ds5ToolCli::try_parse_from(["ds5-calibration-tool", "analog-sideways"]).unwrap_err();
        assert_eq!(usage_exit_code(&err), 1);

        let err = Ds4ToolCli::try_parse_from(["ds4-tool", "--help"]).unwrap_err();
        assert_eq!(usage_exit_code(&err), 0);
        let err = Ds5ToolCli::try_parse_from(["ds5-calibration-tool", "--version"]).unwrap_err();
        assert_eq!(usage_exit_code(&err), 0);
    }

    #[test]
    fn test_parse_ds5_flags() {
        let cli = Ds5ToolCli::try_parse_from(["ds5-calibration-tool", "-p", "analog-range"]).unwrap();
        assert!(cli.permanent);
        assert_eq!(cli.action, Some(Ds5Command::AnalogRange));

        let cli = Ds5ToolCli::try_parse_from(["ds5-calibration-tool", "analog-center"]).unwrap();
        assert!(!cli.permanent);
    }

    #[test]
    fn test_bad_mac_rejected_before_io() {
        let channel = ScriptedChannel::new();
        let mut device = Device::new(&channel, DeviceFamily::Ds4);
        for bad in ["aabbccddee", "aabbccddeeff00", "aa:bb:cc:dd:ee:ff", "zzbbccddeeff"] {
            let command = Ds4Command::SetBtMacAddr {
                new_mac_addr: bad.to_string(),
            };
            let err = run_ds4_command(&mut device, command, no_reconnect).unwrap_err();
            assert!(err.is_argument_error(), "{} accepted", bad);
        }
        assert!(channel.transfers().is_empty());
    }

    #[test]
    fn test_link_info_lengths() {
        let command = Ds4Command::SetBtLinkInfo {
            host_addr: "010203040506".into(),
            link_key: "00".repeat(15),
        };
        assert!(command.validate().unwrap_err().is_argument_error());

        let command = Ds4Command::SetBtLinkInfo {
            host_addr: "010203040506".into(),
            link_key: "ab".repeat(16),
        };
        assert!(matches!(
            command.validate().unwrap(),
            Ds4Action::SetBtLinkInfo { link_key, .. } if link_key == [0xab; 16]
        ));
    }

    #[test]
    fn test_flags() {
        assert!(parse_flag("enable", "1").unwrap());
        assert!(!parse_flag("enable", "0").unwrap());
        assert!(parse_flag("enable", "2").is_err());
        assert!(parse_flag("enable", "yes").is_err());
        assert_eq!(
            Ds4Command::SetFlashMirrorStatus {
                temporary: "0".into()
            }
            .validate()
            .unwrap(),
            Ds4Action::SetFlashMirrorStatus(FlashMirrorMode::Permanent)
        );
    }

    #[test]
    fn test_fixed_length_blobs() {
        assert!(parse_hex::<36>("IMU calibration", &"00".repeat(36)).is_ok());
        assert!(parse_hex::<36>("IMU calibration", &"00".repeat(41)).is_err());
        assert!(parse_hex::<6>("PCBA id", "0102030405").is_err());
        assert_eq!(parse_hex::<2>("serial number", "beef").unwrap(), [0xbe, 0xef]);
    }

    #[test]
    fn test_strip_forbidden_path_chars() {
        assert_eq!(strip_forbidden_path_chars("C:\\dump<1>?.bin"), "C\\dump1.bin");
        assert_eq!(strip_forbidden_path_chars("a*b|c"), "abc");
    }

    #[test]
    fn test_menu_choice() {
        assert_eq!(
            Ds4Calibration::from_menu_choice(" 1 "),
            Some(Ds4Calibration::StickCenter)
        );
        assert_eq!(
            Ds4Calibration::from_menu_choice("3"),
            Some(Ds4Calibration::Triggers)
        );
        assert_eq!(Ds4Calibration::from_menu_choice("4"), None);
        assert_eq!(Ds4Calibration::from_menu_choice("center"), None);
    }

    #[test]
    fn test_calibration_survives_failed_debug_dump() {
        let channel = ScriptedChannel::new();
        channel.respond(0x91, &[1, 2, 1]);
        channel.respond(0x92, &[1, 2, 0xff]);
        channel.respond(0x91, &[1, 2, 2]);
        channel.respond(0x92, &[1, 2, 1]);
        let device = Device::new(&channel, DeviceFamily::Ds4);

        let log = Ds4Calibration::StickRange
            .run(&device, &mut NoOperator)
            .unwrap();
        assert_eq!(log, None);
        assert_eq!(channel.sets_to(0x90), vec![vec![1, 1, 2], vec![2, 1, 2]]);
    }

    #[test]
    fn test_calibration_returns_debug_dump() {
        let channel = ScriptedChannel::new();
        channel.respond(0x91, &[1, 2, 1]);
        channel.respond(0x92, &[1, 2, 0xff]);
        channel.respond(0x91, &[1, 2, 2]);
        channel.respond(0x92, &[1, 2, 1]);
        channel.respond(0x93, &[0xff; 13]);
        let device = Device::new(&channel, DeviceFamily::Ds4);

        let log = Ds4Calibration::StickRange
            .run(&device, &mut NoOperator)
            .unwrap();
        assert_eq!(log, Some(Vec::new()));
    }

    #[test]
    fn test_calibration_failure_skips_debug_dump() {
        let channel = ScriptedChannel::new();
        channel.respond(0x91, &[1, 2, 0]);
        let device = Device::new(&channel, DeviceFamily::Ds4);

        let err = Ds4Calibration::StickRange
            .run(&device, &mut NoOperator)
            .unwrap_err();
        assert!(err.is_protocol_error());
        assert!(!channel.transfers().contains(&Transfer::Get(0x93)));
    }

    #[test]
    fn test_reset_reconnects() {
        let first = ScriptedChannel::new();
        first.fail_set(0xa0);
        let second = ScriptedChannel::new();
        second.respond(0x81, &[1, 2, 3, 4, 5, 6]);
        let mut device = Device::new(&first, DeviceFamily::Ds4);

        run_ds4_command(&mut device, Ds4Command::Reset, || Ok(&second)).unwrap();
        assert_eq!(device.bt_mac_addr().unwrap(), MacAddr([1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn test_ds5_permanent_wraps_calibration() {
        let channel = ScriptedChannel::new();
        channel.respond(0x83, &[1, 1, 0, 0xff]);
        let mut device = Device::new(&channel, DeviceFamily::Ds5);

        let err = run_ds5_command(&mut device, Ds5Command::AnalogCenter, true, &mut NoOperator)
            .unwrap_err();
        assert!(err.is_protocol_error());
        assert_eq!(
            channel.sets_to(0x80),
            vec![vec![3, 2, 101, 50, 64, 12], vec![3, 1]]
        );
    }

    #[test]
    fn test_ds5_without_permanent_leaves_nvs_alone() {
        let channel = ScriptedChannel::new();
        channel.respond(0x83, &[1, 2, 1, 0xff]);
        let mut device = Device::new(&channel, DeviceFamily::Ds5);

        run_ds5_command(&mut device, Ds5Command::AnalogRange, false, &mut NoOperator).unwrap();
        assert!(channel.sets_to(0x80).is_empty());
        assert_eq!(channel.sets_to(0x82), vec![vec![1, 1, 2], vec![2, 1, 2]]);
    }
}
