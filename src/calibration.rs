//! Factory calibration procedures.
//!
//! Stick calibrations on both families follow the same protocol: a start
//! command puts the target in the ready state, any number of sample commands
//! keep it there, and a store command commits the result. The device echoes
//! its state through status reports which are checked after every step; a
//! mismatch aborts the procedure without sending anything else.
//!
//! | Family | Command | Status reports | Ready | Stored |
//! |---|---|---|---|---|
//! | DS4 | 0x90 | 0x91, 0x92 | `(d,t,1)`, `(d,t,ff)` | `(d,t,2)`, `(d,t,1)` |
//! | DS5 | 0x82 | 0x83 | `(d,t,1,ff)` | not checked |

use crate::device::Device;
use crate::hid::ControlChannel;
use crate::operator::{Operator, StickAction};
use crate::protocol::{self, *};
use crate::types::{
    CalibrationOp, CalibrationTarget, ChunkRecord, DeviceFamily, TriggerAxis, TriggerEdge,
};
use crate::{DsError, Result};

/// Progress of a stick calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    Idle,
    /// Started and verified ready.
    Started,
    /// Sample command sent, waiting for the device to report ready again.
    Sampling,
    Stored,
}

impl CalibrationState {
    pub fn name(self) -> &'static str {
        match self {
            CalibrationState::Idle => "idle",
            CalibrationState::Started => "started",
            CalibrationState::Sampling => "sampling",
            CalibrationState::Stored => "stored",
        }
    }
}

/// A stick calibration session bound to one target.
pub struct StickCalibration<'a, C> {
    device: &'a Device<C>,
    target: CalibrationTarget,
    state: CalibrationState,
}

impl<'a, C: ControlChannel> StickCalibration<'a, C> {
    pub fn new(device: &'a Device<C>, target: CalibrationTarget) -> Self {
        Self {
            device,
            target,
            state: CalibrationState::Idle,
        }
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn start(&mut self) -> Result<()> {
        self.expect_state("start", CalibrationState::Idle)?;
        self.send(CalibrationOp::Start)?;
        self.state = CalibrationState::Started;
        self.verified(Self::verify_ready)
    }

    pub fn sample(&mut self) -> Result<()> {
        self.expect_state("sample", CalibrationState::Started)?;
        self.send(CalibrationOp::Sample)?;
        self.state = CalibrationState::Sampling;
        self.verified(Self::verify_ready)?;
        self.state = CalibrationState::Started;
        Ok(())
    }

    pub fn store(&mut self) -> Result<()> {
        self.expect_state("store", CalibrationState::Started)?;
        self.send(CalibrationOp::Store)?;
        self.verified(Self::verify_stored)?;
        self.state = CalibrationState::Stored;
        Ok(())
    }

    fn expect_state(&self, step: &'static str, wanted: CalibrationState) -> Result<()> {
        if self.state != wanted {
            return Err(DsError::InvalidTransition {
                step,
                state: self.state.name(),
            });
        }
        Ok(())
    }

    /// Run a status check; a failed check drops the session back to idle.
    fn verified(&mut self, check: fn(&Self) -> Result<()>) -> Result<()> {
        let result = check(self);
        if result.is_err() {
            self.state = CalibrationState::Idle;
        }
        result
    }

    fn send(&self, op: CalibrationOp) -> Result<()> {
        let report_id = match self.device.family() {
            DeviceFamily::Ds4 => REPORT_DS4_CALIBRATION_CMD,
            DeviceFamily::Ds5 => REPORT_DS5_CALIBRATION_CMD,
        };
        log::debug!("Calibration {:?} on {:?}", op, self.target);
        self.device
            .hid()
            .set_report(report_id, &protocol::encode_stick_command(op, self.target))
    }

    fn read_status(&self, report_id: u8, expected: &[u8]) -> Result<()> {
        let actual = self.device.hid().get_report(report_id, expected.len())?;
        protocol::check_status(report_id, &actual, expected)
    }

    fn verify_ready(&self) -> Result<()> {
        match self.device.family() {
            DeviceFamily::Ds4 => {
                self.read_status(
                    REPORT_DS4_CALIBRATION_STATUS,
                    &protocol::ds4_status_frame(self.target, 1),
                )?;
                self.read_status(
                    REPORT_DS4_CALIBRATION_STATUS2,
                    &protocol::ds4_status_frame(self.target, STATUS_NONE),
                )
            }
            DeviceFamily::Ds5 => self.read_status(
                REPORT_DS5_CALIBRATION_STATUS,
                &protocol::ds5_status_frame(self.target, 1),
            ),
        }
    }

    fn verify_stored(&self) -> Result<()> {
        match self.device.family() {
            DeviceFamily::Ds4 => {
                self.read_status(
                    REPORT_DS4_CALIBRATION_STATUS,
                    &protocol::ds4_status_frame(self.target, 2),
                )?;
                self.read_status(
                    REPORT_DS4_CALIBRATION_STATUS2,
                    &protocol::ds4_status_frame(self.target, 1),
                )
            }
            // The DualSense has no known post-store sentinel.
            DeviceFamily::Ds5 => Ok(()),
        }
    }
}

/// Calibrate the resting position of both sticks.
///
/// The operator may take any number of samples before storing.
pub fn calibrate_stick_center<C: ControlChannel, O: Operator + ?Sized>(
    device: &Device<C>,
    operator: &mut O,
) -> Result<()> {
    log::info!("Starting analog center calibration...");
    let mut calibration = StickCalibration::new(device, CalibrationTarget::STICK_CENTER);
    calibration.start()?;
    loop {
        match operator.choose_stick_action()? {
            StickAction::Sample => calibration.sample()?,
            StickAction::Store => {
                calibration.store()?;
                break;
            }
        }
    }
    log::info!("Stick calibration done");
    Ok(())
}

/// Calibrate the travel range of both sticks.
///
/// The device samples continuously between start and store.
pub fn calibrate_stick_range<C: ControlChannel, O: Operator + ?Sized>(
    device: &Device<C>,
    operator: &mut O,
) -> Result<()> {
    log::info!("Starting analog min-max calibration...");
    let mut calibration = StickCalibration::new(device, CalibrationTarget::STICK_RANGE);
    calibration.start()?;
    operator.confirm(&format!(
        "{} is now sampling data. Move the analogs all around their range.\n\
         When done, press enter to store calibration.",
        device.family().name()
    ))?;
    calibration.store()?;
    log::info!("Stick calibration done");
    Ok(())
}

const TRIGGER_STEPS: [(TriggerAxis, TriggerEdge); 6] = [
    (TriggerAxis::L2, TriggerEdge::Release),
    (TriggerAxis::L2, TriggerEdge::Mid),
    (TriggerAxis::L2, TriggerEdge::Full),
    (TriggerAxis::R2, TriggerEdge::Release),
    (TriggerAxis::R2, TriggerEdge::Mid),
    (TriggerAxis::R2, TriggerEdge::Full),
];

/// Each trigger position is confirmed twice by the firmware protocol.
const TRIGGER_CONFIRMATIONS: usize = 2;

/// Calibrate L2/R2 on a DualShock 4.
///
/// The device reports no status during this procedure, so nothing is
/// verified between steps.
pub fn calibrate_triggers<C: ControlChannel, O: Operator + ?Sized>(
    device: &Device<C>,
    operator: &mut O,
) -> Result<()> {
    if device.family() != DeviceFamily::Ds4 {
        return Err(DsError::InvalidArgument(format!(
            "trigger calibration is not supported on {}",
            device.family().name()
        )));
    }

    log::info!("Starting trigger calibration...");
    let send = |op, edge, axis| {
        device.hid().set_report(
            REPORT_DS4_CALIBRATION_CMD,
            &protocol::encode_trigger_command(op, edge, axis),
        )
    };

    send(CalibrationOp::Start, 0, TriggerAxis::Both)?;
    for (axis, edge) in TRIGGER_STEPS {
        for _ in 0..TRIGGER_CONFIRMATIONS {
            operator.confirm(&format!("{}: {} and press enter", axis, edge.label()))?;
            send(CalibrationOp::Sample, edge as u8, axis)?;
        }
    }
    log::info!("Write.");
    send(CalibrationOp::Store, 0, TriggerAxis::Both)?;
    log::info!("Trigger calibration done");
    Ok(())
}

fn read_chunk<C: ControlChannel>(device: &Device<C>) -> Result<ChunkRecord> {
    let data = device
        .hid()
        .get_report(REPORT_DS4_CALIBRATION_DEBUG, CHUNK_RECORD_SIZE)?;
    protocol::decode_chunk_record(&data)
}

/// Read the debug log a DualShock 4 keeps about its last calibration.
///
/// Returns the payload of every chunk in order. All chunks of a run must
/// belong to the same target.
pub fn dump_debug_chunks<C: ControlChannel>(device: &Device<C>) -> Result<Vec<Vec<u8>>> {
    let first = read_chunk(device)?;
    if first.is_empty_sentinel() {
        log::info!("No data to read");
        return Ok(Vec::new());
    }

    log::info!(
        "Data is split in {} chunks; we are at {}",
        first.num_chunks,
        first.cur_chunk
    );
    if first.num_chunks == 0 {
        return Ok(Vec::new());
    }

    let owner = (first.device_id, first.target_id);
    let mut num_chunks = first.num_chunks;
    let mut cur_chunk = first.cur_chunk;
    let mut chunks = vec![first.data()?.to_vec()];

    while u16::from(cur_chunk) + 1 < u16::from(num_chunks) {
        let record = read_chunk(device)?;
        if record.is_end_marker() {
            log::info!("No more data");
            break;
        }
        let actual = (record.device_id, record.target_id);
        if actual != owner {
            return Err(DsError::ChunkMismatch {
                expected: owner,
                actual,
            });
        }
        num_chunks = record.num_chunks;
        cur_chunk = record.cur_chunk;
        chunks.push(record.data()?.to_vec());
    }
    Ok(chunks)
}
