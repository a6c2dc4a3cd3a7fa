/// Errors that can occur when talking to a DualShock 4 or DualSense.
#[derive(Debug, thiserror::Error)]
pub enum DsError {
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Device not found")]
    DeviceNotFound,

    #[error("Could not detach kernel driver: {0}")]
    DriverDetach(rusb::Error),

    #[error("Report 0x{report_id:02x}: expected {expected} bytes, got {actual}")]
    ShortReport {
        report_id: u8,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid {what} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Reserved bytes in report 0x{report_id:02x} are {actual:02x?}, expected {expected:02x?}")]
    ReservedMismatch {
        report_id: u8,
        expected: Vec<u8>,
        actual: Vec<u8>,
    },

    #[error("Device is in an invalid state: report 0x{report_id:02x} returned {actual:02x?}, expected {expected:02x?}. Try to reset it")]
    UnexpectedStatus {
        report_id: u8,
        expected: Vec<u8>,
        actual: Vec<u8>,
    },

    #[error("Debug chunk belongs to ({actual:?}), expected ({expected:?})")]
    ChunkMismatch {
        expected: (u8, u8),
        actual: (u8, u8),
    },

    #[error("Calibration step '{step}' not allowed in state {state}")]
    InvalidTransition {
        step: &'static str,
        state: &'static str,
    },

    #[error("Flash mirror offset 0x{0:x} out of bounds")]
    OffsetOutOfRange(u16),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl DsError {
    /// True for failures of the underlying transfer or file, as opposed to
    /// malformed data or bad input.
    pub fn is_transfer_failure(&self) -> bool {
        matches!(self, DsError::Usb(_) | DsError::Hid(_) | DsError::Io(_))
    }

    /// True for errors detected while validating input, before any I/O.
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            DsError::InvalidArgument(_) | DsError::OffsetOutOfRange(_)
        )
    }

    /// True when a decoded value violated a protocol invariant.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            DsError::ShortReport { .. }
                | DsError::InvalidLength { .. }
                | DsError::ReservedMismatch { .. }
                | DsError::UnexpectedStatus { .. }
                | DsError::ChunkMismatch { .. }
                | DsError::InvalidTransition { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(DsError::Usb(rusb::Error::Io).is_transfer_failure());
        assert!(DsError::Usb(rusb::Error::NoDevice).is_transfer_failure());
        assert!(!DsError::DeviceNotFound.is_transfer_failure());
        assert!(DsError::OffsetOutOfRange(0x800).is_argument_error());
        assert!(DsError::InvalidArgument("x".into()).is_argument_error());
        let status = DsError::UnexpectedStatus {
            report_id: 0x91,
            expected: vec![1, 1, 1],
            actual: vec![1, 1, 9],
        };
        assert!(status.is_protocol_error());
        assert!(!status.is_transfer_failure());
    }
}
