//! Chip-control link abstractions
//!
//! Two transport variants cover the control channels found on front-end
//! readout chains:
//!
//! - [`BusTransport`]: an addressed multi-drop bus. Every frame names the
//!   starting register id it covers; payload size is capped by the link.
//! - [`StreamTransport`]: a point-to-point streaming channel that moves the
//!   whole register space as one logical blob; any chunking is internal to
//!   the transport.
//!
//! Concrete transports (remote-I/O sessions, test emulators) live outside
//! this crate; the controller only ever talks through these traits. Delays
//! are routed through the transport so emulators can elide them.

use core::fmt;
use std::time::Duration;

use thiserror::Error;

/// Transport-level failure
///
/// These are expected occasionally on real hardware and are absorbed by the
/// controller retry loop rather than by the codec.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkError {
    /// The link did not respond in time
    #[error("link operation timed out")]
    Timeout,

    /// The device rejected a frame
    #[error("device NACKed frame at register {register:#06x}")]
    Nack {
        /// Starting register of the rejected frame
        register: u16,
    },

    /// The link dropped mid-operation
    #[error("link disconnected")]
    Disconnected,

    /// A transfer returned fewer bytes than requested
    #[error("short transfer: expected {expected} bytes, got {got}")]
    ShortTransfer {
        /// Bytes requested
        expected: usize,
        /// Bytes actually transferred
        got: usize,
    },

    /// Any other transport-specific failure
    #[error("link I/O error: {0}")]
    Io(String),
}

/// Result type for transport operations
pub type LinkResult<T> = core::result::Result<T, LinkError>;

/// Logical address of one device on a control link
///
/// Carried in every error and log line so an operator can locate the
/// offending chip.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceAddress {
    /// Name of the physical link or connection the device hangs off
    pub link: String,
    /// Chip id on that link (0 for point-to-point channels)
    pub chip: u16,
}

impl DeviceAddress {
    /// Create a new device address
    pub fn new(link: impl Into<String>, chip: u16) -> Self {
        Self {
            link: link.into(),
            chip,
        }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:0x{:02X}", self.link, self.chip)
    }
}

/// Addressed multi-drop bus transport
///
/// Each frame carries a 2-byte starting register id; the payload covers the
/// registers `start_register..start_register + bytes.len()`.
pub trait BusTransport {
    /// Write one frame of register bytes starting at `start_register`
    fn write_frame(&mut self, start_register: u16, bytes: &[u8]) -> LinkResult<()>;

    /// Read `count` register bytes starting at `start_register`
    fn read_frame(&mut self, start_register: u16, count: usize) -> LinkResult<Vec<u8>>;

    /// Maximum payload size of one frame on this link
    fn max_frame_len(&self) -> usize;

    /// Block for the given duration
    ///
    /// Real links sleep here to respect inter-frame timing; emulators may
    /// record the request and return immediately.
    fn delay(&mut self, duration: Duration);
}

/// Point-to-point streaming transport
///
/// Moves a device's whole register space as one logical unit. Chunking, if
/// the physical layer needs any, is internal to the transport.
pub trait StreamTransport {
    /// Push a full register-space image to the device
    fn write_blob(&mut self, bytes: &[u8]) -> LinkResult<()>;

    /// Read the full register-space image back from the device
    fn read_blob(&mut self) -> LinkResult<Vec<u8>>;

    /// Block for the given duration (see [`BusTransport::delay`])
    fn delay(&mut self, duration: Duration);
}
