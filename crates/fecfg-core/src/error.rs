//! Error types for fecfg-core
//!
//! Codec-level errors (overflow, missing registers, map inconsistencies)
//! abort the current operation immediately. Link-level errors are expected
//! occasionally and are absorbed by the controller retry loop. Every error
//! surfaced to a caller names the device address, setting, or register it
//! concerns, so an operator can act on it.

use thiserror::Error;

use crate::link::{DeviceAddress, LinkError};

/// Core error type
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// A value does not fit the declared bit width of its setting.
    ///
    /// Rejected before any mutation takes place.
    #[error("value {value:#x} exceeds the {size}-bit width of setting `{name}`")]
    Overflow {
        /// Setting name
        name: String,
        /// The rejected value
        value: u32,
        /// Declared bit width of the setting
        size: u8,
    },

    /// A setting name is not present in the register map.
    #[error("setting `{name}` is not in the register map")]
    UnknownSetting {
        /// The unknown name
        name: String,
    },

    /// A write was attempted to a setting flagged read-only.
    #[error("setting `{name}` is read-only")]
    ReadOnlySetting {
        /// Setting name
        name: String,
    },

    /// A register backing a requested setting is absent from a read-back map.
    ///
    /// No partial result is returned.
    #[error("register {register:#06x} backing setting `{name}` is missing from the read-back")]
    MissingRegister {
        /// Setting whose decode failed
        name: String,
        /// The absent register id
        register: u16,
    },

    /// Redundant triplicated copies of a setting disagree on read-back.
    ///
    /// This flags a hardware or link fault and is never silently resolved by
    /// picking one copy.
    #[error("redundant copies of setting `{name}` disagree: {copies:?}")]
    InconsistentRedundantCopies {
        /// Setting name
        name: String,
        /// The three decoded copies, in register order
        copies: [u8; 3],
    },

    /// The register map declares an unsupported width/shift/span combination,
    /// or two settings contribute overlapping bits to one register.
    ///
    /// A data or programmer error; fails fast at load or first use.
    #[error("register map inconsistency: {reason}")]
    InternalMapInconsistency {
        /// Human-readable description of the bad map data
        reason: String,
    },

    /// A serialized register space has the wrong length for this snapshot.
    #[error("snapshot size mismatch: expected {expected} bytes, got {got}")]
    SnapshotSize {
        /// Register space length of the snapshot
        expected: usize,
        /// Length of the offered byte sequence
        got: usize,
    },

    /// A transport operation failed outside the retry loop.
    #[error("link error on device {address}: {source}")]
    Link {
        /// Logical address of the device
        address: DeviceAddress,
        /// The underlying transport failure
        #[source]
        source: LinkError,
    },

    /// The device could not be verified error-free within the configured
    /// number of attempts. Fatal for that device.
    #[error("device {address} failed verification after {attempts} attempts")]
    RetryExhausted {
        /// Logical address of the device
        address: DeviceAddress,
        /// Number of write/read/verify attempts made
        attempts: u32,
    },
}

/// Result type alias using the core [`Error`] type
pub type Result<T> = core::result::Result<T, Error>;
