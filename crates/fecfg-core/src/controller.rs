//! Per-device configuration controllers
//!
//! A controller owns one device's transport handle, its last-known register
//! mirror and its [`ConfigurationTracker`], and drives the configuration
//! protocol:
//!
//! ```text
//! BUILD -> WRITE -> READ -> VERIFY -> SUCCESS
//!            ^                 |
//!            +--- retry -------+---> FAILURE (attempts exhausted)
//! ```
//!
//! BUILD computes the target register image against the mirror as the
//! hole-filling reference. WRITE pushes it over the link, READ fetches the
//! full space back, VERIFY feeds the read-back through the tracker. A clean
//! pass promotes the target to the new mirror; mismatches retry up to the
//! configured attempt bound and then fail with
//! [`Error::RetryExhausted`](crate::Error::RetryExhausted) naming the device.
//!
//! Link errors are expected occasionally and consume an attempt instead of
//! aborting; codec errors abort immediately. The error set is cleared at the
//! start of every VERIFY pass, so a later clean attempt is never polluted by
//! an earlier attempt's stale mismatches.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::codec;
use crate::error::{Error, Result};
use crate::link::{BusTransport, DeviceAddress, LinkError, LinkResult, StreamTransport};
use crate::map::RegisterMap;
use crate::protocol;
use crate::snapshot::{RegisterArraySnapshot, Sequence};
use crate::tracker::ConfigurationTracker;

/// Default bound on write/read/verify attempts per configuration
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Timing and retry parameters of one device controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Attempt bound for the write/read/verify loop
    pub max_attempts: u32,
    /// Pause between consecutive frames of a chunked transfer
    pub inter_chunk_delay: Duration,
    /// Pause before re-entering WRITE after a failed attempt
    pub retry_delay: Duration,
    /// Hold time for the link-training pattern before restoring the nominal
    /// configuration
    pub settle_time: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            inter_chunk_delay: Duration::from_micros(100),
            retry_delay: Duration::from_millis(10),
            settle_time: Duration::from_millis(50),
        }
    }
}

/// Capture the named values of a snapshot's writable settings.
fn initial_values(mirror: &RegisterArraySnapshot) -> Result<BTreeMap<String, u32>> {
    let map = Arc::clone(mirror.map());
    let mut values = BTreeMap::new();
    for name in map.writable_names() {
        values.insert(name.to_owned(), mirror.get(name)?);
    }
    Ok(values)
}

/// One VERIFY pass: decode the read-back per tracked setting and validate.
///
/// Decode faults (disagreeing redundant copies, missing registers) count as
/// that setting's mismatch: they flag hardware or link trouble, which the
/// retry loop owns.
fn verify_readback(
    address: &DeviceAddress,
    tracker: &mut ConfigurationTracker<u32>,
    map: &RegisterMap,
    names: &[String],
    readback: &[u8],
) {
    tracker.clear_errors();
    let registers: BTreeMap<u16, u8> = readback
        .iter()
        .enumerate()
        .map(|(i, &b)| (i as u16, b))
        .collect();
    for name in names {
        match codec::convert_registers_to_values(map, &registers, &[name.as_str()]) {
            Ok(decoded) => {
                tracker.validate(name, decoded[name.as_str()]);
            }
            Err(err) => {
                log::warn!("{address}: read-back of `{name}` undecodable: {err}");
                tracker.record_error(name);
            }
        }
    }
}

// =============================================================================
// Addressed-bus variant
// =============================================================================

/// Controller for a device on an addressed multi-drop bus
///
/// Exclusively owns its transport handle and tracker; one instance per
/// physical device, never shared across concurrent tasks.
#[derive(Debug)]
pub struct BusController<T: BusTransport> {
    address: DeviceAddress,
    link: T,
    mirror: RegisterArraySnapshot,
    tracker: ConfigurationTracker<u32>,
    config: ControllerConfig,
}

impl<T: BusTransport> BusController<T> {
    /// Create a controller for one device
    ///
    /// The mirror starts as a zeroed, inactive snapshot of the kind's
    /// register space; the tracker's initial snapshot is captured from it
    /// here, once.
    pub fn new(
        address: DeviceAddress,
        link: T,
        kind: &str,
        map: Arc<RegisterMap>,
        config: ControllerConfig,
    ) -> Result<Self> {
        let mirror = RegisterArraySnapshot::new(kind, map);
        let tracker = ConfigurationTracker::new(initial_values(&mirror)?);
        Ok(Self {
            address,
            link,
            mirror,
            tracker,
            config,
        })
    }

    /// Replace the mirror with a known device image (e.g. a prior read-back)
    ///
    /// The tracker's *current* values follow the seeded image; its initial
    /// snapshot stays as captured at construction.
    pub fn seed_mirror(&mut self, bytes: &[u8]) -> Result<()> {
        self.mirror.deserialize(bytes)?;
        let map = Arc::clone(self.mirror.map());
        for name in map.writable_names() {
            let value = self.mirror.get(name)?;
            self.tracker.update(name, value);
        }
        Ok(())
    }

    /// Run the full configuration protocol for the given named values
    pub fn configure(&mut self, values: &BTreeMap<String, u32>) -> Result<()> {
        // BUILD
        let mut target = self.mirror.clone();
        for (name, &value) in values {
            target.set(name, value)?;
        }
        self.tracker.update_all(values);
        if values.len() == self.tracker.len() && !self.tracker.check_full_write() {
            log::warn!(
                "{}: configuration mismatch: complete rewrite requested but some settings keep their initial values",
                self.address
            );
        }
        let changed = self.mirror.diff(&target)?;
        log::debug!(
            "{}: configuring {} settings, {} registers change",
            self.address,
            values.len(),
            changed.len()
        );

        let image = target.serialize();
        let names: Vec<String> = self.tracker.keys().cloned().collect();
        let map = Arc::clone(self.mirror.map());

        for attempt in 1..=self.config.max_attempts {
            match self.exchange(&image) {
                Ok(readback) => {
                    verify_readback(
                        &self.address,
                        &mut self.tracker,
                        &map,
                        &names,
                        &readback,
                    );
                    if !self.tracker.has_errors() {
                        self.mirror = target.clone();
                        self.mirror.mark_active();
                        log::info!(
                            "{}: configuration verified on attempt {}/{}",
                            self.address,
                            attempt,
                            self.config.max_attempts
                        );
                        return Ok(());
                    }
                    log::warn!(
                        "{}: read-back mismatch on attempt {}/{}: {:?}",
                        self.address,
                        attempt,
                        self.config.max_attempts,
                        self.tracker.errors()
                    );
                }
                Err(err) => {
                    log::warn!(
                        "{}: link error on attempt {}/{}: {}",
                        self.address,
                        attempt,
                        self.config.max_attempts,
                        err
                    );
                }
            }
            if attempt < self.config.max_attempts {
                self.link.delay(self.config.retry_delay);
            }
        }

        log::error!(
            "{}: configuration failed after {} attempts",
            self.address,
            self.config.max_attempts
        );
        Err(Error::RetryExhausted {
            address: self.address.clone(),
            attempts: self.config.max_attempts,
        })
    }

    /// WRITE then READ one full register-space image
    fn exchange(&mut self, image: &[u8]) -> LinkResult<Vec<u8>> {
        protocol::write_space(&mut self.link, 0, image, self.config.inter_chunk_delay)?;
        protocol::read_space(&mut self.link, 0, image.len(), self.config.inter_chunk_delay)
    }

    /// Whether the last verification pass recorded mismatches
    pub fn has_configuration_errors(&self) -> bool {
        self.tracker.has_errors()
    }

    /// The device's logical address
    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    /// Last-known verified register image of the device
    pub fn mirror(&self) -> &RegisterArraySnapshot {
        &self.mirror
    }

    /// The per-device configuration tracker
    pub fn tracker(&self) -> &ConfigurationTracker<u32> {
        &self.tracker
    }

    /// Borrow the owned transport
    pub fn link(&self) -> &T {
        &self.link
    }

    /// Mutably borrow the owned transport
    pub fn link_mut(&mut self) -> &mut T {
        &mut self.link
    }
}

// =============================================================================
// Streaming variant
// =============================================================================

/// Controller for a device on a point-to-point streaming channel
///
/// The whole register space moves as one logical blob; chunking, if any, is
/// internal to the transport. Additionally supports the link [`train`]
/// operation, which bypasses verification entirely.
///
/// [`train`]: StreamController::train
#[derive(Debug)]
pub struct StreamController<T: StreamTransport> {
    address: DeviceAddress,
    link: T,
    mirror: RegisterArraySnapshot,
    tracker: ConfigurationTracker<u32>,
    config: ControllerConfig,
}

impl<T: StreamTransport> StreamController<T> {
    /// Create a controller for one device (see [`BusController::new`])
    pub fn new(
        address: DeviceAddress,
        link: T,
        kind: &str,
        map: Arc<RegisterMap>,
        config: ControllerConfig,
    ) -> Result<Self> {
        let mirror = RegisterArraySnapshot::new(kind, map);
        let tracker = ConfigurationTracker::new(initial_values(&mirror)?);
        Ok(Self {
            address,
            link,
            mirror,
            tracker,
            config,
        })
    }

    /// Replace the mirror with a known device image (see
    /// [`BusController::seed_mirror`])
    pub fn seed_mirror(&mut self, bytes: &[u8]) -> Result<()> {
        self.mirror.deserialize(bytes)?;
        let map = Arc::clone(self.mirror.map());
        for name in map.writable_names() {
            let value = self.mirror.get(name)?;
            self.tracker.update(name, value);
        }
        Ok(())
    }

    /// Run the full configuration protocol for the given named values
    pub fn configure(&mut self, values: &BTreeMap<String, u32>) -> Result<()> {
        let mut target = self.mirror.clone();
        for (name, &value) in values {
            target.set(name, value)?;
        }
        self.tracker.update_all(values);
        if values.len() == self.tracker.len() && !self.tracker.check_full_write() {
            log::warn!(
                "{}: configuration mismatch: complete rewrite requested but some settings keep their initial values",
                self.address
            );
        }

        let image = target.serialize();
        let names: Vec<String> = self.tracker.keys().cloned().collect();
        let map = Arc::clone(self.mirror.map());

        for attempt in 1..=self.config.max_attempts {
            match self.exchange(&image) {
                Ok(readback) => {
                    verify_readback(
                        &self.address,
                        &mut self.tracker,
                        &map,
                        &names,
                        &readback,
                    );
                    if !self.tracker.has_errors() {
                        self.mirror = target.clone();
                        self.mirror.mark_active();
                        log::info!(
                            "{}: configuration verified on attempt {}/{}",
                            self.address,
                            attempt,
                            self.config.max_attempts
                        );
                        return Ok(());
                    }
                    log::warn!(
                        "{}: read-back mismatch on attempt {}/{}: {:?}",
                        self.address,
                        attempt,
                        self.config.max_attempts,
                        self.tracker.errors()
                    );
                }
                Err(err) => {
                    log::warn!(
                        "{}: link error on attempt {}/{}: {}",
                        self.address,
                        attempt,
                        self.config.max_attempts,
                        err
                    );
                }
            }
            if attempt < self.config.max_attempts {
                self.link.delay(self.config.retry_delay);
            }
        }

        log::error!(
            "{}: configuration failed after {} attempts",
            self.address,
            self.config.max_attempts
        );
        Err(Error::RetryExhausted {
            address: self.address.clone(),
            attempts: self.config.max_attempts,
        })
    }

    /// Run the link-training procedure
    ///
    /// Pushes the training configuration (the given sequence applied over the
    /// nominal mirror), holds for the configured settle time, then pushes the
    /// nominal configuration again. No read-back verification and no retry: a
    /// read-back during training is expected to look unconverged.
    pub fn train(&mut self, training: &Sequence) -> Result<()> {
        let mut pattern = self.mirror.clone();
        pattern.apply(training)?;

        self.link
            .write_blob(&pattern.serialize())
            .map_err(|source| Error::Link {
                address: self.address.clone(),
                source,
            })?;
        log::debug!(
            "{}: training pattern pushed, settling for {:?}",
            self.address,
            self.config.settle_time
        );
        self.link.delay(self.config.settle_time);
        self.link
            .write_blob(&self.mirror.serialize())
            .map_err(|source| Error::Link {
                address: self.address.clone(),
                source,
            })?;
        Ok(())
    }

    /// WRITE then READ one full register-space image
    fn exchange(&mut self, image: &[u8]) -> LinkResult<Vec<u8>> {
        self.link.write_blob(image)?;
        let readback = self.link.read_blob()?;
        if readback.len() != image.len() {
            return Err(LinkError::ShortTransfer {
                expected: image.len(),
                got: readback.len(),
            });
        }
        Ok(readback)
    }

    /// Whether the last verification pass recorded mismatches
    pub fn has_configuration_errors(&self) -> bool {
        self.tracker.has_errors()
    }

    /// The device's logical address
    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    /// Last-known verified register image of the device
    pub fn mirror(&self) -> &RegisterArraySnapshot {
        &self.mirror
    }

    /// The per-device configuration tracker
    pub fn tracker(&self) -> &ConfigurationTracker<u32> {
        &self.tracker
    }

    /// Borrow the owned transport
    pub fn link(&self) -> &T {
        &self.link
    }

    /// Mutably borrow the owned transport
    pub fn link_mut(&mut self) -> &mut T {
        &mut self.link
    }
}
