//! fecfg-dummy - In-memory front-end device emulators for testing
//!
//! This crate provides emulated devices for both chip-control link variants:
//! an addressed-bus device and a streaming device. Both keep their register
//! space in memory, record every operation for assertions, and offer fault
//! injection (ignored write passes, stuck read-back bits) to exercise the
//! configuration protocol's retry path without real hardware.
//!
//! A small demonstration device family (kind [`DEMO_KIND`]) ships with the
//! crate, along with the canned link-training and channel-reset sequences
//! that apply to it.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;

use fecfg_core::link::{BusTransport, LinkError, LinkResult, StreamTransport};
use fecfg_core::map::{MapRegistry, RegisterMap};
use fecfg_core::snapshot::Sequence;

/// Kind tag of the bundled demonstration device family
pub const DEMO_KIND: &str = "demo-fe";

const DEMO_MAPS: &str = include_str!("demo-fe.ron");

static DEMO_REGISTRY: Lazy<MapRegistry> =
    Lazy::new(|| MapRegistry::from_ron_str(DEMO_MAPS).expect("builtin demo register map is valid"));

/// The registry holding the bundled demonstration register maps
pub fn demo_registry() -> &'static MapRegistry {
    &DEMO_REGISTRY
}

/// The demonstration family's register map
pub fn demo_map() -> Arc<RegisterMap> {
    DEMO_REGISTRY
        .get(DEMO_KIND)
        .expect("demo kind is registered")
}

/// Canned sequence: enter link training (reset held, training pattern on)
pub fn link_training_start() -> Sequence {
    Sequence::new().set("reset", 1).set("train_en", 1)
}

/// Canned sequence: leave link training
pub fn link_training_stop() -> Sequence {
    Sequence::new().set("train_en", 0).set("reset", 0)
}

/// Canned sequence: park the channel in reset
pub fn channel_reset_on() -> Sequence {
    Sequence::new().set("ch_enable", 0).set("reset", 1)
}

/// Canned sequence: release the channel from reset
pub fn channel_reset_off() -> Sequence {
    Sequence::new().set("reset", 0).set("ch_enable", 1)
}

/// Configuration for a dummy bus device
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Number of registers in the emulated register space
    pub register_count: u16,
    /// Payload cap per frame on the emulated link
    pub max_frame_len: usize,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            register_count: 32,
            max_frame_len: 8,
        }
    }
}

/// In-memory device on an addressed multi-drop bus
///
/// Fault injection:
/// - [`ignore_write_passes`](Self::ignore_write_passes): the next N full
///   write passes are accepted on the wire but not applied, as if the chip
///   dropped them;
/// - [`set_stuck_bits`](Self::set_stuck_bits): the given bits of a register
///   read back as 1 regardless of what was written, like a stuck hardware
///   fault.
#[derive(Debug)]
pub struct DummyBusDevice {
    config: DummyConfig,
    registers: Vec<u8>,
    stuck_or: Vec<(u16, u8)>,
    ignore_passes: u32,
    ignoring_current_pass: bool,
    writes: Vec<(u16, Vec<u8>)>,
    reads: Vec<(u16, usize)>,
    delays: Vec<Duration>,
}

impl DummyBusDevice {
    /// Create a device with the given configuration, registers zeroed
    pub fn new(config: DummyConfig) -> Self {
        let registers = vec![0u8; usize::from(config.register_count)];
        Self {
            config,
            registers,
            stuck_or: Vec::new(),
            ignore_passes: 0,
            ignoring_current_pass: false,
            writes: Vec::new(),
            reads: Vec::new(),
            delays: Vec::new(),
        }
    }

    /// Create a device with the default configuration (matches the demo
    /// family's register space)
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// The emulated register file
    pub fn registers(&self) -> &[u8] {
        &self.registers
    }

    /// Mutable access to the emulated register file
    pub fn registers_mut(&mut self) -> &mut [u8] {
        &mut self.registers
    }

    /// Force the given bits of a register to read back as 1
    pub fn set_stuck_bits(&mut self, register: u16, mask: u8) {
        self.stuck_or.push((register, mask));
    }

    /// Silently drop the next `passes` full write passes
    ///
    /// A pass starts with a frame addressed at register 0.
    pub fn ignore_write_passes(&mut self, passes: u32) {
        self.ignore_passes = passes;
    }

    /// Every write frame seen, in order: (start register, payload)
    pub fn write_log(&self) -> &[(u16, Vec<u8>)] {
        &self.writes
    }

    /// Every read frame seen, in order: (start register, count)
    pub fn read_log(&self) -> &[(u16, usize)] {
        &self.reads
    }

    /// Every delay requested by the protocol
    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    /// Number of full write passes seen (frames addressed at register 0)
    pub fn write_passes(&self) -> usize {
        self.writes.iter().filter(|(start, _)| *start == 0).count()
    }
}

impl BusTransport for DummyBusDevice {
    fn write_frame(&mut self, start_register: u16, bytes: &[u8]) -> LinkResult<()> {
        let start = usize::from(start_register);
        let end = start + bytes.len();
        if end > self.registers.len() {
            return Err(LinkError::Nack {
                register: start_register,
            });
        }
        if start_register == 0 {
            self.ignoring_current_pass = self.ignore_passes > 0;
            if self.ignoring_current_pass {
                self.ignore_passes -= 1;
                log::trace!("dummy bus: dropping write pass");
            }
        }
        self.writes.push((start_register, bytes.to_vec()));
        if !self.ignoring_current_pass {
            self.registers[start..end].copy_from_slice(bytes);
        }
        Ok(())
    }

    fn read_frame(&mut self, start_register: u16, count: usize) -> LinkResult<Vec<u8>> {
        let start = usize::from(start_register);
        let end = start + count;
        if end > self.registers.len() {
            return Err(LinkError::Nack {
                register: start_register,
            });
        }
        self.reads.push((start_register, count));
        let mut out = self.registers[start..end].to_vec();
        for &(register, mask) in &self.stuck_or {
            let r = usize::from(register);
            if (start..end).contains(&r) {
                out[r - start] |= mask;
            }
        }
        Ok(out)
    }

    fn max_frame_len(&self) -> usize {
        self.config.max_frame_len
    }

    fn delay(&mut self, duration: Duration) {
        // No real waiting in the emulator; record the request instead.
        self.delays.push(duration);
    }
}

/// In-memory device on a point-to-point streaming channel
///
/// Carries the same fault injection knobs as [`DummyBusDevice`], applied per
/// blob instead of per frame.
#[derive(Debug)]
pub struct DummyStreamDevice {
    registers: Vec<u8>,
    stuck_or: Vec<(u16, u8)>,
    ignore_passes: u32,
    blobs: Vec<Vec<u8>>,
    reads: usize,
    delays: Vec<Duration>,
}

impl DummyStreamDevice {
    /// Create a device with `register_count` zeroed registers
    pub fn new(register_count: u16) -> Self {
        Self {
            registers: vec![0u8; usize::from(register_count)],
            stuck_or: Vec::new(),
            ignore_passes: 0,
            blobs: Vec::new(),
            reads: 0,
            delays: Vec::new(),
        }
    }

    /// Create a device sized for the demo family's register space
    pub fn new_default() -> Self {
        Self::new(32)
    }

    /// The emulated register file
    pub fn registers(&self) -> &[u8] {
        &self.registers
    }

    /// Mutable access to the emulated register file
    pub fn registers_mut(&mut self) -> &mut [u8] {
        &mut self.registers
    }

    /// Force the given bits of a register to read back as 1
    pub fn set_stuck_bits(&mut self, register: u16, mask: u8) {
        self.stuck_or.push((register, mask));
    }

    /// Silently drop the next `passes` blob writes
    pub fn ignore_write_passes(&mut self, passes: u32) {
        self.ignore_passes = passes;
    }

    /// Every blob pushed to the device, in order
    pub fn blobs(&self) -> &[Vec<u8>] {
        &self.blobs
    }

    /// Number of blob read-backs served
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Every delay requested by the protocol
    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

impl StreamTransport for DummyStreamDevice {
    fn write_blob(&mut self, bytes: &[u8]) -> LinkResult<()> {
        if bytes.len() != self.registers.len() {
            return Err(LinkError::ShortTransfer {
                expected: self.registers.len(),
                got: bytes.len(),
            });
        }
        self.blobs.push(bytes.to_vec());
        if self.ignore_passes > 0 {
            self.ignore_passes -= 1;
            log::trace!("dummy stream: dropping blob write");
            return Ok(());
        }
        self.registers.copy_from_slice(bytes);
        Ok(())
    }

    fn read_blob(&mut self) -> LinkResult<Vec<u8>> {
        self.reads += 1;
        let mut out = self.registers.clone();
        for &(register, mask) in &self.stuck_or {
            out[usize::from(register)] |= mask;
        }
        Ok(out)
    }

    fn delay(&mut self, duration: Duration) {
        self.delays.push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use fecfg_core::controller::{
        BusController, ControllerConfig, StreamController, DEFAULT_MAX_ATTEMPTS,
    };
    use fecfg_core::link::DeviceAddress;
    use fecfg_core::Error;

    fn values(pairs: &[(&str, u32)]) -> BTreeMap<String, u32> {
        pairs.iter().map(|&(n, v)| (n.to_owned(), v)).collect()
    }

    fn bus_controller(device: DummyBusDevice) -> BusController<DummyBusDevice> {
        BusController::new(
            DeviceAddress::new("dummy-bus", 0x20),
            device,
            DEMO_KIND,
            demo_map(),
            ControllerConfig::default(),
        )
        .unwrap()
    }

    fn stream_controller(device: DummyStreamDevice) -> StreamController<DummyStreamDevice> {
        StreamController::new(
            DeviceAddress::new("dummy-stream", 0),
            device,
            DEMO_KIND,
            demo_map(),
            ControllerConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_demo_registry_contents() {
        let registry = demo_registry();
        assert_eq!(registry.kinds().collect::<Vec<_>>(), vec![DEMO_KIND]);
        let map = demo_map();
        assert_eq!(map.space_len(), 32);
        assert!(map.get("chip_id").is_some());
        let writable: Vec<&str> = map.writable_names().collect();
        assert!(!writable.contains(&"chip_id"));
    }

    #[test]
    fn test_configure_demo_device_over_bus() {
        let mut ctrl = bus_controller(DummyBusDevice::new_default());
        ctrl.configure(&values(&[
            ("mode", 2),
            ("trim", 5),
            ("bias_dac", 0xABCD),
            ("lock_threshold", 0x5A),
        ]))
        .unwrap();

        let device = ctrl.link();
        assert_eq!(device.registers()[5], (2 << 3) | 5);
        assert_eq!(device.registers()[2], 0xAB);
        assert_eq!(device.registers()[3], 0xCD);
        assert_eq!(&device.registers()[8..=10], &[0x5A, 0x5A, 0x5A]);
        assert_eq!(device.write_passes(), 1);
        // 32 registers over 8-byte frames: 4 write frames, 4 read frames.
        assert_eq!(device.write_log().len(), 4);
        assert_eq!(device.read_log().len(), 4);
        assert!(ctrl.mirror().is_active());
    }

    #[test]
    fn test_seeded_reference_preserves_unmapped_bits() {
        // Reference register 5 = 0b1010_0000; configuring mode = 2 must
        // yield 0b1011_0000 on the device (bit 7 is nobody's setting and
        // bit 5 belongs to "enable"; both survive through hole-filling).
        let mut device = DummyBusDevice::new_default();
        device.registers_mut()[5] = 0b1010_0000;
        let image = device.registers().to_vec();

        let mut ctrl = bus_controller(device);
        ctrl.seed_mirror(&image).unwrap();
        ctrl.configure(&values(&[("mode", 2)])).unwrap();
        assert_eq!(ctrl.link().registers()[5], 0b1011_0000);
    }

    #[test]
    fn test_dropped_writes_exercise_retry() {
        let mut device = DummyBusDevice::new_default();
        device.ignore_write_passes(2);
        let mut ctrl = bus_controller(device);
        ctrl.configure(&values(&[("mode", 2), ("trim", 1)])).unwrap();
        assert_eq!(ctrl.link().write_passes(), 3);
        assert!(!ctrl.has_configuration_errors());
    }

    #[test]
    fn test_stuck_bit_exhausts_retries() {
        let mut device = DummyBusDevice::new_default();
        // Bit 3 of register 5 is inside the "mode" field.
        device.set_stuck_bits(5, 0b0000_1000);
        let mut ctrl = bus_controller(device);
        let err = ctrl.configure(&values(&[("mode", 2)])).unwrap_err();
        assert_eq!(
            err,
            Error::RetryExhausted {
                address: DeviceAddress::new("dummy-bus", 0x20),
                attempts: DEFAULT_MAX_ATTEMPTS,
            }
        );
        assert_eq!(ctrl.link().write_passes(), 3);
        assert!(ctrl.tracker().errors().contains("mode"));
    }

    #[test]
    fn test_disagreeing_triplicated_copies_are_never_accepted() {
        let mut device = DummyBusDevice::new_default();
        // One stuck copy makes the three lock_threshold registers disagree.
        device.set_stuck_bits(9, 0x01);
        let mut ctrl = bus_controller(device);
        let err = ctrl
            .configure(&values(&[("lock_threshold", 0x20)]))
            .unwrap_err();
        assert!(matches!(err, Error::RetryExhausted { .. }));
        assert!(ctrl.tracker().errors().contains("lock_threshold"));
    }

    #[test]
    fn test_stream_configure_and_retry() {
        let mut device = DummyStreamDevice::new_default();
        device.ignore_write_passes(1);
        let mut ctrl = stream_controller(device);
        ctrl.configure(&values(&[("bias_dac", 0x0102)])).unwrap();
        assert_eq!(ctrl.link().blobs().len(), 2);
        assert_eq!(ctrl.link().registers()[2], 0x01);
        assert_eq!(ctrl.link().registers()[3], 0x02);
    }

    #[test]
    fn test_stream_train_holds_and_restores() {
        let mut ctrl = stream_controller(DummyStreamDevice::new_default());
        ctrl.train(&link_training_start()).unwrap();

        let device = ctrl.link();
        // Training pattern, then the nominal image again; never a read-back.
        assert_eq!(device.blobs().len(), 2);
        assert_eq!(device.blobs()[0][1], 0b11);
        assert_eq!(device.blobs()[1], vec![0u8; 32]);
        assert_eq!(device.reads(), 0);
        assert_eq!(
            device.delays(),
            &[ControllerConfig::default().settle_time]
        );
    }

    #[test]
    fn test_canned_sequences_toggle_channel_bits() {
        let mut snap =
            fecfg_core::snapshot::RegisterArraySnapshot::new(DEMO_KIND, demo_map());
        snap.apply(&channel_reset_on()).unwrap();
        assert_eq!(snap.get("reset").unwrap(), 1);
        assert_eq!(snap.get("ch_enable").unwrap(), 0);
        snap.apply(&channel_reset_off()).unwrap();
        assert_eq!(snap.get("reset").unwrap(), 0);
        assert_eq!(snap.get("ch_enable").unwrap(), 1);
    }

    #[test]
    fn test_frame_past_register_space_is_nacked() {
        let mut device = DummyBusDevice::new(DummyConfig {
            register_count: 4,
            max_frame_len: 8,
        });
        let err = device.write_frame(2, &[0u8; 4]).unwrap_err();
        assert_eq!(err, LinkError::Nack { register: 2 });
    }
}
