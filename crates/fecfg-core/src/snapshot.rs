//! In-memory register-space snapshots
//!
//! A [`RegisterArraySnapshot`] is a full copy of one device's writable
//! (plus read-only) register space, tagged with the device kind that selects
//! its register map. It is mutated only through named-setting operations and
//! replaced wholesale on [`deserialize`](RegisterArraySnapshot::deserialize),
//! which mirrors an on-chip read-back 1:1.
//!
//! Canned operation sequences (link-training start/stop, channel resets) are
//! expressed purely as ordered named-setting writes over a snapshot; see
//! [`Sequence`]. There is no separate mechanism.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::codec;
use crate::error::{Error, Result};
use crate::map::RegisterMap;

/// Full in-memory copy of one device's register space
#[derive(Debug, Clone)]
pub struct RegisterArraySnapshot {
    kind: String,
    map: Arc<RegisterMap>,
    registers: Vec<u8>,
    active: bool,
}

impl RegisterArraySnapshot {
    /// Create a zeroed, inactive snapshot for a device kind
    ///
    /// The snapshot length is fixed by the map's register space; it never
    /// changes afterwards.
    pub fn new(kind: impl Into<String>, map: Arc<RegisterMap>) -> Self {
        let registers = vec![0u8; usize::from(map.space_len())];
        Self {
            kind: kind.into(),
            map,
            registers,
            active: false,
        }
    }

    /// The device kind tag this snapshot belongs to
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The register map in effect for this snapshot
    pub fn map(&self) -> &Arc<RegisterMap> {
        &self.map
    }

    /// Whether this snapshot has ever been loaded from or confirmed on a
    /// device
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Mark the snapshot as loaded (called after a verified configuration)
    pub fn mark_active(&mut self) {
        self.active = true;
    }

    /// Number of registers in the space
    pub fn len(&self) -> usize {
        self.registers.len()
    }

    /// Whether the register space is empty
    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    /// One register byte, or `None` outside the space
    pub fn register(&self, register: u16) -> Option<u8> {
        self.registers.get(usize::from(register)).copied()
    }

    /// The raw register bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.registers
    }

    /// Set a named value
    ///
    /// Validates the value against the setting's declared width (rejecting
    /// with [`Error::Overflow`] before any mutation), then encodes with
    /// `self` as the hole-filling reference so re-setting one named value
    /// never clobbers unrelated co-located bits.
    pub fn set(&mut self, name: &str, value: u32) -> Result<()> {
        let values = BTreeMap::from([(name.to_owned(), value)]);
        let update = codec::convert_values_to_registers(&self.map, &values, self)?;
        for (register, byte) in update {
            self.registers[usize::from(register)] = byte;
        }
        Ok(())
    }

    /// Zero the entire covering register(s), then set
    ///
    /// Used when a setting's bit meaning changed and stale neighboring bits
    /// must not survive.
    pub fn reset(&mut self, name: &str, value: u32) -> Result<()> {
        for register in codec::regs_for_value(&self.map, name)? {
            self.registers[usize::from(register)] = 0;
        }
        self.set(name, value)
    }

    /// Read a named value back out of the snapshot bytes
    pub fn get(&self, name: &str) -> Result<u32> {
        let mut view = BTreeMap::new();
        for register in codec::regs_for_value(&self.map, name)? {
            view.insert(register, self.registers[usize::from(register)]);
        }
        let decoded = codec::convert_registers_to_values(&self.map, &view, &[name])?;
        Ok(decoded[name])
    }

    /// Flat byte image of the register space
    pub fn serialize(&self) -> Vec<u8> {
        self.registers.clone()
    }

    /// Replace the whole state from a flat byte image
    ///
    /// A 1:1 mirror of an on-chip read-back; also marks the snapshot active.
    pub fn deserialize(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.registers.len() {
            return Err(Error::SnapshotSize {
                expected: self.registers.len(),
                got: bytes.len(),
            });
        }
        self.registers.copy_from_slice(bytes);
        self.active = true;
        Ok(())
    }

    /// Register ids whose bytes differ between two snapshots
    pub fn diff(&self, other: &RegisterArraySnapshot) -> Result<Vec<u16>> {
        if other.registers.len() != self.registers.len() {
            return Err(Error::SnapshotSize {
                expected: self.registers.len(),
                got: other.registers.len(),
            });
        }
        Ok(self
            .registers
            .iter()
            .zip(&other.registers)
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .map(|(i, _)| i as u16)
            .collect())
    }

    /// Apply a canned sequence, step by step and in order
    pub fn apply(&mut self, sequence: &Sequence) -> Result<()> {
        for step in sequence.steps() {
            match step.op {
                SequenceOp::Set => self.set(&step.name, step.value)?,
                SequenceOp::Reset => self.reset(&step.name, step.value)?,
            }
        }
        Ok(())
    }
}

/// How one sequence step writes its setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceOp {
    /// Plain named-setting set (co-located bits preserved)
    Set,
    /// Zero the covering registers first, then set
    Reset,
}

/// One step of a canned operation sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceStep {
    /// Setting name
    pub name: String,
    /// Value to write
    pub value: u32,
    /// Set or reset
    pub op: SequenceOp,
}

/// An ordered list of named-setting writes
///
/// Canned operations like link-training start/stop or channel reset on/off
/// are plain sequences over the device family's setting names; device
/// families ship the sequences that apply to them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sequence {
    steps: Vec<SequenceStep>,
}

impl Sequence {
    /// Create an empty sequence
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a set step
    pub fn set(mut self, name: &str, value: u32) -> Self {
        self.steps.push(SequenceStep {
            name: name.to_owned(),
            value,
            op: SequenceOp::Set,
        });
        self
    }

    /// Append a reset step
    pub fn reset(mut self, name: &str, value: u32) -> Self {
        self.steps.push(SequenceStep {
            name: name.to_owned(),
            value,
            op: SequenceOp::Reset,
        });
        self
    }

    /// The steps in application order
    pub fn steps(&self) -> &[SequenceStep] {
        &self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{Setting, SettingFlags};

    fn test_map() -> Arc<RegisterMap> {
        let mut settings = BTreeMap::new();
        settings.insert("trim".to_owned(), Setting::new(vec![5], vec![0], 3));
        settings.insert("mode".to_owned(), Setting::new(vec![5], vec![3], 2));
        settings.insert("bias".to_owned(), Setting::new(vec![2, 3], vec![0, 0], 16));
        settings.insert(
            "id".to_owned(),
            Setting::with_flags(vec![7], vec![0], 8, SettingFlags::READ_ONLY),
        );
        Arc::new(RegisterMap::new(8, settings).unwrap())
    }

    #[test]
    fn test_set_then_get() {
        let mut snap = RegisterArraySnapshot::new("test-fe", test_map());
        snap.set("mode", 3).unwrap();
        snap.set("bias", 0x1234).unwrap();
        assert_eq!(snap.get("mode").unwrap(), 3);
        assert_eq!(snap.get("bias").unwrap(), 0x1234);
    }

    #[test]
    fn test_set_preserves_co_located_bits() {
        let mut snap = RegisterArraySnapshot::new("test-fe", test_map());
        snap.set("trim", 0b101).unwrap();
        snap.set("mode", 0b10).unwrap();
        assert_eq!(snap.get("trim").unwrap(), 0b101);
        assert_eq!(snap.register(5).unwrap(), 0b0001_0101);
    }

    #[test]
    fn test_reset_clears_stale_neighbors() {
        let mut snap = RegisterArraySnapshot::new("test-fe", test_map());
        snap.set("trim", 0b111).unwrap();
        snap.reset("mode", 1).unwrap();
        // The covering register was zeroed first, so trim did not survive.
        assert_eq!(snap.get("trim").unwrap(), 0);
        assert_eq!(snap.get("mode").unwrap(), 1);
    }

    #[test]
    fn test_overflow_leaves_state_untouched() {
        let mut snap = RegisterArraySnapshot::new("test-fe", test_map());
        snap.set("mode", 2).unwrap();
        let err = snap.set("mode", 4).unwrap_err();
        assert!(matches!(err, Error::Overflow { .. }));
        assert_eq!(snap.get("mode").unwrap(), 2);
    }

    #[test]
    fn test_deserialize_replaces_wholesale_and_activates() {
        let mut snap = RegisterArraySnapshot::new("test-fe", test_map());
        assert!(!snap.is_active());
        let image = vec![0xAA; 8];
        snap.deserialize(&image).unwrap();
        assert!(snap.is_active());
        assert_eq!(snap.as_bytes(), &image[..]);

        let err = snap.deserialize(&[0u8; 4]).unwrap_err();
        assert_eq!(
            err,
            Error::SnapshotSize {
                expected: 8,
                got: 4,
            }
        );
    }

    #[test]
    fn test_diff_reports_changed_registers() {
        let mut a = RegisterArraySnapshot::new("test-fe", test_map());
        let mut b = a.clone();
        b.set("mode", 1).unwrap();
        b.set("bias", 0x0100).unwrap();
        assert_eq!(a.diff(&b).unwrap(), vec![2, 5]);
        a.set("mode", 1).unwrap();
        assert_eq!(a.diff(&b).unwrap(), vec![2]);
    }

    #[test]
    fn test_sequence_order_is_observable() {
        // set-then-reset wipes the co-located trim; reset-then-set keeps it.
        let mut snap = RegisterArraySnapshot::new("test-fe", test_map());
        snap.apply(&Sequence::new().set("trim", 7).reset("mode", 0))
            .unwrap();
        assert_eq!(snap.register(5).unwrap(), 0);

        let mut snap = RegisterArraySnapshot::new("test-fe", test_map());
        snap.apply(&Sequence::new().reset("mode", 0).set("trim", 7))
            .unwrap();
        assert_eq!(snap.register(5).unwrap(), 0b111);
    }
}
