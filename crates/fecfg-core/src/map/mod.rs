//! Register map definitions
//!
//! A [`RegisterMap`] is the immutable, load-once table describing how a
//! device family's named settings are laid out over its byte-addressable
//! register space. Maps are validated when built and never change afterwards;
//! they are shared via `Arc` and passed explicitly to the codec; there is no
//! process-global map.

mod registry;

pub use registry::{MapDef, MapRegistry, SettingDef};

use std::collections::BTreeMap;

use bitflags::bitflags;

use crate::error::{Error, Result};

bitflags! {
    /// Per-setting attribute flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SettingFlags: u8 {
        /// The setting can be read back but never written
        const READ_ONLY = 1 << 0;
        /// The setting is stored in three identical register copies for
        /// fault tolerance; copies must agree on read-back
        const TRIPLICATED = 1 << 1;
    }
}

/// Layout of one named setting over the register space
///
/// `registers` and `shifts` are matching ordered lists: entry `i` of `shifts`
/// is the bit offset of the chunk stored in entry `i` of `registers`.
///
/// Supported shapes, enforced by [`RegisterMap::new`]:
/// - single register: `size` ≤ 8, `shift + size` ≤ 8;
/// - whole-byte multi-register span: every shift 0, `size == 8 * registers.len()`,
///   most significant chunk in `registers[0]`;
/// - triplicated: exactly three registers holding identical copies of a
///   value with `size` ≤ 8 and one common shift.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setting {
    /// Ordered register ids the setting occupies
    pub registers: Vec<u16>,
    /// Matching per-register bit shifts
    pub shifts: Vec<u8>,
    /// Total bit width (≤ 32)
    pub size: u8,
    /// Attribute flags
    pub flags: SettingFlags,
}

impl Setting {
    /// Create a setting with no flags
    pub fn new(registers: Vec<u16>, shifts: Vec<u8>, size: u8) -> Self {
        Self::with_flags(registers, shifts, size, SettingFlags::empty())
    }

    /// Create a setting with the given flags
    pub fn with_flags(registers: Vec<u16>, shifts: Vec<u8>, size: u8, flags: SettingFlags) -> Self {
        Self {
            registers,
            shifts,
            size,
            flags,
        }
    }

    /// Check the declared layout against the supported shapes.
    ///
    /// Violations are build-time data errors and fail fast with
    /// [`Error::InternalMapInconsistency`].
    fn validate(&self, name: &str, space_len: u16) -> Result<()> {
        if self.registers.is_empty() {
            return Err(Error::InternalMapInconsistency {
                reason: format!("setting `{name}` lists no registers"),
            });
        }
        if self.registers.len() != self.shifts.len() {
            return Err(Error::InternalMapInconsistency {
                reason: format!(
                    "setting `{name}` has {} registers but {} shifts",
                    self.registers.len(),
                    self.shifts.len()
                ),
            });
        }
        if self.size == 0 || self.size > 32 {
            return Err(Error::InternalMapInconsistency {
                reason: format!("setting `{name}` declares unsupported width {}", self.size),
            });
        }
        if let Some(&register) = self.registers.iter().find(|r| **r >= space_len) {
            return Err(Error::InternalMapInconsistency {
                reason: format!(
                    "setting `{name}` uses register {register:#06x} beyond the {space_len}-register space"
                ),
            });
        }
        let mut sorted = self.registers.clone();
        sorted.sort_unstable();
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            return Err(Error::InternalMapInconsistency {
                reason: format!("setting `{name}` lists a register twice"),
            });
        }

        if self.flags.contains(SettingFlags::TRIPLICATED) {
            if self.registers.len() != 3 {
                return Err(Error::InternalMapInconsistency {
                    reason: format!(
                        "triplicated setting `{name}` must list exactly 3 registers, not {}",
                        self.registers.len()
                    ),
                });
            }
            if self.size > 8 {
                return Err(Error::InternalMapInconsistency {
                    reason: format!(
                        "triplicated setting `{name}` must fit one register ({} bits declared)",
                        self.size
                    ),
                });
            }
            if self.shifts.iter().any(|&s| s != self.shifts[0]) {
                return Err(Error::InternalMapInconsistency {
                    reason: format!("triplicated setting `{name}` must use one common shift"),
                });
            }
            if u16::from(self.shifts[0]) + u16::from(self.size) > 8 {
                return Err(Error::InternalMapInconsistency {
                    reason: format!("setting `{name}` does not fit its register at its shift"),
                });
            }
        } else if self.registers.len() > 1 {
            // Wide values are only supported as whole-byte-aligned spans.
            if self.shifts.iter().any(|&s| s != 0) {
                return Err(Error::InternalMapInconsistency {
                    reason: format!("multi-register setting `{name}` must use shift 0 throughout"),
                });
            }
            if usize::from(self.size) != 8 * self.registers.len() {
                return Err(Error::InternalMapInconsistency {
                    reason: format!(
                        "multi-register setting `{name}` must span whole registers ({} bits over {} registers)",
                        self.size,
                        self.registers.len()
                    ),
                });
            }
        } else {
            if self.size > 8 {
                return Err(Error::InternalMapInconsistency {
                    reason: format!(
                        "setting `{name}` is {} bits wide but lists a single register",
                        self.size
                    ),
                });
            }
            if u16::from(self.shifts[0]) + u16::from(self.size) > 8 {
                return Err(Error::InternalMapInconsistency {
                    reason: format!("setting `{name}` does not fit its register at its shift"),
                });
            }
        }
        Ok(())
    }
}

/// Immutable table mapping setting names to their register layout
///
/// Built once at startup (usually through a [`MapRegistry`]) and shared
/// read-only for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterMap {
    space_len: u16,
    settings: BTreeMap<String, Setting>,
}

impl RegisterMap {
    /// Build a map from validated settings
    ///
    /// Fails with [`Error::InternalMapInconsistency`] on the first setting
    /// whose layout violates the supported shapes or falls outside the
    /// `space_len`-register space.
    pub fn new(space_len: u16, settings: BTreeMap<String, Setting>) -> Result<Self> {
        for (name, setting) in &settings {
            setting.validate(name, space_len)?;
        }
        Ok(Self {
            space_len,
            settings,
        })
    }

    /// Look up one setting by name
    pub fn get(&self, name: &str) -> Option<&Setting> {
        self.settings.get(name)
    }

    /// Total number of registers in the device family's register space
    pub fn space_len(&self) -> u16 {
        self.space_len
    }

    /// Iterate over all setting names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.settings.keys().map(String::as_str)
    }

    /// Iterate over the names of settings that can be written
    pub fn writable_names(&self) -> impl Iterator<Item = &str> {
        self.settings
            .iter()
            .filter(|(_, s)| !s.flags.contains(SettingFlags::READ_ONLY))
            .map(|(n, _)| n.as_str())
    }

    /// Iterate over all settings
    pub fn settings(&self) -> impl Iterator<Item = (&str, &Setting)> {
        self.settings.iter().map(|(n, s)| (n.as_str(), s))
    }

    /// Number of settings in the map
    pub fn len(&self) -> usize {
        self.settings.len()
    }

    /// Whether the map holds no settings
    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(settings: Vec<(&str, Setting)>) -> Result<RegisterMap> {
        RegisterMap::new(
            16,
            settings
                .into_iter()
                .map(|(n, s)| (n.to_owned(), s))
                .collect(),
        )
    }

    #[test]
    fn test_valid_shapes() {
        let map = build(vec![
            ("narrow", Setting::new(vec![0], vec![2], 3)),
            ("wide", Setting::new(vec![1, 2], vec![0, 0], 16)),
            (
                "redundant",
                Setting::with_flags(vec![3, 4, 5], vec![1, 1, 1], 4, SettingFlags::TRIPLICATED),
            ),
        ])
        .unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.get("wide").unwrap().size, 16);
    }

    #[test]
    fn test_rejects_shift_size_past_register_edge() {
        let err = build(vec![("bad", Setting::new(vec![0], vec![6], 3))]).unwrap_err();
        assert!(matches!(err, Error::InternalMapInconsistency { .. }));
    }

    #[test]
    fn test_rejects_multi_register_with_shift() {
        let err = build(vec![("bad", Setting::new(vec![0, 1], vec![0, 2], 16))]).unwrap_err();
        assert!(matches!(err, Error::InternalMapInconsistency { .. }));
    }

    #[test]
    fn test_rejects_partial_byte_span() {
        // 12 bits over two registers is not a whole-byte-aligned span
        let err = build(vec![("bad", Setting::new(vec![0, 1], vec![0, 0], 12))]).unwrap_err();
        assert!(matches!(err, Error::InternalMapInconsistency { .. }));
    }

    #[test]
    fn test_rejects_register_beyond_space() {
        let err = build(vec![("bad", Setting::new(vec![16], vec![0], 8))]).unwrap_err();
        assert!(matches!(err, Error::InternalMapInconsistency { .. }));
    }

    #[test]
    fn test_rejects_triplication_with_wrong_copy_count() {
        let err = build(vec![(
            "bad",
            Setting::with_flags(vec![0, 1], vec![0, 0], 4, SettingFlags::TRIPLICATED),
        )])
        .unwrap_err();
        assert!(matches!(err, Error::InternalMapInconsistency { .. }));
    }

    #[test]
    fn test_writable_names_skip_read_only() {
        let map = build(vec![
            ("id", Setting::with_flags(vec![0], vec![0], 8, SettingFlags::READ_ONLY)),
            ("mode", Setting::new(vec![1], vec![0], 2)),
        ])
        .unwrap();
        let writable: Vec<&str> = map.writable_names().collect();
        assert_eq!(writable, vec!["mode"]);
    }
}
