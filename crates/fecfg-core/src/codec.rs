//! Named-value codec
//!
//! Pure conversion between flat `name -> u32` maps and `register id -> byte`
//! maps, driven by a [`RegisterMap`].
//!
//! Encoding splits a value into up to `ceil(size / 8)` byte chunks (the most
//! significant chunk lands in the lowest-offset register of the span), shifts
//! and masks each chunk into register position, merges the contributions per
//! register, and finally superimposes the bits not covered by any written
//! setting from a reference snapshot. That hole-filling step is what lets a
//! partial write leave unrelated co-located bits untouched instead of zeroing
//! them.
//!
//! Decoding reverses the process and additionally cross-checks triplicated
//! settings: copies that disagree flag a hardware or link fault and are never
//! silently resolved.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::map::{RegisterMap, Setting, SettingFlags};
use crate::snapshot::RegisterArraySnapshot;

/// A partial contribution to one register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterValue {
    /// Bit values, already shifted into register position
    pub value: u8,
    /// Which bits of `value` are meaningful
    pub mask: u8,
}

fn value_mask(size: u8) -> u8 {
    ((1u16 << size) - 1) as u8
}

/// Split one setting's value into per-register contributions.
fn split_setting(name: &str, setting: &Setting, value: u32) -> Result<Vec<(u16, RegisterValue)>> {
    if setting.size < 32 && u64::from(value) >= 1u64 << setting.size {
        return Err(Error::Overflow {
            name: name.to_owned(),
            value,
            size: setting.size,
        });
    }

    let mut parts = Vec::with_capacity(setting.registers.len());
    if setting.flags.contains(SettingFlags::TRIPLICATED) {
        let mask = value_mask(setting.size);
        for (&register, &shift) in setting.registers.iter().zip(&setting.shifts) {
            parts.push((
                register,
                RegisterValue {
                    value: (value as u8) << shift,
                    mask: mask << shift,
                },
            ));
        }
    } else if setting.registers.len() > 1 {
        let chunks = setting.registers.len();
        for (i, &register) in setting.registers.iter().enumerate() {
            parts.push((
                register,
                RegisterValue {
                    value: (value >> (8 * (chunks - 1 - i))) as u8,
                    mask: 0xFF,
                },
            ));
        }
    } else {
        let shift = setting.shifts[0];
        let mask = if setting.size == 8 {
            0xFF
        } else {
            value_mask(setting.size)
        };
        parts.push((
            setting.registers[0],
            RegisterValue {
                value: (value as u8) << shift,
                mask: mask << shift,
            },
        ));
    }
    Ok(parts)
}

/// Convert named values into a complete, ready-to-write register map.
///
/// Bits of a touched register that no setting in `values` covers are filled
/// from `reference`, never zeroed. Two settings contributing overlapping mask
/// bits to the same register is a logic inconsistency in the map data and
/// fails with [`Error::InternalMapInconsistency`] rather than silently OR-ing.
pub fn convert_values_to_registers(
    map: &RegisterMap,
    values: &BTreeMap<String, u32>,
    reference: &RegisterArraySnapshot,
) -> Result<BTreeMap<u16, u8>> {
    let mut parts: BTreeMap<u16, RegisterValue> = BTreeMap::new();
    for (name, &value) in values {
        let setting = map.get(name).ok_or_else(|| Error::UnknownSetting {
            name: name.clone(),
        })?;
        if setting.flags.contains(SettingFlags::READ_ONLY) {
            return Err(Error::ReadOnlySetting { name: name.clone() });
        }
        for (register, part) in split_setting(name, setting, value)? {
            let merged = parts.entry(register).or_default();
            if merged.mask & part.mask != 0 {
                return Err(Error::InternalMapInconsistency {
                    reason: format!(
                        "setting `{name}` overlaps bits {:#04x} already claimed in register {register:#06x}",
                        merged.mask & part.mask
                    ),
                });
            }
            merged.value |= part.value;
            merged.mask |= part.mask;
        }
    }

    let mut registers = BTreeMap::new();
    for (register, part) in parts {
        let byte = if part.mask == 0xFF {
            part.value
        } else {
            let hole = reference.register(register).ok_or_else(|| {
                Error::InternalMapInconsistency {
                    reason: format!(
                        "register {register:#06x} is outside the {}-byte reference snapshot",
                        reference.len()
                    ),
                }
            })?;
            part.value | (hole & !part.mask)
        };
        registers.insert(register, byte);
    }
    Ok(registers)
}

/// Convert a register read-back into named values for the given settings.
///
/// Fails with [`Error::MissingRegister`] if any backing register is absent;
/// no partial result is returned. Multi-register values are reassembled most
/// significant chunk first; triplicated copies must agree or the decode fails
/// with [`Error::InconsistentRedundantCopies`].
pub fn convert_registers_to_values(
    map: &RegisterMap,
    registers: &BTreeMap<u16, u8>,
    names: &[&str],
) -> Result<BTreeMap<String, u32>> {
    let mut values = BTreeMap::new();
    for &name in names {
        let setting = map.get(name).ok_or_else(|| Error::UnknownSetting {
            name: name.to_owned(),
        })?;
        let fetch = |register: u16| -> Result<u8> {
            registers
                .get(&register)
                .copied()
                .ok_or_else(|| Error::MissingRegister {
                    name: name.to_owned(),
                    register,
                })
        };

        let value = if setting.flags.contains(SettingFlags::TRIPLICATED) {
            let mask = value_mask(setting.size);
            let mut copies = [0u8; 3];
            for (i, (&register, &shift)) in
                setting.registers.iter().zip(&setting.shifts).enumerate()
            {
                copies[i] = (fetch(register)? >> shift) & mask;
            }
            if copies[0] != copies[1] || copies[1] != copies[2] {
                return Err(Error::InconsistentRedundantCopies {
                    name: name.to_owned(),
                    copies,
                });
            }
            u32::from(copies[0])
        } else if setting.registers.len() > 1 {
            let mut acc = 0u32;
            for &register in &setting.registers {
                acc = (acc << 8) | u32::from(fetch(register)?);
            }
            acc
        } else {
            let mask = if setting.size == 8 {
                0xFF
            } else {
                value_mask(setting.size)
            };
            u32::from((fetch(setting.registers[0])? >> setting.shifts[0]) & mask)
        };
        values.insert(name.to_owned(), value);
    }
    Ok(values)
}

/// Registers backing one named setting, in layout order.
pub fn regs_for_value(map: &RegisterMap, name: &str) -> Result<Vec<u16>> {
    map.get(name)
        .map(|s| s.registers.clone())
        .ok_or_else(|| Error::UnknownSetting {
            name: name.to_owned(),
        })
}

/// Sorted, deduplicated union of the registers backing several settings.
///
/// Used to know which registers must be read before a named round trip.
pub fn regs_for_values(map: &RegisterMap, names: &[&str]) -> Result<Vec<u16>> {
    let mut regs = Vec::new();
    for &name in names {
        regs.extend(regs_for_value(map, name)?);
    }
    regs.sort_unstable();
    regs.dedup();
    Ok(regs)
}
