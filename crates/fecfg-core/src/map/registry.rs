//! Registry of register maps keyed by device kind
//!
//! The registry is loaded once at startup from RON documents and handed out
//! as `Arc<RegisterMap>` per device kind. The document format of external
//! configuration databases is out of scope; the `*Def` types here are the
//! serde-facing shape a loader deserializes into before validation.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{RegisterMap, Setting, SettingFlags};
use crate::error::{Error, Result};

/// Serde-facing layout of one setting (RON document shape)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingDef {
    /// Ordered register ids
    pub registers: Vec<u16>,
    /// Matching per-register bit shifts
    pub shifts: Vec<u8>,
    /// Total bit width
    pub size: u8,
    /// Setting can be read back but never written
    #[serde(default)]
    pub read_only: bool,
    /// Setting is stored in three identical register copies
    #[serde(default)]
    pub triplicated: bool,
}

impl From<SettingDef> for Setting {
    fn from(def: SettingDef) -> Self {
        let mut flags = SettingFlags::empty();
        if def.read_only {
            flags |= SettingFlags::READ_ONLY;
        }
        if def.triplicated {
            flags |= SettingFlags::TRIPLICATED;
        }
        Setting::with_flags(def.registers, def.shifts, def.size, flags)
    }
}

/// Serde-facing layout of one device family's register map
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapDef {
    /// Total number of registers in the family's register space
    pub space_len: u16,
    /// Settings by name
    pub settings: BTreeMap<String, SettingDef>,
}

impl TryFrom<MapDef> for RegisterMap {
    type Error = Error;

    fn try_from(def: MapDef) -> Result<Self> {
        RegisterMap::new(
            def.space_len,
            def.settings
                .into_iter()
                .map(|(name, s)| (name, Setting::from(s)))
                .collect(),
        )
    }
}

/// Immutable collection of register maps, one per device kind
///
/// The kind tag is a plain string supplied by the caller when a device is
/// opened; it selects which map variant applies.
#[derive(Debug, Clone, Default)]
pub struct MapRegistry {
    maps: BTreeMap<String, Arc<RegisterMap>>,
}

impl MapRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a RON document of the form `{ "kind": (space_len: .., settings: {..}) }`
    ///
    /// Every contained map is validated; the first invalid setting aborts the
    /// load with [`Error::InternalMapInconsistency`].
    pub fn from_ron_str(doc: &str) -> Result<Self> {
        let defs: BTreeMap<String, MapDef> =
            ron::from_str(doc).map_err(|e| Error::InternalMapInconsistency {
                reason: format!("register map document: {e}"),
            })?;
        let mut registry = Self::new();
        for (kind, def) in defs {
            registry.insert(kind, RegisterMap::try_from(def)?);
        }
        Ok(registry)
    }

    /// Register a map under a device kind
    pub fn insert(&mut self, kind: impl Into<String>, map: RegisterMap) {
        self.maps.insert(kind.into(), Arc::new(map));
    }

    /// Look up the map for a device kind
    pub fn get(&self, kind: &str) -> Option<Arc<RegisterMap>> {
        self.maps.get(kind).cloned()
    }

    /// Iterate over the registered device kinds
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.maps.keys().map(String::as_str)
    }

    /// Number of registered device kinds
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "fe-a": (
            space_len: 8,
            settings: {
                "mode": (registers: [0], shifts: [4], size: 2),
                "gain": (registers: [1, 2], shifts: [0, 0], size: 16),
                "id": (registers: [7], shifts: [0], size: 8, read_only: true),
            },
        ),
    }"#;

    #[test]
    fn test_load_ron_document() {
        let registry = MapRegistry::from_ron_str(DOC).unwrap();
        assert_eq!(registry.len(), 1);
        let map = registry.get("fe-a").unwrap();
        assert_eq!(map.space_len(), 8);
        assert_eq!(map.get("gain").unwrap().registers, vec![1, 2]);
        assert!(map
            .get("id")
            .unwrap()
            .flags
            .contains(SettingFlags::READ_ONLY));
        assert!(registry.get("fe-b").is_none());
    }

    #[test]
    fn test_load_rejects_invalid_layout() {
        // shift 7 + size 2 runs past the register edge
        let doc = r#"{
            "fe-a": (
                space_len: 8,
                settings: { "bad": (registers: [0], shifts: [7], size: 2) },
            ),
        }"#;
        let err = MapRegistry::from_ron_str(doc).unwrap_err();
        assert!(matches!(err, Error::InternalMapInconsistency { .. }));
    }

    #[test]
    fn test_load_rejects_malformed_document() {
        let err = MapRegistry::from_ron_str("not ron at all {{{").unwrap_err();
        assert!(matches!(err, Error::InternalMapInconsistency { .. }));
    }
}
