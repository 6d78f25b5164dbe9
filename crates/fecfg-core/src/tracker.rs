//! Per-device configuration tracking
//!
//! A [`ConfigurationTracker`] records what a device is *supposed* to hold:
//! the initial snapshot captured once at construction, the current intended
//! values as they change, and the set of settings whose last verified
//! read-back disagreed with the current snapshot.
//!
//! The tracker is generic over the device family's value width. The set of
//! kinds is closed and known at build time, so the width is a compile-time
//! parameter rather than runtime dispatch: [`ConfigWord`] is implemented for
//! exactly `u8`, `u32` and `u128`.

use core::fmt;
use std::collections::{BTreeMap, BTreeSet};

/// Value word of one device family's configuration
///
/// Closed set: 8-, 32- and 128-bit register families exist in the readout
/// chain and nothing else.
pub trait ConfigWord: Copy + Eq + Ord + fmt::Debug + fmt::Display + 'static {
    /// Width of the word in bits
    const BITS: u32;
}

impl ConfigWord for u8 {
    const BITS: u32 = 8;
}

impl ConfigWord for u32 {
    const BITS: u32 = 32;
}

impl ConfigWord for u128 {
    const BITS: u32 = 128;
}

/// Record of one device's intended configuration and verification state
#[derive(Debug, Clone)]
pub struct ConfigurationTracker<W: ConfigWord> {
    initial: BTreeMap<String, W>,
    current: BTreeMap<String, W>,
    errors: BTreeSet<String>,
}

impl<W: ConfigWord> ConfigurationTracker<W> {
    /// Create a tracker; `initial` is captured once and never changes
    pub fn new(initial: BTreeMap<String, W>) -> Self {
        let current = initial.clone();
        Self {
            initial,
            current,
            errors: BTreeSet::new(),
        }
    }

    /// Merge one intended value into the current snapshot
    pub fn update(&mut self, key: &str, value: W) {
        self.current.insert(key.to_owned(), value);
    }

    /// Merge a whole configuration into the current snapshot
    pub fn update_all(&mut self, config: &BTreeMap<String, W>) {
        for (key, &value) in config {
            self.current.insert(key.clone(), value);
        }
    }

    /// Compare a read-back value against the current snapshot
    ///
    /// A mismatch (or an unknown key) is recorded into the error set.
    /// Returns whether the value matched.
    pub fn validate(&mut self, key: &str, value: W) -> bool {
        match self.current.get(key) {
            Some(&expected) if expected == value => true,
            _ => {
                self.errors.insert(key.to_owned());
                false
            }
        }
    }

    /// Record a verification failure for a key directly
    ///
    /// Used when a read-back could not even be decoded for this setting.
    pub fn record_error(&mut self, key: &str) {
        self.errors.insert(key.to_owned());
    }

    /// Whether the current snapshot amounts to a complete replacement
    ///
    /// True only if *every* tracked key differs from the initial snapshot.
    /// Some resets are only valid as complete-replacement writes; a partial
    /// result is reported by callers as a non-fatal warning, not a failure.
    pub fn check_full_write(&self) -> bool {
        !self.current.is_empty()
            && self
                .current
                .iter()
                .all(|(key, value)| self.initial.get(key) != Some(value))
    }

    /// Settings whose last verified read-back disagreed
    pub fn errors(&self) -> &BTreeSet<String> {
        &self.errors
    }

    /// Whether any verification mismatch is currently recorded
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Empty the error set
    ///
    /// Called at the start of every verification pass so a later successful
    /// attempt is never polluted by an earlier attempt's stale mismatches.
    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    /// Iterate over the tracked setting names
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.current.keys()
    }

    /// The intended value currently on record for a key
    pub fn current(&self, key: &str) -> Option<W> {
        self.current.get(key).copied()
    }

    /// The value captured at construction for a key
    pub fn initial(&self, key: &str) -> Option<W> {
        self.initial.get(key).copied()
    }

    /// Number of tracked settings
    pub fn len(&self) -> usize {
        self.current.len()
    }

    /// Whether the tracker follows no settings
    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ConfigurationTracker<u32> {
        ConfigurationTracker::new(BTreeMap::from([
            ("r1".to_owned(), 0u32),
            ("r2".to_owned(), 0u32),
        ]))
    }

    #[test]
    fn test_update_and_validate() {
        let mut t = tracker();
        t.update("r1", 7);
        assert!(t.validate("r1", 7));
        assert!(!t.validate("r2", 1));
        assert_eq!(t.errors().len(), 1);
        assert!(t.errors().contains("r2"));
    }

    #[test]
    fn test_full_write_detection() {
        let mut t = tracker();
        // Nothing changed from the initial snapshot.
        assert!(!t.check_full_write());

        // Only r1 changed: still partial.
        t.update("r1", 1);
        assert!(!t.check_full_write());

        // Every key differs from its initial value.
        t.update("r2", 1);
        assert!(t.check_full_write());
    }

    #[test]
    fn test_clear_errors_between_attempts() {
        let mut t = tracker();
        t.update("r1", 1);
        assert!(!t.validate("r1", 0));
        assert!(t.has_errors());

        // A new verification pass starts clean.
        t.clear_errors();
        assert!(t.validate("r1", 1));
        assert!(!t.has_errors());
    }

    #[test]
    fn test_unknown_key_counts_as_mismatch() {
        let mut t = tracker();
        assert!(!t.validate("bogus", 0));
        assert!(t.errors().contains("bogus"));
    }

    #[test]
    fn test_wide_and_narrow_word_kinds() {
        let mut narrow: ConfigurationTracker<u8> =
            ConfigurationTracker::new(BTreeMap::from([("dac".to_owned(), 0u8)]));
        narrow.update("dac", 0x7F);
        assert!(narrow.validate("dac", 0x7F));

        let mut wide: ConfigurationTracker<u128> =
            ConfigurationTracker::new(BTreeMap::from([("row".to_owned(), 0u128)]));
        wide.update("row", 1u128 << 100);
        assert!(!wide.validate("row", 0));
        assert!(wide.check_full_write());
    }
}
