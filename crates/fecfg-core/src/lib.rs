//! fecfg-core - Core library for front-end chip configuration
//!
//! This crate translates human-meaningful named settings into exact register
//! bytes for the front-end chips of a detector readout chain, and pushes
//! those bytes over constrained chip-control links with read-back
//! verification and bounded retry.
//!
//! The two central pieces are the register codec ([`codec`], driven by
//! [`map::RegisterMap`]) and the per-device configuration protocol
//! ([`controller`], over the transport contracts in [`link`]).
//!
//! # Example
//!
//! ```ignore
//! use std::collections::BTreeMap;
//! use fecfg_core::controller::{BusController, ControllerConfig};
//! use fecfg_core::link::DeviceAddress;
//! use fecfg_core::map::MapRegistry;
//!
//! fn configure_one(registry: &MapRegistry, link: impl fecfg_core::link::BusTransport) {
//!     let map = registry.get("demo-fe").expect("kind registered");
//!     let mut ctrl = BusController::new(
//!         DeviceAddress::new("bus-0", 0x20),
//!         link,
//!         "demo-fe",
//!         map,
//!         ControllerConfig::default(),
//!     )
//!     .unwrap();
//!     match ctrl.configure(&BTreeMap::from([("mode".to_owned(), 2u32)])) {
//!         Ok(()) => println!("configured"),
//!         Err(e) => println!("failed: {e}"),
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod codec;
pub mod controller;
pub mod error;
pub mod link;
pub mod map;
pub mod protocol;
pub mod snapshot;
pub mod tracker;

pub use error::{Error, Result};
