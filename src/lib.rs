//! Front-end chip configuration for detector readout chains
//!
//! This crate is the unified surface over the fecfg workspace. Run-control
//! integration should only interact with types re-exported here, never with
//! a transport implementation directly.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 run control / orchestration                  │
//! │  - owns the worker pool (one task per physical device)       │
//! │  - loads register map documents into a MapRegistry           │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     fecfg (this crate)                       │
//! │  - re-exports the fecfg-core API                             │
//! │  - feature-gates the device emulators (`dummy`)              │
//! └──────────────────────────────────────────────────────────────┘
//!                │                              │
//!                ▼                              ▼
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │       fecfg-core         │   │   transport implementations  │
//! │  - RegisterMap / codec   │   │  - remote-I/O sessions       │
//! │  - snapshots, tracker    │   │  - fecfg-dummy emulators     │
//! │  - Bus/StreamController  │   │    (BusTransport /           │
//! │                          │   │     StreamTransport impls)   │
//! └──────────────────────────┘   └──────────────────────────────┘
//! ```

pub use fecfg_core::codec;
pub use fecfg_core::controller::{
    BusController, ControllerConfig, StreamController, DEFAULT_MAX_ATTEMPTS,
};
pub use fecfg_core::link::{
    BusTransport, DeviceAddress, LinkError, LinkResult, StreamTransport,
};
pub use fecfg_core::map::{MapDef, MapRegistry, RegisterMap, Setting, SettingDef, SettingFlags};
pub use fecfg_core::protocol;
pub use fecfg_core::snapshot::{RegisterArraySnapshot, Sequence, SequenceOp, SequenceStep};
pub use fecfg_core::tracker::{ConfigWord, ConfigurationTracker};
pub use fecfg_core::{Error, Result};

/// In-memory device emulators (enabled by the `dummy` feature)
#[cfg(feature = "dummy")]
pub use fecfg_dummy as dummy;
