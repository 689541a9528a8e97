//! s5link: cyclic polling of a serial PLC with change detection
//!
//! This crate keeps a connection to a PLC alive through an external device
//! client, reads a configured variable table on a cycle, and publishes the
//! results. Consumers subscribe to whole cycles, to changed values, or to a
//! single variable, and can retune or trigger the cycle at runtime.
//!
//! The public API lives in [`api`]: build a [`Plc`] with [`PlcBuilder`],
//! then attach a [`ValueForwarder`] or drive it with a [`Controller`]. The
//! device layer is abstracted by [`protocol::DeviceClient`]; a
//! [`SimulatedClient`] is provided for demos and tests.

pub mod api;
#[doc(hidden)]
pub mod boot;
#[doc(hidden)]
pub mod cli;
pub mod core;
pub mod protocol;

pub use api::*;
pub use crate::core::{CycleSchedule, PlcError, PlcEvent, Snapshot, Status, ValueChange};
pub use crate::protocol::{simulated::SimulatedClient, PlcValue, Scalar, ValueMap};
