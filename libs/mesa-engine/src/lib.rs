//! mesa-engine: MESA-ESS function reassembly for a DNP3 outstation
//!
//! The master sends a MESA-ESS function as an ordered sequence of DNP3
//! point writes. This crate reassembles those writes: each one is resolved
//! against the point catalog, classified as ordinary point traffic or as a
//! step of a function, validated against the function's step ordering
//! rules, and turned into the echo and publish instructions the hosting
//! outstation should carry out.
//!
//! The engine is deliberately transport-free: the DNP3 stack calls
//! [`ReassemblyEngine::ingest`] from its command handlers and applies the
//! returned [`Instruction`]s itself.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod instances;
pub mod outcome;
pub mod value;

pub use cache::LatestValues;
pub use config::{OutstationConfig, OutstationParams};
pub use engine::ReassemblyEngine;
pub use error::{ProtocolError, Result};
pub use instances::{FunctionInstance, PointArray, SelectorBlock, Step, StepValue};
pub use outcome::{FunctionMessage, IngestOutcome, InputUpdate, Instruction};
pub use value::{CommandPhase, ControlCode, OperateType, PointValue, PointWriteValue};
