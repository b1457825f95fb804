//! MESA-ESS Model Library
//!
//! Definition catalogs for a MESA-ESS DNP3 outstation: addressable point
//! definitions (indexed by group/variation/index) and function definitions
//! (ordered multi-step commands). Both catalogs are immutable after load
//! and freely shareable across threads.
//!
//! # Modules
//!
//! - `point`: point definitions, point types and shape validation
//! - `catalog`: the point catalog and its precomputed lookup indexes
//! - `function`: function and step definitions
//! - `functions`: the function catalog and its point-name→step index
//! - `audit`: composite index-range overlap checking

pub mod audit;
pub mod catalog;
pub mod error;
pub mod function;
pub mod functions;
pub mod point;

// Re-exports for convenience
pub use catalog::PointCatalog;
pub use error::{CatalogError, Result};
pub use function::{
    FunctionCode, FunctionDefinition, FunctionRecord, Optionality, StepAction, StepDefinition,
    StepRecord,
};
pub use functions::FunctionCatalog;
pub use point::{
    ArrayColumn, PointDefinition, PointRecord, PointShape, PointType, DEFAULT_EVENT_CLASS,
};
