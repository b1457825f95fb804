//! Reassembly Engine Error Types

use mesa_model::{CatalogError, PointType};
use thiserror::Error;

/// Result type for mesa-engine operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Protocol-sequencing violations raised while ingesting one point write.
///
/// All of these are local to a single `ingest` call: the offending write is
/// rejected and the engine remains operational. Only `MismatchedFunction`
/// also discards the in-flight function state; an unsupported-function
/// write is rejected before any instance starts.
#[derive(Debug, Error, Clone)]
pub enum ProtocolError {
    /// No point definition resolves for the written index
    #[error("No point definition for {point_type} index {index}")]
    NoDefinition { point_type: PointType, index: u16 },

    /// A step for a different function arrived while another was incomplete
    #[error("Mismatch: {point} does not belong to in-flight function {function}")]
    MismatchedFunction { point: String, function: String },

    /// The same step number arrived twice for a non-array point
    #[error("Duplicate step number {step_number} received")]
    DuplicateStep { step_number: u16 },

    /// A later step arrived while an earlier mandatory step was outstanding
    #[error("Function {function} is missing mandatory step number {step_number}")]
    MissingMandatoryStep { function: String, step_number: u16 },

    /// A smaller step number arrived while the function was incomplete
    #[error("Step {step_number} received after step {last_step_number}")]
    StepOutOfOrder {
        step_number: u16,
        last_step_number: u16,
    },

    /// An array-range write arrived with no in-flight array containing it
    #[error("Array element at index {index} is outside the in-flight array")]
    OrphanArrayElement { index: u16 },

    /// A step arrived for a function whose support point has not enabled it
    #[error("Received a point for unsupported function {function}")]
    UnsupportedFunction { function: String },

    /// A step arrived under a function code its definition does not accept
    #[error("Step {point} does not accept function code {fcode:?}")]
    FunctionCodeNotAllowed {
        point: String,
        fcode: mesa_model::FunctionCode,
    },

    /// An input update targeted a point type that cannot be written as input
    #[error("Unsupported point type {0} for input update")]
    UnsupportedInputType(PointType),

    /// A step's response point does not exist in the point catalog
    #[error("Response point {0} is not defined")]
    ResponsePoint(String),

    /// An input update value did not match the target point's type
    #[error("Invalid input value for {point}: {reason}")]
    InvalidInputValue { point: String, reason: String },

    /// Catalog lookup failure surfaced through the engine
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}
