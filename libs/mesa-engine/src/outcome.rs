//! Ingestion outcomes and the instructions they carry
//!
//! `ingest` never performs side effects itself: it returns `Instruction`s
//! describing the input-point echoes and function messages the hosting
//! outstation should carry out. A failed side effect therefore never
//! invalidates the reassembly state that produced it.

use crate::value::PointWriteValue;
use serde::Serialize;
use serde_json::Value;

/// One input-point database update the outstation should apply.
#[derive(Debug, Clone, PartialEq)]
pub struct InputUpdate {
    pub index: u16,
    pub value: PointWriteValue,
}

/// Function-level message emitted for downstream consumers.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionMessage {
    pub function_name: String,
    /// step point name → received value (arrays decode to row lists).
    pub points: serde_json::Map<String, Value>,
    /// Input point the recipient is expected to write back, when the
    /// publishing step asks for a response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_response: Option<String>,
}

/// Side effect requested by an accepted step.
#[derive(Debug, Clone)]
pub enum Instruction {
    /// Write the received value back onto the named input point.
    Echo {
        point: String,
        updates: Vec<InputUpdate>,
    },
    /// Publish the function assembled so far.
    Publish(FunctionMessage),
}

/// Result of ingesting one accepted point write.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// The write was ordinary point traffic, not part of any function.
    PointOnly,
    /// The write was placed as a step of a function.
    StepAccepted {
        function: String,
        step_number: u16,
        complete: bool,
        instructions: Vec<Instruction>,
    },
}

impl IngestOutcome {
    pub fn instructions(&self) -> &[Instruction] {
        match self {
            IngestOutcome::PointOnly => &[],
            IngestOutcome::StepAccepted { instructions, .. } => instructions,
        }
    }

    pub fn is_step(&self) -> bool {
        matches!(self, IngestOutcome::StepAccepted { .. })
    }
}
