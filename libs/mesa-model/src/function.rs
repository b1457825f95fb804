//! MESA-ESS function and step definitions
//!
//! A Function (aka mode, command) is a named, ordered sequence of point
//! writes. Each step names the point it writes, its receipt ordinality,
//! the DNP3 function codes it accepts and the action the outstation takes
//! on receipt.

use crate::error::{CatalogError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Receipt ordinality of a step within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Optionality {
    #[serde(rename = "M")]
    Mandatory,
    #[serde(rename = "O")]
    Optional,
    #[serde(rename = "C")]
    Conditional,
}

/// DNP3 function codes a step may constrain itself to.
/// An empty constraint list accepts any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionCode {
    DirectOperate,
    Select,
    Operate,
}

/// Side effect taken when a step is received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    #[default]
    None,
    /// Write the received value back onto the paired response input point.
    Echo,
    /// Emit a function-level message for downstream consumers.
    Publish,
    EchoAndPublish,
    /// Publish, advertising the point the recipient is expected to write next.
    PublishAndRespond,
}

impl StepAction {
    pub fn echoes(self) -> bool {
        matches!(self, StepAction::Echo | StepAction::EchoAndPublish)
    }

    pub fn publishes(self) -> bool {
        matches!(
            self,
            StepAction::Publish | StepAction::EchoAndPublish | StepAction::PublishAndRespond
        )
    }
}

/// Raw serde form of one step in a function definition file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_number: u16,
    pub point_name: String,
    #[serde(default)]
    pub optional: Option<Optionality>,
    #[serde(default)]
    pub fcodes: Vec<FunctionCode>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub action: Option<StepAction>,
}

/// Raw serde form of one function in a definition file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "ref")]
    pub reference: Option<String>,
    #[serde(default)]
    pub support_point: Option<String>,
    pub steps: Vec<StepRecord>,
}

/// A validated step definition. Belongs to exactly one function.
#[derive(Debug, Clone, PartialEq)]
pub struct StepDefinition {
    pub step_number: u16,
    pub point_name: String,
    pub optionality: Optionality,
    /// Allowed function codes; empty means unconstrained.
    pub fcodes: Vec<FunctionCode>,
    /// Input point echoed to (and advertised by publish_and_respond).
    pub response: Option<String>,
    pub action: StepAction,
}

impl StepDefinition {
    fn from_record(function_name: &str, record: StepRecord) -> Result<Self> {
        if record.point_name.is_empty() {
            return Err(CatalogError::invalid(format!(
                "Missing point name in step {} of function {}",
                record.step_number, function_name
            )));
        }
        Ok(StepDefinition {
            step_number: record.step_number,
            point_name: record.point_name,
            optionality: record.optional.unwrap_or(Optionality::Optional),
            fcodes: record.fcodes,
            response: record.response,
            action: record.action.unwrap_or_default(),
        })
    }

    pub fn is_mandatory(&self) -> bool {
        self.optionality == Optionality::Mandatory
    }

    /// Whether this step accepts the given function code.
    pub fn accepts_fcode(&self, fcode: FunctionCode) -> bool {
        self.fcodes.is_empty() || self.fcodes.contains(&fcode)
    }
}

impl fmt::Display for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step {}: {}", self.step_number, self.point_name)
    }
}

/// A validated MESA-ESS function definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    pub id: String,
    pub name: String,
    pub reference: Option<String>,
    /// Point whose live value gates whether the function is supported.
    /// A function with no support point is always supported.
    pub support_point: Option<String>,
    /// Steps ordered by step number; numbering need not be contiguous.
    pub steps: Vec<StepDefinition>,
}

impl FunctionDefinition {
    pub fn from_record(record: FunctionRecord) -> Result<Self> {
        if record.id.is_empty() {
            return Err(CatalogError::invalid("function definition with empty id"));
        }
        if record.name.is_empty() {
            return Err(CatalogError::invalid(format!(
                "function {} has an empty name",
                record.id
            )));
        }
        if record.steps.is_empty() {
            return Err(CatalogError::invalid(format!(
                "function {} has no steps",
                record.name
            )));
        }
        let mut steps = record
            .steps
            .into_iter()
            .map(|s| StepDefinition::from_record(&record.name, s))
            .collect::<Result<Vec<_>>>()?;
        steps.sort_by_key(|s| s.step_number);
        Ok(FunctionDefinition {
            id: record.id,
            name: record.name,
            reference: record.reference,
            support_point: record.support_point,
            steps,
        })
    }

    /// Step numbers of mandatory steps, in order.
    pub fn mandatory_step_numbers(&self) -> Vec<u16> {
        self.steps
            .iter()
            .filter(|s| s.is_mandatory())
            .map(|s| s.step_number)
            .collect()
    }

    pub fn step_named(&self, point_name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.point_name == point_name)
    }
}

impl fmt::Display for FunctionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function {}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_defaults() {
        let record = StepRecord {
            step_number: 1,
            point_name: "DCHA.WinTms".to_string(),
            optional: None,
            fcodes: vec![],
            response: None,
            action: None,
        };
        let step = StepDefinition::from_record("charge_discharge", record).unwrap();
        assert_eq!(step.optionality, Optionality::Optional);
        assert_eq!(step.action, StepAction::None);
        assert!(step.accepts_fcode(FunctionCode::Select));
    }

    #[test]
    fn fcode_constraint_enforced() {
        let step = StepDefinition {
            step_number: 1,
            point_name: "p".to_string(),
            optionality: Optionality::Mandatory,
            fcodes: vec![FunctionCode::DirectOperate],
            response: None,
            action: StepAction::None,
        };
        assert!(step.accepts_fcode(FunctionCode::DirectOperate));
        assert!(!step.accepts_fcode(FunctionCode::Select));
    }

    #[test]
    fn steps_sorted_by_number() {
        let record = FunctionRecord {
            id: "f1".to_string(),
            name: "curve".to_string(),
            reference: None,
            support_point: None,
            steps: vec![
                StepRecord {
                    step_number: 3,
                    point_name: "c".to_string(),
                    optional: None,
                    fcodes: vec![],
                    response: None,
                    action: None,
                },
                StepRecord {
                    step_number: 1,
                    point_name: "a".to_string(),
                    optional: Some(Optionality::Mandatory),
                    fcodes: vec![],
                    response: None,
                    action: None,
                },
            ],
        };
        let function = FunctionDefinition::from_record(record).unwrap();
        assert_eq!(function.steps[0].point_name, "a");
        assert_eq!(function.mandatory_step_numbers(), vec![1]);
    }
}
