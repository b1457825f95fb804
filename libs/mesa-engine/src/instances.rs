//! In-flight reassembly aggregates
//!
//! A `FunctionInstance` accumulates the steps of one function as their point
//! writes arrive; a `PointArray` accumulates the rows of one array; a
//! `SelectorBlock` accumulates the writes editing one configuration
//! instance. The engine owns at most one of each, and a new one always
//! replaces the prior one.

use crate::error::ProtocolError;
use crate::value::PointValue;
use mesa_model::{FunctionDefinition, PointDefinition, StepDefinition};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// The value a received step carries: a scalar write, or the array being
/// assembled for an array-shaped step.
#[derive(Debug, Clone)]
pub enum StepValue {
    Point(PointValue),
    Array(PointArray),
}

impl StepValue {
    /// Render for publication: scalars unwrap, arrays decode to their row list.
    pub fn as_json(&self) -> Value {
        match self {
            StepValue::Point(value) => value.unwrapped(),
            StepValue::Array(array) => Value::Array(array.rows()),
        }
    }
}

/// One received step of the in-flight function.
#[derive(Debug, Clone)]
pub struct Step {
    pub definition: StepDefinition,
    pub value: StepValue,
}

/// A function in the process of being assembled.
#[derive(Debug, Clone)]
pub struct FunctionInstance {
    definition: Arc<FunctionDefinition>,
    steps: Vec<Step>,
    complete: bool,
}

impl FunctionInstance {
    pub fn new(definition: Arc<FunctionDefinition>) -> Self {
        FunctionInstance {
            definition,
            steps: Vec::new(),
            complete: false,
        }
    }

    pub fn definition(&self) -> &Arc<FunctionDefinition> {
        &self.definition
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Complete ⇔ every mandatory step definition has a received step.
    pub fn complete(&self) -> bool {
        self.complete
    }

    /// Place a received point value as a step, enforcing the step-ordering
    /// rules. Returns the index of the affected step.
    ///
    /// - equal step number: legal only for array elements, which extend the
    ///   step's array value
    /// - greater: every smaller-numbered mandatory step must already be in
    /// - smaller: legal only when the function is already complete, which
    ///   starts a fresh repetition with reset steps
    pub fn add_point_value(
        &mut self,
        step_def: &StepDefinition,
        value: PointValue,
        current_array: Option<&PointArray>,
    ) -> Result<usize, ProtocolError> {
        let step_number = step_def.step_number;
        let step_idx = match self.steps.last() {
            None => {
                self.check_for_missing_steps(step_def)?;
                self.push_step(step_def, value, current_array);
                self.steps.len() - 1
            }
            Some(prior) => {
                let last_number = prior.definition.step_number;
                if step_number == last_number {
                    if !value.point_def.is_array() {
                        return Err(ProtocolError::DuplicateStep { step_number });
                    }
                    // Another element of the step's array: refresh its value.
                    if let Some(array) = current_array {
                        let last = self.steps.len() - 1;
                        self.steps[last].value = StepValue::Array(array.clone());
                        last
                    } else {
                        return Err(ProtocolError::OrphanArrayElement { index: value.index });
                    }
                } else if step_number < last_number {
                    if !self.complete {
                        return Err(ProtocolError::StepOutOfOrder {
                            step_number,
                            last_step_number: last_number,
                        });
                    }
                    // The prior run is done; treat this as the first step of
                    // a fresh repetition.
                    debug!(function = %self.definition.name, "Restarting completed function");
                    self.complete = false;
                    self.steps.clear();
                    self.check_for_missing_steps(step_def)?;
                    self.push_step(step_def, value, current_array);
                    self.steps.len() - 1
                } else {
                    self.check_for_missing_steps(step_def)?;
                    self.push_step(step_def, value, current_array);
                    self.steps.len() - 1
                }
            }
        };
        if self.missing_mandatory_numbers().is_empty() {
            self.complete = true;
        }
        Ok(step_idx)
    }

    fn push_step(
        &mut self,
        step_def: &StepDefinition,
        value: PointValue,
        current_array: Option<&PointArray>,
    ) {
        let value = if value.point_def.is_array() {
            match current_array {
                Some(array) => StepValue::Array(array.clone()),
                None => StepValue::Point(value),
            }
        } else {
            StepValue::Point(value)
        };
        self.steps.push(Step {
            definition: step_def.clone(),
            value,
        });
    }

    /// All mandatory steps numbered below the incoming step must already
    /// have been received.
    fn check_for_missing_steps(&self, step_def: &StepDefinition) -> Result<(), ProtocolError> {
        for missing in self.missing_mandatory_numbers() {
            if step_def.step_number > missing {
                return Err(ProtocolError::MissingMandatoryStep {
                    function: self.definition.name.clone(),
                    step_number: missing,
                });
            }
        }
        Ok(())
    }

    /// Step numbers of mandatory steps not yet received.
    fn missing_mandatory_numbers(&self) -> Vec<u16> {
        self.definition
            .steps
            .iter()
            .filter(|sd| {
                sd.is_mandatory()
                    && !self
                        .steps
                        .iter()
                        .any(|s| s.definition.point_name == sd.point_name)
            })
            .map(|sd| sd.step_number)
            .collect()
    }
}

impl fmt::Display for FunctionInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function {}", self.definition.name)
    }
}

/// An array in the process of being assembled.
///
/// Cells are keyed by (row, column) rather than stored as lists because
/// there is no guarantee elements arrive in order.
#[derive(Debug, Clone)]
pub struct PointArray {
    head: Arc<PointDefinition>,
    cells: BTreeMap<u16, BTreeMap<u16, PointValue>>,
}

impl PointArray {
    pub fn new(head: Arc<PointDefinition>) -> Self {
        PointArray {
            head,
            cells: BTreeMap::new(),
        }
    }

    pub fn head(&self) -> &Arc<PointDefinition> {
        &self.head
    }

    /// Whether the array's full index range contains `index`.
    pub fn contains_index(&self, index: u16) -> bool {
        match self.head.array_last_index() {
            Some(last) => self.head.index <= index && index <= last,
            None => false,
        }
    }

    /// Place a received element by its decoded row and column.
    pub fn add_point_value(&mut self, value: PointValue) {
        let columns = self.head.array_columns().map(<[_]>::len).unwrap_or(1);
        let row = value.array_row(columns);
        let column = value.array_column(columns);
        self.cells.entry(row).or_default().insert(column, value);
    }

    /// Decode to ordered rows of `{column_name: value}` objects, with null
    /// for cells not received.
    pub fn rows(&self) -> Vec<Value> {
        let names: Vec<&str> = self
            .head
            .array_columns()
            .map(|cols| cols.iter().map(|c| c.name.as_str()).collect())
            .unwrap_or_default();
        self.cells
            .values()
            .map(|row| {
                let mut object = serde_json::Map::new();
                for (column, name) in names.iter().enumerate() {
                    let cell = row
                        .get(&(column as u16))
                        .map(|v| v.unwrapped())
                        .unwrap_or(Value::Null);
                    object.insert((*name).to_string(), cell);
                }
                Value::Object(object)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.cells.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// A selector block in the process of being edited.
///
/// `block_index` is the value written to the selector point: it picks which
/// configuration instance the writes inside the bound are editing.
#[derive(Debug, Clone)]
pub struct SelectorBlock {
    head: Arc<PointDefinition>,
    pub block_index: i64,
    points: Vec<PointValue>,
}

impl SelectorBlock {
    pub fn new(head: Arc<PointDefinition>, block_index: i64) -> Self {
        SelectorBlock {
            head,
            block_index,
            points: Vec::new(),
        }
    }

    pub fn head(&self) -> &Arc<PointDefinition> {
        &self.head
    }

    /// Whether the block's static `[start, end]` bound contains `index`.
    pub fn contains_index(&self, index: u16) -> bool {
        match self.head.selector_bounds() {
            Some((start, end)) => start <= index && index <= end,
            None => false,
        }
    }

    pub fn save_on_write(&self) -> bool {
        self.head.save_on_write()
    }

    pub fn add_point_value(&mut self, value: PointValue) {
        self.points.push(value);
    }

    pub fn points(&self) -> &[PointValue] {
        &self.points
    }
}
