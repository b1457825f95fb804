//! The reassembly engine
//!
//! Sits behind the outstation's command handlers and reassembles the
//! master's point writes into MESA-ESS functions. The engine holds at most
//! one in-flight function, one in-flight array and one in-flight selector
//! block; each is replaced by the next one that starts.
//!
//! `ingest` is the single entry point for master writes. A rejected write
//! returns the protocol violation and leaves the engine operational; only a
//! mismatched function additionally discards the in-flight function state.

use crate::cache::LatestValues;
use crate::error::{ProtocolError, Result};
use crate::instances::{FunctionInstance, PointArray, SelectorBlock};
use crate::outcome::{FunctionMessage, IngestOutcome, InputUpdate, Instruction};
use crate::value::{CommandPhase, ControlCode, OperateType, PointValue, PointWriteValue};
use mesa_model::{
    FunctionCatalog, FunctionCode, FunctionDefinition, PointCatalog, PointDefinition, PointType,
    StepAction, StepDefinition,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// DNP3 function code carried by each command phase.
fn fcode_for(phase: CommandPhase) -> FunctionCode {
    match phase {
        CommandPhase::Select => FunctionCode::Select,
        CommandPhase::Operate => FunctionCode::Operate,
        CommandPhase::DirectOperate => FunctionCode::DirectOperate,
    }
}

/// The selector value written to a block's head picks the instance edited.
fn block_index_of(value: PointWriteValue) -> i64 {
    match value {
        PointWriteValue::Analog(v) => v as i64,
        PointWriteValue::Binary(b) => i64::from(b),
        PointWriteValue::Relay(code) => i64::from(code == ControlCode::LatchOn),
    }
}

/// Stateful reassembler of master point writes into functions.
#[derive(Debug)]
pub struct ReassemblyEngine {
    points: Arc<PointCatalog>,
    functions: Arc<FunctionCatalog>,
    current_function: Option<FunctionInstance>,
    current_array: Option<PointArray>,
    current_block: Option<SelectorBlock>,
    /// (selector point name, block index) → last saved edit of that instance.
    saved_blocks: HashMap<(String, i64), SelectorBlock>,
    /// Runtime support overlay for functions gated by a support point.
    supported: HashMap<String, bool>,
    latest: LatestValues,
}

impl ReassemblyEngine {
    pub fn new(points: Arc<PointCatalog>, functions: Arc<FunctionCatalog>) -> Self {
        ReassemblyEngine {
            points,
            functions,
            current_function: None,
            current_array: None,
            current_block: None,
            saved_blocks: HashMap::new(),
            supported: HashMap::new(),
            latest: LatestValues::new(),
        }
    }

    /// Ingest one point write from the master.
    ///
    /// The write is cached as the point's latest value up front so the
    /// Select phase is already visible to readers; a rejected write is
    /// discarded from the cache again.
    pub fn ingest(
        &mut self,
        phase: CommandPhase,
        index: u16,
        value: PointWriteValue,
        op_type: Option<OperateType>,
    ) -> Result<IngestOutcome> {
        let point_type = value.point_type();
        let definition = self.resolve_definition(point_type, index)?;
        let point_value = PointValue::new(phase, definition, index, value, op_type);
        debug!(%point_value, "Ingesting point write");
        self.latest.record(&point_value);
        let result = self.process(point_value);
        if let Err(err) = &result {
            warn!(index, %err, "Rejected point write");
            self.latest.discard(point_type, index);
        }
        result
    }

    /// Map a written index to its definition. While an array is in flight
    /// its full index range resolves to the array head; an index resolving
    /// nowhere during an in-flight array is an orphan element.
    fn resolve_definition(
        &self,
        point_type: PointType,
        index: u16,
    ) -> Result<Arc<PointDefinition>> {
        if let Some(array) = &self.current_array {
            if array.head().point_type == point_type && array.contains_index(index) {
                return Ok(Arc::clone(array.head()));
            }
        }
        if let Some(definition) = self.points.for_point_type_and_index(point_type, index) {
            return Ok(Arc::clone(definition));
        }
        if self.current_array.is_some() {
            Err(ProtocolError::OrphanArrayElement { index })
        } else {
            Err(ProtocolError::NoDefinition { point_type, index })
        }
    }

    fn process(&mut self, point_value: PointValue) -> Result<IngestOutcome> {
        let step = self
            .functions
            .step_for_point_name(point_value.name())
            .map(|(function, step)| (Arc::clone(function), step.clone()));

        if let Some((_, step_def)) = &step {
            let fcode = fcode_for(point_value.phase);
            if !step_def.accepts_fcode(fcode) {
                return Err(ProtocolError::FunctionCodeNotAllowed {
                    point: point_value.name().to_string(),
                    fcode,
                });
            }
        }

        // Select validates and caches only; Operate advances state.
        if !point_value.phase.mutates_state() {
            return Ok(IngestOutcome::PointOnly);
        }

        self.track_selector_block(&point_value);
        if point_value.point_def.is_array() {
            self.track_array(&point_value)?;
        }

        let Some((function, step_def)) = step else {
            return Ok(IngestOutcome::PointOnly);
        };
        self.transition_to(&function, &point_value)?;

        let step_number = step_def.step_number;
        match self.current_function.as_mut() {
            Some(instance) => {
                instance.add_point_value(&step_def, point_value.clone(), self.current_array.as_ref())?;
            }
            // transition_to always leaves an instance in place
            None => return Ok(IngestOutcome::PointOnly),
        }

        let (complete, instructions) = match self.current_function.as_ref() {
            Some(instance) => (
                instance.complete(),
                self.build_instructions(instance, &step_def, &point_value),
            ),
            None => (false, Vec::new()),
        };
        Ok(IngestOutcome::StepAccepted {
            function: function.name.clone(),
            step_number,
            complete,
            instructions,
        })
    }

    /// Start or continue the in-flight function for an incoming step point.
    ///
    /// A step for a different function while the in-flight one is incomplete
    /// is a mismatch and discards the in-flight function and array. A
    /// complete in-flight function simply yields to the new one.
    fn transition_to(
        &mut self,
        function: &Arc<FunctionDefinition>,
        point_value: &PointValue,
    ) -> Result<()> {
        match &self.current_function {
            Some(instance) if instance.definition().id == function.id => Ok(()),
            Some(instance) if instance.complete() => {
                debug!(
                    finished = %instance.definition().name,
                    starting = %function.name,
                    "Complete function yields to new function"
                );
                self.start_instance(function)
            }
            Some(instance) => {
                let err = ProtocolError::MismatchedFunction {
                    point: point_value.name().to_string(),
                    function: instance.definition().name.clone(),
                };
                self.current_function = None;
                self.current_array = None;
                Err(err)
            }
            None => self.start_instance(function),
        }
    }

    fn start_instance(&mut self, function: &Arc<FunctionDefinition>) -> Result<()> {
        if !self.is_function_supported(&function.id) {
            return Err(ProtocolError::UnsupportedFunction {
                function: function.name.clone(),
            });
        }
        debug!(function = %function.name, "Starting function");
        self.current_function = Some(FunctionInstance::new(Arc::clone(function)));
        Ok(())
    }

    /// Selector block lifecycle. A write on a block's head index starts a
    /// fresh edit for the selected instance, then falls through to the
    /// append: any write inside the bound of the in-flight block, the head
    /// write included, accumulates on it. A save_on_write block is
    /// re-snapshotted after every write it absorbs.
    fn track_selector_block(&mut self, point_value: &PointValue) {
        let definition = &point_value.point_def;
        if definition.is_selector_block() && point_value.index == definition.index {
            let block_index = block_index_of(point_value.value);
            debug!(point = %definition.name, block_index, "Starting selector block edit");
            self.current_block = Some(SelectorBlock::new(Arc::clone(definition), block_index));
        }
        let Some(block) = self.current_block.as_mut() else {
            return;
        };
        if !block.contains_index(point_value.index) {
            return;
        }
        block.add_point_value(point_value.clone());
        if block.save_on_write() {
            let key = (block.head().name.clone(), block.block_index);
            let snapshot = block.clone();
            self.saved_blocks.insert(key, snapshot);
        }
    }

    /// Array lifecycle. A write on the head index starts a fresh array;
    /// any other index inside the bound lands in the in-flight one.
    fn track_array(&mut self, point_value: &PointValue) -> Result<()> {
        if point_value.starts_array() {
            debug!(point = %point_value.name(), "Starting array");
            let mut array = PointArray::new(Arc::clone(&point_value.point_def));
            array.add_point_value(point_value.clone());
            self.current_array = Some(array);
            return Ok(());
        }
        match self.current_array.as_mut() {
            Some(array)
                if array.head().name == point_value.point_def.name
                    && array.contains_index(point_value.index) =>
            {
                array.add_point_value(point_value.clone());
                Ok(())
            }
            _ => Err(ProtocolError::OrphanArrayElement {
                index: point_value.index,
            }),
        }
    }

    /// Side-effect instructions for an accepted step. A failure to build an
    /// echo is logged and skipped: the step itself stands.
    fn build_instructions(
        &self,
        instance: &FunctionInstance,
        step_def: &StepDefinition,
        point_value: &PointValue,
    ) -> Vec<Instruction> {
        let mut instructions = Vec::new();
        if step_def.action.echoes() {
            match self.build_echo(step_def, point_value) {
                Ok(echo) => instructions.push(echo),
                Err(err) => warn!(point = point_value.name(), %err, "Skipping echo"),
            }
        }
        if step_def.action.publishes() {
            instructions.push(Instruction::Publish(Self::build_message(instance, step_def)));
        }
        instructions
    }

    fn build_echo(
        &self,
        step_def: &StepDefinition,
        point_value: &PointValue,
    ) -> Result<Instruction> {
        let Some(response) = &step_def.response else {
            return Err(ProtocolError::InvalidInputValue {
                point: step_def.point_name.clone(),
                reason: "echo step has no response point".to_string(),
            });
        };
        let target = self
            .points
            .point_named(response)
            .ok_or_else(|| ProtocolError::ResponsePoint(response.clone()))?;
        let value = match (target.point_type, point_value.value) {
            (PointType::AnalogInput, PointWriteValue::Analog(v)) => PointWriteValue::Analog(v),
            (PointType::BinaryInput, PointWriteValue::Binary(b)) => PointWriteValue::Binary(b),
            (PointType::BinaryInput, PointWriteValue::Relay(code)) => {
                PointWriteValue::Binary(code == ControlCode::LatchOn)
            }
            (point_type, _) if !point_type.is_input() => {
                return Err(ProtocolError::UnsupportedInputType(point_type))
            }
            (point_type, value) => {
                return Err(ProtocolError::InvalidInputValue {
                    point: response.clone(),
                    reason: format!("cannot echo {} onto {}", value, point_type),
                })
            }
        };
        Ok(Instruction::Echo {
            point: response.clone(),
            updates: vec![InputUpdate {
                index: target.index,
                value,
            }],
        })
    }

    fn build_message(instance: &FunctionInstance, step_def: &StepDefinition) -> FunctionMessage {
        let mut points = serde_json::Map::new();
        for step in instance.steps() {
            points.insert(step.definition.point_name.clone(), step.value.as_json());
        }
        let expected_response = if step_def.action == StepAction::PublishAndRespond {
            step_def.response.clone()
        } else {
            None
        };
        FunctionMessage {
            function_name: instance.definition().name.clone(),
            points,
            expected_response,
        }
    }

    /// Update an input point from the application side, returning the
    /// database updates the outstation should apply. An array input fans
    /// out row-major from the head index. Writing a function's support
    /// point flips that function's supported flag.
    pub fn update_input_point(&mut self, name: &str, value: &Value) -> Result<Vec<InputUpdate>> {
        let definition = Arc::clone(self.points.get_point_named(name)?);
        if !definition.point_type.is_input() {
            return Err(ProtocolError::UnsupportedInputType(definition.point_type));
        }
        let updates = if definition.is_array() {
            Self::array_input_updates(&definition, value)?
        } else {
            vec![InputUpdate {
                index: definition.index,
                value: Self::scalar_input(&definition, value)?,
            }]
        };
        if let Some(function_id) = self.functions.support_point_names().get(name) {
            let supported = Self::truthy(value);
            debug!(function = %function_id, supported, "Support point updated");
            self.supported.insert(function_id.clone(), supported);
        }
        Ok(updates)
    }

    fn scalar_input(definition: &PointDefinition, value: &Value) -> Result<PointWriteValue> {
        match definition.point_type {
            PointType::AnalogInput => value
                .as_f64()
                .map(PointWriteValue::Analog)
                .ok_or_else(|| ProtocolError::InvalidInputValue {
                    point: definition.name.clone(),
                    reason: format!("expected a number, got {}", value),
                }),
            PointType::BinaryInput => match value {
                Value::Bool(b) => Ok(PointWriteValue::Binary(*b)),
                Value::Number(n) => Ok(PointWriteValue::Binary(n.as_f64() != Some(0.0))),
                other => Err(ProtocolError::InvalidInputValue {
                    point: definition.name.clone(),
                    reason: format!("expected a boolean, got {}", other),
                }),
            },
            point_type => Err(ProtocolError::UnsupportedInputType(point_type)),
        }
    }

    /// Rows are lists of scalars in column order; cells land row-major.
    fn array_input_updates(
        definition: &PointDefinition,
        value: &Value,
    ) -> Result<Vec<InputUpdate>> {
        let Some(rows) = value.as_array() else {
            return Err(ProtocolError::InvalidInputValue {
                point: definition.name.clone(),
                reason: "array point expects a list of rows".to_string(),
            });
        };
        let columns = definition.array_columns().map(<[_]>::len).unwrap_or(1);
        let last = definition.array_last_index().unwrap_or(definition.index);
        let mut updates = Vec::new();
        for (row_idx, row) in rows.iter().enumerate() {
            let Some(cells) = row.as_array() else {
                return Err(ProtocolError::InvalidInputValue {
                    point: definition.name.clone(),
                    reason: format!("row {} is not a list", row_idx),
                });
            };
            for (col_idx, cell) in cells.iter().take(columns).enumerate() {
                let index = definition.index + (row_idx * columns + col_idx) as u16;
                if index > last {
                    return Err(ProtocolError::InvalidInputValue {
                        point: definition.name.clone(),
                        reason: format!("row {} exceeds the array bound", row_idx),
                    });
                }
                let value = cell.as_f64().map(PointWriteValue::Analog).ok_or_else(|| {
                    ProtocolError::InvalidInputValue {
                        point: definition.name.clone(),
                        reason: format!("cell ({}, {}) is not a number", row_idx, col_idx),
                    }
                })?;
                updates.push(InputUpdate { index, value });
            }
        }
        Ok(updates)
    }

    fn truthy(value: &Value) -> bool {
        match value {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
            _ => false,
        }
    }

    /// Discard all in-flight state. Saved selector blocks, the supported
    /// overlay and the latest-value cache survive.
    pub fn reset(&mut self) {
        debug!("Resetting reassembly state");
        self.current_function = None;
        self.current_array = None;
        self.current_block = None;
    }

    /// Whether steps for a function are currently accepted. Functions with
    /// no support point are always supported; gated ones start unsupported
    /// until their support point reports true.
    pub fn is_function_supported(&self, id: &str) -> bool {
        match self.functions.function_by_id(id) {
            Some(function) if function.support_point.is_some() => {
                self.supported.get(id).copied().unwrap_or(false)
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn set_function_supported(&mut self, id: &str, supported: bool) {
        self.supported.insert(id.to_string(), supported);
    }

    pub fn current_function(&self) -> Option<&FunctionInstance> {
        self.current_function.as_ref()
    }

    pub fn current_array(&self) -> Option<&PointArray> {
        self.current_array.as_ref()
    }

    pub fn current_block(&self) -> Option<&SelectorBlock> {
        self.current_block.as_ref()
    }

    /// The last saved edit of a selector block instance.
    pub fn saved_block(&self, point_name: &str, block_index: i64) -> Option<&SelectorBlock> {
        self.saved_blocks
            .get(&(point_name.to_string(), block_index))
    }

    pub fn latest_values(&self) -> &LatestValues {
        &self.latest
    }

    /// Latest received value of a point, by name.
    pub fn point_value(&self, name: &str) -> Option<PointValue> {
        let definition = self.points.point_named(name)?;
        self.latest.get(definition.point_type, definition.index)
    }

    /// Latest received value of a point, by group and index.
    pub fn point_value_by_index(&self, group: u8, index: u16) -> Option<PointValue> {
        let point_type = PointType::for_group(group)?;
        self.latest.get(point_type, index)
    }

    /// Snapshot of every cached point value.
    pub fn all_point_values(&self) -> Vec<PointValue> {
        self.latest.all()
    }

    pub fn point_catalog(&self) -> &Arc<PointCatalog> {
        &self.points
    }

    pub fn function_catalog(&self) -> &Arc<FunctionCatalog> {
        &self.functions
    }
}
