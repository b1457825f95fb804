//! Received point values
//!
//! The raw payload of a Select/Operate is classified once at ingestion into
//! the `PointWriteValue` tagged union; everything downstream works with the
//! typed value. A relay command implies a Binary Output target, a numeric
//! payload an Analog Output target.

use chrono::{DateTime, Utc};
use mesa_model::{PointDefinition, PointType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Command phase of an incoming write.
///
/// `Select` validates and reserves; the paired `Operate` mutates state.
/// `DirectOperate` is the one-shot path and mutates state like `Operate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandPhase {
    Select,
    Operate,
    DirectOperate,
}

impl CommandPhase {
    /// Whether this phase advances reassembly state.
    pub fn mutates_state(self) -> bool {
        !matches!(self, CommandPhase::Select)
    }
}

/// Control codes of a relay output block command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlCode {
    Nul,
    LatchOn,
    LatchOff,
    PulseOn,
    PulseOff,
}

/// How an Operate was qualified by the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperateType {
    SelectBeforeOperate,
    DirectOperate,
    DirectOperateNoAck,
}

/// The typed payload of one point write.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PointWriteValue {
    Analog(f64),
    Binary(bool),
    Relay(ControlCode),
}

impl PointWriteValue {
    /// The output point type this payload addresses.
    pub fn point_type(self) -> PointType {
        match self {
            PointWriteValue::Relay(_) => PointType::BinaryOutput,
            _ => PointType::AnalogOutput,
        }
    }

    /// Unwrap to a plain JSON scalar. A relay command unwraps to whether it
    /// latches on.
    pub fn unwrapped(self) -> serde_json::Value {
        match self {
            PointWriteValue::Analog(v) => serde_json::json!(v),
            PointWriteValue::Binary(b) => serde_json::json!(b),
            PointWriteValue::Relay(code) => serde_json::json!(code == ControlCode::LatchOn),
        }
    }
}

impl fmt::Display for PointWriteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointWriteValue::Analog(v) => write!(f, "{}", v),
            PointWriteValue::Binary(b) => write!(f, "{}", b),
            PointWriteValue::Relay(code) => write!(f, "{:?}", code),
        }
    }
}

/// One point write received from the master, resolved to its definition.
///
/// For array elements the raw `index` differs from the definition's head
/// index; the row/column helpers decode the offset.
#[derive(Debug, Clone)]
pub struct PointValue {
    pub received_at: DateTime<Utc>,
    pub phase: CommandPhase,
    pub point_def: Arc<PointDefinition>,
    pub index: u16,
    pub value: PointWriteValue,
    pub op_type: Option<OperateType>,
}

impl PointValue {
    pub fn new(
        phase: CommandPhase,
        point_def: Arc<PointDefinition>,
        index: u16,
        value: PointWriteValue,
        op_type: Option<OperateType>,
    ) -> Self {
        PointValue {
            received_at: Utc::now(),
            phase,
            point_def,
            index,
            value,
            op_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.point_def.name
    }

    /// Whether this write lands on an array's head index.
    pub fn starts_array(&self) -> bool {
        self.point_def.is_array() && self.index == self.point_def.index
    }

    /// Row within the array, from the offset of the raw index.
    pub fn array_row(&self, columns: usize) -> u16 {
        (self.index - self.point_def.index) / columns as u16
    }

    /// Column within the array row.
    pub fn array_column(&self, columns: usize) -> u16 {
        (self.index - self.point_def.index) % columns as u16
    }

    pub fn unwrapped(&self) -> serde_json::Value {
        self.value.unwrapped()
    }
}

impl fmt::Display for PointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Point value {} ({}, {}.{}, {:?})",
            self.value,
            self.name(),
            self.point_def.group_and_variation(),
            self.index,
            self.phase
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesa_model::{ArrayColumn, PointDefinition, PointRecord};

    fn array_head() -> Arc<PointDefinition> {
        let record = PointRecord {
            name: "curve".to_string(),
            shape_tag: Some("array".to_string()),
            group: Some(41),
            variation: Some(1),
            index: Some(207),
            array_points: Some(vec![
                ArrayColumn { name: "x".to_string() },
                ArrayColumn { name: "y".to_string() },
            ]),
            array_times_repeated: Some(100),
            ..Default::default()
        };
        Arc::new(PointDefinition::from_record(record).unwrap())
    }

    #[test]
    fn relay_unwraps_to_latch_state() {
        assert_eq!(
            PointWriteValue::Relay(ControlCode::LatchOn).unwrapped(),
            serde_json::json!(true)
        );
        assert_eq!(
            PointWriteValue::Relay(ControlCode::LatchOff).unwrapped(),
            serde_json::json!(false)
        );
    }

    #[test]
    fn row_and_column_from_offset() {
        let head = array_head();
        let value = PointValue::new(
            CommandPhase::Operate,
            head,
            208,
            PointWriteValue::Analog(1.5),
            Some(OperateType::SelectBeforeOperate),
        );
        assert_eq!(value.array_row(2), 0);
        assert_eq!(value.array_column(2), 1);
        assert!(!value.starts_array());
    }
}
