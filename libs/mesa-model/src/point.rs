//! DNP3 point definitions
//!
//! A `PointRecord` is the raw serde form of one entry in a point definition
//! file. Validation turns it into an immutable `PointDefinition` with its
//! point type derived from the DNP3 object group and its event group and
//! variation defaulted from the per-type table when absent.

use crate::error::{CatalogError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default event class assigned when a point does not specify one.
pub const DEFAULT_EVENT_CLASS: u8 = 2;

/// Point types supported by the outstation. Indexing is unique within a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointType {
    BinaryInput,
    BinaryOutput,
    AnalogInput,
    AnalogOutput,
}

impl PointType {
    /// Derive the point type from a DNP3 object group.
    ///
    /// Groups outside the Binary/Analog x Input/Output families (counters,
    /// octet strings, security statistics, ...) are not supported by this
    /// outstation and yield `None`.
    pub fn for_group(group: u8) -> Option<PointType> {
        match group {
            // Single-bit binary: static and event. DNP3 spec Table 11-17.
            1 | 2 => Some(PointType::BinaryInput),
            // Binary output: status, event, command, command event. Table 11-12.
            10..=13 => Some(PointType::BinaryOutput),
            // Analog input: static, frozen, events, deadband. Table 11-9.
            30..=34 => Some(PointType::AnalogInput),
            // Analog output: status, command, events. Table 11-10.
            40..=43 => Some(PointType::AnalogOutput),
            _ => None,
        }
    }

    /// Default `(event_group, event_variation)` used when a point definition
    /// omits them.
    pub fn event_defaults(self) -> (u8, u8) {
        match self {
            PointType::AnalogInput => (32, 3),
            PointType::AnalogOutput => (42, 3),
            PointType::BinaryInput => (2, 1),
            PointType::BinaryOutput => (11, 1),
        }
    }

    /// Input points are reported by the outstation to the master.
    pub fn is_input(self) -> bool {
        matches!(self, PointType::AnalogInput | PointType::BinaryInput)
    }

    /// Output points are written by the master.
    pub fn is_output(self) -> bool {
        matches!(self, PointType::AnalogOutput | PointType::BinaryOutput)
    }
}

impl fmt::Display for PointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PointType::BinaryInput => "Binary Input",
            PointType::BinaryOutput => "Binary Output",
            PointType::AnalogInput => "Analog Input",
            PointType::AnalogOutput => "Analog Output",
        };
        write!(f, "{}", name)
    }
}

/// One named sub-column of an Array point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayColumn {
    pub name: String,
}

/// Shape of a point definition: how its index range is interpreted.
#[derive(Debug, Clone, PartialEq)]
pub enum PointShape {
    /// One index, one value.
    Plain,
    /// A head index followed by `times_repeated` rows of `columns` values.
    Array {
        columns: Vec<ArrayColumn>,
        times_repeated: u16,
    },
    /// A contiguous `[start, end]` index range editing one of several
    /// configuration instances, selected by the value written to the head.
    SelectorBlock {
        start: u16,
        end: u16,
        save_on_write: bool,
    },
}

/// Raw serde form of a point definition file entry.
///
/// Field names match the deployed configuration file format; shape-specific
/// attributes are flat and validated against the `type` tag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointRecord {
    #[serde(default)]
    pub name: String,
    /// Shape tag: absent for plain points, "array" or "selector_block" otherwise.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub shape_tag: Option<String>,
    pub group: Option<u8>,
    pub variation: Option<u8>,
    pub index: Option<u16>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub units: String,
    #[serde(default = "default_scaling_multiplier")]
    pub scaling_multiplier: f64,
    pub event_class: Option<u8>,
    pub event_group: Option<u8>,
    pub event_variation: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_points: Option<Vec<ArrayColumn>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_times_repeated: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector_block_start: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector_block_end: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_on_write: Option<bool>,
}

fn default_scaling_multiplier() -> f64 {
    1.0
}

/// A validated, immutable DNP3 point definition.
#[derive(Debug, Clone, PartialEq)]
pub struct PointDefinition {
    pub name: String,
    pub group: u8,
    pub variation: u8,
    pub index: u16,
    pub point_type: PointType,
    pub description: String,
    pub units: String,
    pub scaling_multiplier: f64,
    pub event_class: u8,
    pub event_group: u8,
    pub event_variation: u8,
    pub shape: PointShape,
}

impl PointDefinition {
    /// Validate a raw record and build the definition.
    pub fn from_record(record: PointRecord) -> Result<Self> {
        let name = record.name;
        if name.is_empty() {
            return Err(CatalogError::invalid("point definition with empty name"));
        }
        let group = record
            .group
            .ok_or_else(|| CatalogError::missing(&name, "group"))?;
        let variation = record
            .variation
            .ok_or_else(|| CatalogError::missing(&name, "variation"))?;
        let index = record
            .index
            .ok_or_else(|| CatalogError::missing(&name, "index"))?;
        let point_type = PointType::for_group(group)
            .ok_or(CatalogError::UnsupportedGroup { name: name.clone(), group })?;

        let event_class = record.event_class.unwrap_or(DEFAULT_EVENT_CLASS);
        if event_class > 3 {
            return Err(CatalogError::invalid(format!(
                "Invalid event class {} for {}",
                event_class, name
            )));
        }
        let (default_eg, default_ev) = point_type.event_defaults();
        let event_group = record.event_group.unwrap_or(default_eg);
        let event_variation = record.event_variation.unwrap_or(default_ev);

        let shape = Self::shape_from_record(
            &name,
            record.shape_tag.as_deref(),
            record.array_points,
            record.array_times_repeated,
            record.selector_block_start,
            record.selector_block_end,
            record.save_on_write,
        )?;
        if let PointShape::Array {
            columns,
            times_repeated,
        } = &shape
        {
            let span = u32::from(*times_repeated) * columns.len() as u32;
            let last = u32::from(index) + span - 1;
            if last > u32::from(u16::MAX) {
                return Err(CatalogError::invalid(format!(
                    "Array {} overruns the index space (last index {})",
                    name, last
                )));
            }
        }

        Ok(PointDefinition {
            name,
            group,
            variation,
            index,
            point_type,
            description: record.description,
            units: record.units,
            scaling_multiplier: record.scaling_multiplier,
            event_class,
            event_group,
            event_variation,
            shape,
        })
    }

    /// A point must carry exactly the attributes legal for its shape.
    #[allow(clippy::too_many_arguments)]
    fn shape_from_record(
        name: &str,
        shape_tag: Option<&str>,
        array_points: Option<Vec<ArrayColumn>>,
        array_times_repeated: Option<u16>,
        selector_block_start: Option<u16>,
        selector_block_end: Option<u16>,
        save_on_write: Option<bool>,
    ) -> Result<PointShape> {
        match shape_tag {
            Some("array") => {
                if selector_block_start.is_some() || selector_block_end.is_some() {
                    return Err(CatalogError::invalid(format!(
                        "selector_block bounds defined for array point {}",
                        name
                    )));
                }
                if save_on_write.is_some() {
                    return Err(CatalogError::invalid(format!(
                        "save_on_write defined for array point {}",
                        name
                    )));
                }
                let columns = array_points
                    .ok_or_else(|| CatalogError::missing(name, "array_points"))?;
                if columns.is_empty() {
                    return Err(CatalogError::invalid(format!(
                        "Empty array_points for array named {}",
                        name
                    )));
                }
                let times_repeated = array_times_repeated
                    .ok_or_else(|| CatalogError::missing(name, "array_times_repeated"))?;
                if times_repeated == 0 {
                    return Err(CatalogError::invalid(format!(
                        "Zero array_times_repeated for array named {}",
                        name
                    )));
                }
                Ok(PointShape::Array {
                    columns,
                    times_repeated,
                })
            }
            Some("selector_block") => {
                if array_points.is_some() || array_times_repeated.is_some() {
                    return Err(CatalogError::invalid(format!(
                        "array attributes defined for selector block point {}",
                        name
                    )));
                }
                let start = selector_block_start
                    .ok_or_else(|| CatalogError::missing(name, "selector_block_start"))?;
                let end = selector_block_end
                    .ok_or_else(|| CatalogError::missing(name, "selector_block_end"))?;
                if start > end {
                    return Err(CatalogError::invalid(format!(
                        "Selector block end index < start index for block named {}",
                        name
                    )));
                }
                Ok(PointShape::SelectorBlock {
                    start,
                    end,
                    save_on_write: save_on_write.unwrap_or(false),
                })
            }
            Some(other) => Err(CatalogError::invalid(format!(
                "Invalid type '{}' for {}",
                other, name
            ))),
            None => {
                if array_points.is_some() || array_times_repeated.is_some() {
                    return Err(CatalogError::invalid(format!(
                        "array attributes defined for non-array point {}",
                        name
                    )));
                }
                if selector_block_start.is_some() || selector_block_end.is_some() {
                    return Err(CatalogError::invalid(format!(
                        "selector_block bounds defined for non-selector-block point {}",
                        name
                    )));
                }
                if save_on_write.is_some() {
                    return Err(CatalogError::invalid(format!(
                        "save_on_write defined for non-selector-block point {}",
                        name
                    )));
                }
                Ok(PointShape::Plain)
            }
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self.shape, PointShape::Array { .. })
    }

    pub fn is_selector_block(&self) -> bool {
        matches!(self.shape, PointShape::SelectorBlock { .. })
    }

    /// Ordered sub-columns of an Array point.
    pub fn array_columns(&self) -> Option<&[ArrayColumn]> {
        match &self.shape {
            PointShape::Array { columns, .. } => Some(columns),
            _ => None,
        }
    }

    /// For an Array point, the last index of its repeated range (inclusive).
    pub fn array_last_index(&self) -> Option<u16> {
        match &self.shape {
            PointShape::Array {
                columns,
                times_repeated,
            } => {
                let span = u32::from(*times_repeated) * columns.len() as u32;
                Some((u32::from(self.index) + span - 1) as u16)
            }
            _ => None,
        }
    }

    /// For a SelectorBlock point, its static `[start, end]` bound.
    pub fn selector_bounds(&self) -> Option<(u16, u16)> {
        match self.shape {
            PointShape::SelectorBlock { start, end, .. } => Some((start, end)),
            _ => None,
        }
    }

    pub fn save_on_write(&self) -> bool {
        matches!(
            self.shape,
            PointShape::SelectorBlock {
                save_on_write: true,
                ..
            }
        )
    }

    /// "group.variation" display form.
    pub fn group_and_variation(&self) -> String {
        format!("{}.{}", self.group, self.variation)
    }

    /// "event_group.event_variation" display form.
    pub fn event_group_and_variation(&self) -> String {
        format!("{}.{}", self.event_group, self.event_variation)
    }
}

impl fmt::Display for PointDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PointDefinition {} ({}, index={}, type={})",
            self.name,
            self.group_and_variation(),
            self.index,
            self.point_type
        )
    }
}
