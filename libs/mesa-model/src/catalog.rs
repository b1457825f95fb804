//! Point catalog
//!
//! Immutable-after-load repository of `PointDefinition`s with precomputed
//! lookup indexes. A single malformed or duplicate entry aborts the entire
//! load; there is no partial catalog.

use crate::audit;
use crate::error::{CatalogError, Result};
use crate::point::{PointDefinition, PointRecord, PointType};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Read-only point repository, indexed by name, by (point type, index) and
/// by (group, variation, index).
#[derive(Debug, Default)]
pub struct PointCatalog {
    by_name: HashMap<String, Arc<PointDefinition>>,
    by_type_index: HashMap<(PointType, u16), Arc<PointDefinition>>,
    by_group_variation_index: HashMap<(u8, u8, u16), Arc<PointDefinition>>,
}

impl PointCatalog {
    /// Build a catalog from raw definition records, performing whole-file
    /// validation. Array heads additionally register one standalone plain
    /// definition per named sub-column of their first row.
    pub fn load(records: Vec<PointRecord>) -> Result<Self> {
        let mut catalog = PointCatalog::default();
        for record in records {
            let definition = PointDefinition::from_record(record)?;
            let expanded = Self::expand_array_columns(&definition)?;
            catalog.insert(definition)?;
            for element in expanded {
                catalog.insert(element)?;
            }
        }
        audit::check_overlaps(catalog.all_points().as_slice())?;
        debug!(points = catalog.len(), "Loaded point definitions");
        Ok(catalog)
    }

    /// Parse a JSON definition file body that may carry `//`, `#` or
    /// `/* */` comments.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let filtered = strip_comments(text)?;
        let records: Vec<PointRecord> = serde_json::from_str(&filtered)?;
        Self::load(records)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let records: Vec<PointRecord> = serde_yaml::from_str(text)?;
        Self::load(records)
    }

    /// Load from a file, dispatching on extension (json / yaml / yml).
    /// Deployed point files are commented JSON; both forms are accepted.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading DNP3 point definitions");
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            _ => Self::from_json_str(&text),
        }
    }

    /// Each named column after the first in an Array head's first row becomes
    /// an addressable plain definition at `head.index + offset`, inheriting
    /// the head's group and variation.
    fn expand_array_columns(head: &PointDefinition) -> Result<Vec<PointDefinition>> {
        let Some(columns) = head.array_columns() else {
            return Ok(Vec::new());
        };
        let mut elements = Vec::with_capacity(columns.len().saturating_sub(1));
        // The first column is the head itself.
        for (offset, column) in columns.iter().enumerate().skip(1) {
            let record = PointRecord {
                name: column.name.clone(),
                group: Some(head.group),
                variation: Some(head.variation),
                index: Some(head.index + offset as u16),
                units: head.units.clone(),
                scaling_multiplier: head.scaling_multiplier,
                ..Default::default()
            };
            elements.push(PointDefinition::from_record(record)?);
        }
        Ok(elements)
    }

    fn insert(&mut self, definition: PointDefinition) -> Result<()> {
        let definition = Arc::new(definition);
        let type_key = (definition.point_type, definition.index);
        if let Some(existing) = self.by_type_index.get(&type_key) {
            return Err(CatalogError::duplicate(format!(
                "{} conflicts with {}",
                definition, existing
            )));
        }
        if let Some(existing) = self.by_name.get(&definition.name) {
            return Err(CatalogError::duplicate(format!(
                "point name {} already used by {}",
                definition.name, existing
            )));
        }
        self.by_group_variation_index.insert(
            (definition.group, definition.variation, definition.index),
            Arc::clone(&definition),
        );
        self.by_type_index.insert(type_key, Arc::clone(&definition));
        self.by_name.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Look up a definition by name.
    pub fn point_named(&self, name: &str) -> Option<&Arc<PointDefinition>> {
        self.by_name.get(name)
    }

    /// Look up a definition by name, failing loudly when absent.
    pub fn get_point_named(&self, name: &str) -> Result<&Arc<PointDefinition>> {
        self.by_name
            .get(name)
            .ok_or_else(|| CatalogError::PointNotFound(name.to_string()))
    }

    /// Look up a definition by point type and index.
    pub fn for_point_type_and_index(
        &self,
        point_type: PointType,
        index: u16,
    ) -> Option<&Arc<PointDefinition>> {
        self.by_type_index.get(&(point_type, index))
    }

    /// Look up a definition by group and index (type derived from the group).
    pub fn for_group_and_index(&self, group: u8, index: u16) -> Option<&Arc<PointDefinition>> {
        let point_type = PointType::for_group(group)?;
        self.for_point_type_and_index(point_type, index)
    }

    /// Look up a definition by group, variation and index.
    pub fn for_group_variation_and_index(
        &self,
        group: u8,
        variation: u8,
        index: u16,
    ) -> Option<&Arc<PointDefinition>> {
        self.by_group_variation_index.get(&(group, variation, index))
    }

    /// Flat list of every definition, expanded array columns included.
    pub fn all_points(&self) -> Vec<Arc<PointDefinition>> {
        self.by_name.values().cloned().collect()
    }

    pub fn all_point_names(&self) -> Vec<&str> {
        self.by_name.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Filter `//`, `#` and `/* */` comments out of a JSON definition file,
/// leaving quoted strings untouched.
fn strip_comments(text: &str) -> Result<String> {
    let re = Regex::new(r#"(?s)("(?:\\.|[^"\\])*")|(/\*.*?\*/|(?://|#)[^\n]*)"#)
        .map_err(|e| CatalogError::Parse(e.to_string()))?;
    Ok(re
        .replace_all(text, |caps: &regex::Captures<'_>| {
            // Group 1 is a quoted string: keep it. Anything else matched is a comment.
            caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default()
        })
        .into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_stripped_outside_strings() {
        let text = r#"
        // leading comment
        [
            {"name": "a#b", "group": 40, "variation": 2, "index": 1}, # trailing
            /* block
               comment */
            {"name": "c", "group": 40, "variation": 2, "index": 2}
        ]
        "#;
        let catalog = PointCatalog::from_json_str(text).unwrap();
        assert_eq!(catalog.len(), 2);
        // '#' inside the quoted name survived the filter
        assert!(catalog.point_named("a#b").is_some());
    }

    #[test]
    fn duplicate_index_aborts_load() {
        let text = r#"[
            {"name": "a", "group": 40, "variation": 2, "index": 1},
            {"name": "b", "group": 41, "variation": 2, "index": 1}
        ]"#;
        // Groups 40 and 41 are both Analog Output, so the indexes collide.
        let err = PointCatalog::from_json_str(text).unwrap_err();
        assert!(matches!(err, CatalogError::Duplicate(_)));
    }
}
