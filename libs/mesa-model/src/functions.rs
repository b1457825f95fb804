//! Function catalog
//!
//! Immutable-after-load repository of `FunctionDefinition`s. The name→step
//! index is built eagerly at load time: a point name referenced by steps of
//! more than one function aborts the load, since the reassembly engine must
//! be able to resolve an incoming point write to exactly one owning step.

use crate::catalog::PointCatalog;
use crate::error::{CatalogError, Result};
use crate::function::{FunctionDefinition, FunctionRecord, StepDefinition};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Top-level shape of a function definition file.
#[derive(Debug, Deserialize)]
struct FunctionsFile {
    functions: Vec<FunctionRecord>,
}

/// Read-only function repository with the point-name→step index.
#[derive(Debug, Default)]
pub struct FunctionCatalog {
    by_id: HashMap<String, Arc<FunctionDefinition>>,
    by_name: HashMap<String, Arc<FunctionDefinition>>,
    /// point name → (owning function, index into its steps)
    step_index: HashMap<String, (Arc<FunctionDefinition>, usize)>,
    /// support point name → owning function id
    support_points: HashMap<String, String>,
}

impl FunctionCatalog {
    pub fn load(records: Vec<FunctionRecord>) -> Result<Self> {
        let mut catalog = FunctionCatalog::default();
        for record in records {
            let function = Arc::new(FunctionDefinition::from_record(record)?);
            if catalog.by_id.contains_key(&function.id) {
                return Err(CatalogError::duplicate(format!(
                    "function id {} defined twice",
                    function.id
                )));
            }
            if catalog.by_name.contains_key(&function.name) {
                return Err(CatalogError::duplicate(format!(
                    "function name {} defined twice",
                    function.name
                )));
            }
            for (step_idx, step) in function.steps.iter().enumerate() {
                if let Some((owner, _)) = catalog.step_index.get(&step.point_name) {
                    return Err(CatalogError::duplicate(format!(
                        "point {} belongs to steps of both {} and {}",
                        step.point_name, owner.name, function.name
                    )));
                }
                catalog
                    .step_index
                    .insert(step.point_name.clone(), (Arc::clone(&function), step_idx));
            }
            if let Some(support) = &function.support_point {
                catalog
                    .support_points
                    .insert(support.clone(), function.id.clone());
            }
            catalog
                .by_name
                .insert(function.name.clone(), Arc::clone(&function));
            catalog.by_id.insert(function.id.clone(), function);
        }
        debug!(functions = catalog.by_id.len(), "Loaded function definitions");
        Ok(catalog)
    }

    /// Parse the YAML definition form: a top-level `functions:` list.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let file: FunctionsFile = serde_yaml::from_str(text)?;
        Self::load(file.functions)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading MESA-ESS function definitions");
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// The step that owns a point, if the point takes part in any function.
    pub fn step_for_point_name(
        &self,
        point_name: &str,
    ) -> Option<(&Arc<FunctionDefinition>, &StepDefinition)> {
        self.step_index
            .get(point_name)
            .map(|(function, step_idx)| (function, &function.steps[*step_idx]))
    }

    pub fn function_by_id(&self, id: &str) -> Option<&Arc<FunctionDefinition>> {
        self.by_id.get(id)
    }

    pub fn function_by_name(&self, name: &str) -> Option<&Arc<FunctionDefinition>> {
        self.by_name.get(name)
    }

    pub fn all_function_ids(&self) -> Vec<&str> {
        self.by_id.keys().map(String::as_str).collect()
    }

    /// Map of support point name → owning function id.
    pub fn support_point_names(&self) -> &HashMap<String, String> {
        &self.support_points
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Cross-catalog check: every point name referenced by a step, response
    /// or support point must resolve in the point catalog.
    pub fn validate_points(&self, points: &PointCatalog) -> Result<()> {
        for function in self.by_id.values() {
            for step in &function.steps {
                points.get_point_named(&step.point_name)?;
                if let Some(response) = &step.response {
                    points.get_point_named(response)?;
                }
            }
            if let Some(support) = &function.support_point {
                points.get_point_named(support)?;
            }
        }
        Ok(())
    }
}
