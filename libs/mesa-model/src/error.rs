//! Catalog Error Types

use thiserror::Error;

/// Result type for mesa-model operations
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Catalog-load and definition-validation errors.
///
/// Any of these aborts the whole catalog load: there is no partial catalog.
#[derive(Debug, Error, Clone)]
pub enum CatalogError {
    /// A definition failed field-level validation
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    /// A required field was absent from a definition record
    #[error("Missing {field} for {name}")]
    MissingField { name: String, field: String },

    /// The DNP3 object group maps to no supported point type
    #[error("Unsupported DNP3 group {group} for {name}")]
    UnsupportedGroup { name: String, group: u8 },

    /// Two definitions claimed the same index within a point type
    #[error("Duplicate definition: {0}")]
    Duplicate(String),

    /// Two composite definitions of the same kind claimed overlapping index ranges
    #[error("Overlapping ranges: {0}")]
    Overlap(String),

    /// A point name lookup failed
    #[error("No point named {0}")]
    PointNotFound(String),

    /// A function id lookup failed
    #[error("No function with id {0}")]
    FunctionNotFound(String),

    /// A definition file could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Parse(err.to_string())
    }
}

impl From<serde_yaml::Error> for CatalogError {
    fn from(err: serde_yaml::Error) -> Self {
        CatalogError::Parse(err.to_string())
    }
}

// Helper constructors
impl CatalogError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        CatalogError::InvalidDefinition(msg.into())
    }

    pub fn missing(name: impl Into<String>, field: impl Into<String>) -> Self {
        CatalogError::MissingField {
            name: name.into(),
            field: field.into(),
        }
    }

    pub fn duplicate(msg: impl Into<String>) -> Self {
        CatalogError::Duplicate(msg.into())
    }
}
