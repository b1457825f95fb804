//! Outstation configuration
//!
//! Loaded from a YAML or JSON file merged with `MESA_`-prefixed environment
//! variables; every field has a default so an empty file is a valid
//! configuration. Nested fields are addressed in the environment with `__`,
//! e.g. `MESA_OUTSTATION__PORT=20001`.

use figment::providers::{Env, Format, Json, Yaml};
use figment::Figment;
use mesa_model::{CatalogError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// DNP3 outstation link and database parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutstationParams {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Outstation link-layer address.
    #[serde(default = "default_local_addr")]
    pub link_local_addr: u16,
    /// Master link-layer address.
    #[serde(default = "default_remote_addr")]
    pub link_remote_addr: u16,
    /// Static database size per point type.
    #[serde(default = "default_database_sizes")]
    pub database_sizes: u16,
    /// Event buffer size per point type.
    #[serde(default = "default_event_buffers")]
    pub event_buffers: u16,
    #[serde(default = "default_allow_unsolicited")]
    pub allow_unsolicited: bool,
}

impl Default for OutstationParams {
    fn default() -> Self {
        OutstationParams {
            host: default_host(),
            port: default_port(),
            link_local_addr: default_local_addr(),
            link_remote_addr: default_remote_addr(),
            database_sizes: default_database_sizes(),
            event_buffers: default_event_buffers(),
            allow_unsolicited: default_allow_unsolicited(),
        }
    }
}

/// Application-level configuration of the outstation core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutstationConfig {
    /// Point definition file (commented JSON or YAML).
    #[serde(default)]
    pub points_file: Option<String>,
    /// Function definition file (YAML).
    #[serde(default)]
    pub functions_file: Option<String>,
    #[serde(default)]
    pub outstation: OutstationParams,
    /// Topic for ordinary point traffic.
    #[serde(default = "default_point_topic")]
    pub point_topic: String,
    /// Topic for reassembled function messages.
    #[serde(default = "default_function_topic")]
    pub function_topic: String,
    /// Topic for outstation lifecycle status.
    #[serde(default = "default_outstation_status_topic")]
    pub outstation_status_topic: String,
}

impl Default for OutstationConfig {
    fn default() -> Self {
        OutstationConfig {
            points_file: None,
            functions_file: None,
            outstation: OutstationParams::default(),
            point_topic: default_point_topic(),
            function_topic: default_function_topic(),
            outstation_status_topic: default_outstation_status_topic(),
        }
    }
}

impl OutstationConfig {
    /// Load from a file, with `MESA_` environment variables taking
    /// precedence over file values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading outstation configuration");
        let figment = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => Figment::new().merge(Yaml::file(path)),
            _ => Figment::new().merge(Json::file(path)),
        };
        Self::extract(figment)
    }

    /// Environment-only configuration on top of the defaults.
    pub fn from_env() -> Result<Self> {
        Self::extract(Figment::new())
    }

    fn extract(figment: Figment) -> Result<Self> {
        figment
            .merge(Env::prefixed("MESA_").split("__"))
            .extract()
            .map_err(|e| CatalogError::Parse(e.to_string()))
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    20000
}

fn default_local_addr() -> u16 {
    10
}

fn default_remote_addr() -> u16 {
    1
}

fn default_database_sizes() -> u16 {
    10
}

fn default_event_buffers() -> u16 {
    10
}

fn default_allow_unsolicited() -> bool {
    true
}

fn default_point_topic() -> String {
    "mesa/point".to_string()
}

fn default_function_topic() -> String {
    "mesa/function".to_string()
}

fn default_outstation_status_topic() -> String {
    "mesa/outstation_status".to_string()
}
