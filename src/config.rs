//! Assignment configuration loaded from JSON.
//!
//! ```json
//! {
//!   "algorithm": "bfw",
//!   "vdf": "BPR",
//!   "vdf_parameters": { "alpha": 0.15, "beta": "b" },
//!   "capacity_field": "capacity",
//!   "time_field": "free_flow_time",
//!   "max_iter": 100,
//!   "rgap_target": 0.001
//! }
//! ```
//!
//! A parameter given as a string names a link field holding per-link values.

use std::path::Path;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::assignment::{Algorithm, DEFAULT_MAX_ITER, DEFAULT_RGAP_TARGET};
use crate::constants::Float;
use crate::vdf::{Vdf, VdfParameter};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssignmentConfig {
    pub algorithm: Algorithm,
    pub vdf: Vdf,
    pub vdf_parameters: HashMap<String, VdfParameter>,
    pub capacity_field: String,
    pub time_field: String,
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    #[serde(default = "default_rgap_target")]
    pub rgap_target: Float,
    #[serde(default = "default_cores")]
    pub cores: usize,
    #[serde(default = "default_steps_below")]
    pub steps_below_needed_to_terminate: usize,
}

fn default_max_iter() -> usize { DEFAULT_MAX_ITER }
fn default_rgap_target() -> Float { DEFAULT_RGAP_TARGET }
fn default_steps_below() -> usize { 1 }

/// Worker threads when none are configured: all available cores.
pub fn default_cores() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

impl AssignmentConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
