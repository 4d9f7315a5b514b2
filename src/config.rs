//! Generation settings. Fixed for the duration of a run.
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::path_de;

/// Default upper (exclusive) bound on the argument count of minimal-argument constructors.
pub const DEFAULT_FAN_OUT_THRESHOLD: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct GenerationSettings {
    /// Containers whose minimum size is below this get a constructor taking
    /// exactly that many elements (or entries).
    pub fan_out_threshold: u64,
    /// Accept NaN and infinities for every floating member.
    pub allow_non_finite: bool,
    /// Emit constructors accepting widened primitives (int for short, double for float).
    pub widen_primitives: bool,
    /// Emit a default-instance singleton when every member carries a default.
    pub default_instances: bool,
    /// Emit empty and single-element container constructors where the bounds allow them.
    pub empty_constructors: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            fan_out_threshold: DEFAULT_FAN_OUT_THRESHOLD,
            allow_non_finite: false,
            widen_primitives: true,
            default_instances: true,
            empty_constructors: true,
        }
    }
}

impl GenerationSettings {
    pub fn from_json_str(src: &str) -> Result<Self, path_de::PathError> {
        path_de::from_str_with_path(src)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let src = std::fs::read_to_string(path)?;
        let settings = Self::from_json_str(&src).map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))?;
        Ok(settings)
    }
}
