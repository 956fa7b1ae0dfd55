use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::options::RelaxPolicy;
use crate::types::{Result, RidBagError};

/// Ridbag tunables read from a TOML document.
///
/// ```toml
/// [ridbag]
/// relax_policy = "hard"
/// lookup_table = true
/// ```
///
/// Absent keys leave the corresponding [`super::RidBagOptions`] default untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RidBagConfig {
    /// Storage-release policy override.
    pub relax_policy: Option<RelaxPolicy>,
    /// Direct lookup table override.
    pub lookup_table: Option<bool>,
    /// Auto-convert flag override.
    pub auto_convert_to_record: Option<bool>,
}

impl RidBagConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw: RawConfig =
            toml::from_str(contents).map_err(|e| RidBagError::Config(e.to_string()))?;
        convert(raw.ridbag)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| RidBagError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }
}

fn convert(raw: RawSection) -> Result<RidBagConfig> {
    Ok(RidBagConfig {
        relax_policy: raw.relax_policy,
        lookup_table: raw.lookup_table,
        auto_convert_to_record: raw.auto_convert_to_record,
    })
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    ridbag: RawSection,
}

#[derive(Debug, Default, Deserialize)]
struct RawSection {
    relax_policy: Option<RelaxPolicy>,
    lookup_table: Option<bool>,
    auto_convert_to_record: Option<bool>,
}
