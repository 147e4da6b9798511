//! Loading and validating the ensemble list.
//!
//! The configuration source is a mapping with a single `ensembles` key:
//!
//! ```yaml
//! ensembles:
//!   - [0, 3, ["--mode", "fast"], "out0.txt", "err0.txt"]
//!   - [4, 7, ["--mode", "slow"], "out1.txt", "err1.txt"]
//! ```
//!
//! Files ending in `.json` are read as JSON, everything else as YAML.

use crate::descriptor::EnsembleDescriptor;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const INLINE_SOURCE: &str = "<inline>";

/// Serialization format of a configuration source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML (the default)
    Yaml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Pick the format from a file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }
}

/// The decoded, ordered list of ensembles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Descriptors in file order; this order drives the split sequence
    pub ensembles: Vec<EnsembleDescriptor>,
}

impl EnsembleConfig {
    /// Wrap an already-built descriptor list, validating it.
    pub fn new(ensembles: Vec<EnsembleDescriptor>) -> Result<Self> {
        let config = EnsembleConfig { ensembles };
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::lenient_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file without range validation.
    ///
    /// Overlapping ranges are then resolved by the partitioner (first match wins).
    pub fn lenient_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::decode(&content, ConfigFormat::from_path(path), path)
    }

    /// Parse and validate an in-memory configuration.
    pub fn from_str_with(content: &str, format: ConfigFormat) -> Result<Self> {
        let config = Self::decode(content, format, Path::new(INLINE_SOURCE))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate an in-memory YAML configuration.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Self::from_str_with(content, ConfigFormat::Yaml)
    }

    fn decode(content: &str, format: ConfigFormat, origin: &Path) -> Result<Self> {
        let parsed = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        };
        parsed.map_err(|message| Error::Parse {
            path: origin.to_path_buf(),
            message,
        })
    }

    /// Reject overlapping ranges.
    ///
    /// Gaps between ranges are allowed; ranks in a gap join no ensemble.
    /// Bounds are not checked: an inverted range matches no rank and a
    /// negative `rank_begin` only covers the ranks that exist.
    pub fn validate(&self) -> Result<()> {
        for (i, d) in self.ensembles.iter().enumerate() {
            if d.is_empty() {
                tracing::warn!(
                    ensemble = i,
                    rank_begin = d.rank_begin,
                    rank_end = d.rank_end,
                    "inverted rank range matches no rank"
                );
            }
        }

        for (i, a) in self.ensembles.iter().enumerate() {
            for (j, b) in self.ensembles.iter().enumerate().skip(i + 1) {
                if a.overlaps(b) {
                    return Err(Error::Configuration(format!(
                        "ensembles {i} [{}, {}] and {j} [{}, {}] overlap",
                        a.rank_begin, a.rank_end, b.rank_begin, b.rank_end
                    )));
                }
            }
        }
        Ok(())
    }

    /// Smallest world size that covers every configured rank.
    pub fn required_world_size(&self) -> i32 {
        self.ensembles
            .iter()
            .map(|d| d.rank_end.saturating_add(1))
            .max()
            .unwrap_or(0)
    }

    /// Every output and error path, in descriptor order.
    pub fn output_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.ensembles
            .iter()
            .flat_map(|d| [&d.output_path, &d.error_path])
    }
}

impl IntoIterator for EnsembleConfig {
    type Item = EnsembleDescriptor;
    type IntoIter = std::vec::IntoIter<EnsembleDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.ensembles.into_iter()
    }
}
