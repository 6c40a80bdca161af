//! Engine Configuration
//!
//! Settings that control how strictly typed data is encoded and signatures
//! are checked:
//! - Preset levels (standard, strict)
//! - Nesting guard for messages
//! - Parallel batch verification
//!
//! Settings are plain values handed to the hasher and verifier; nothing here
//! is global.

use crate::eip712::{Eip712Error, Eip712Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Deepest struct/array nesting accepted by default
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Strictness presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrictnessLevel {
    /// Unknown message fields ignored, high-s signatures accepted
    Standard,
    /// Unknown message fields and high-s signatures rejected
    Strict,
    /// User-defined settings
    Custom,
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Preset these settings started from
    pub level: StrictnessLevel,
    /// Reject message fields that the type does not declare
    pub strict_fields: bool,
    /// Reject signatures with `s > N/2` before recovery
    pub strict_signatures: bool,
    /// Deepest struct/array nesting accepted in a message
    pub max_depth: usize,
    /// Verify batches on the rayon thread pool
    pub parallel_batch: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::standard()
    }
}

impl EngineSettings {
    /// Standard preset - forward compatible with extra message fields
    pub fn standard() -> Self {
        Self {
            level: StrictnessLevel::Standard,
            strict_fields: false,
            strict_signatures: false,
            max_depth: DEFAULT_MAX_DEPTH,
            parallel_batch: true,
        }
    }

    /// Strict preset
    pub fn strict() -> Self {
        Self {
            level: StrictnessLevel::Strict,
            strict_fields: true,
            strict_signatures: true,
            ..Self::standard()
        }
    }

    /// Parse settings from JSON; missing keys take their standard values.
    pub fn from_json(json: &str) -> Eip712Result<Self> {
        let settings: Self =
            serde_json::from_str(json).map_err(|e| Eip712Error::InvalidJson(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Eip712Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Eip712Error::InvalidJson(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Eip712Result<()> {
        if self.max_depth == 0 {
            return Err(Eip712Error::InvalidJson(
                "maxDepth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
