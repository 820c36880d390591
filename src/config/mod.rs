use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::errors::JournalError;
use crate::journal::registry::Enforcement;

/// Default metadata tag used to derive transaction deduplication keys.
pub const DEFAULT_DEDUP_TAG: &str = "UUID";

/// Policy knobs for a journal, loadable from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalOptions {
    #[serde(default)]
    pub enforcement: Enforcement,
    #[serde(default)]
    pub force_strict: bool,
    #[serde(default = "JournalOptions::default_dedup_tag")]
    pub dedup_tag: String,
}

impl Default for JournalOptions {
    fn default() -> Self {
        Self {
            enforcement: Enforcement::Permissive,
            force_strict: false,
            dedup_tag: DEFAULT_DEDUP_TAG.to_string(),
        }
    }
}

impl JournalOptions {
    /// Reads options from a JSON file, falling back to defaults when the
    /// file does not exist.
    pub fn from_path(path: &Path) -> Result<Self, JournalError> {
        if path.exists() {
            let data = fs::read_to_string(path)?;
            Ok(serde_json::from_str(&data)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), JournalError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    fn default_dedup_tag() -> String {
        DEFAULT_DEDUP_TAG.to_string()
    }
}
