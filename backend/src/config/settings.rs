//! Runtime settings read from the environment (and `.env`, via dotenvy).

use std::env;
use std::path::PathBuf;

use crate::error::{ConfigError, ConfigResult};

/// Directory of the file-backed observability store when none is configured.
pub const DEFAULT_LINEAGE_DIR: &str = ".metaetl/observability";

const LINEAGE_DIR_VAR: &str = "METAETL_LINEAGE_DIR";
const OBSERVABILITY_VAR: &str = "METAETL_OBSERVABILITY";

/// Settings that are not part of the pipeline metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Where lineage, execution and metrics records are appended.
    pub lineage_dir: PathBuf,
    /// Record lineage and metrics at all.
    pub observability: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lineage_dir: PathBuf::from(DEFAULT_LINEAGE_DIR),
            observability: true,
        }
    }
}

impl Settings {
    /// Read settings from process environment, loading `.env` first if present.
    pub fn from_env() -> ConfigResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let mut settings = Self::default();

        if let Some(dir) = lookup(LINEAGE_DIR_VAR).filter(|d| !d.trim().is_empty()) {
            settings.lineage_dir = PathBuf::from(dir);
        }

        if let Some(value) = lookup(OBSERVABILITY_VAR) {
            settings.observability = parse_switch(&value).ok_or_else(|| ConfigError::Setting {
                key: OBSERVABILITY_VAR.to_string(),
                value,
            })?;
        }

        Ok(settings)
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
