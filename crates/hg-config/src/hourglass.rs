use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::logging::LoggingConfig;
use crate::runtime::RuntimeConfig;
use crate::stage::{StageConfig, StageDefaults, StageOverride};
use crate::validate;

// ---------------------------------------------------------------------------
// Raw TOML structure (intermediate representation)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct HourglassConfigRaw {
    #[serde(default)]
    runtime: RuntimeConfig,
    #[serde(default)]
    stage_defaults: StageDefaults,
    #[serde(default)]
    stage: HashMap<String, StageOverride>,
    #[serde(default)]
    logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// HourglassConfig (resolved, validated)
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct HourglassConfig {
    pub runtime: RuntimeConfig,
    pub stage_defaults: StageDefaults,
    /// Resolved stages, sorted by name.
    pub stages: Vec<StageConfig>,
    pub logging: LoggingConfig,
}

impl HourglassConfig {
    /// Read and parse a `hourglass.toml` file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.as_ref().display()))?;
        content.parse()
    }

    /// Look up a resolved stage by name.
    pub fn stage(&self, name: &str) -> anyhow::Result<&StageConfig> {
        self.stages
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| anyhow::anyhow!("stage {name:?} is not defined in [stage.*]"))
    }
}

impl FromStr for HourglassConfig {
    type Err = anyhow::Error;

    /// Parse a TOML string into a resolved, validated [`HourglassConfig`].
    fn from_str(toml_str: &str) -> anyhow::Result<Self> {
        let raw: HourglassConfigRaw = toml::from_str(toml_str)?;

        let mut stages: Vec<StageConfig> = raw
            .stage
            .into_iter()
            .map(|(name, ovr)| ovr.resolve(name, &raw.stage_defaults))
            .collect();
        stages.sort_by(|a, b| a.name.cmp(&b.name));

        let config = HourglassConfig {
            runtime: raw.runtime,
            stage_defaults: raw.stage_defaults,
            stages,
            logging: raw.logging,
        };

        validate::validate(&config)?;

        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
