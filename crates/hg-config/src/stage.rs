use serde::{Deserialize, Serialize};

use crate::types::HumanDuration;

// ---------------------------------------------------------------------------
// StageDefaults: deserialized from [stage_defaults]
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StageDefaults {
    pub max_out_of_orderness: HumanDuration,
    #[serde(default = "zero")]
    pub allowed_lateness: HumanDuration,
}

fn zero() -> HumanDuration {
    HumanDuration::ZERO
}

impl Default for StageDefaults {
    fn default() -> Self {
        Self {
            max_out_of_orderness: HumanDuration::ZERO,
            allowed_lateness: HumanDuration::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// StageOverride: deserialized from [stage.<name>]
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct StageOverride {
    pub length: HumanDuration,
    pub slide: Option<HumanDuration>,
    pub max_out_of_orderness: Option<HumanDuration>,
    pub allowed_lateness: Option<HumanDuration>,
}

// ---------------------------------------------------------------------------
// StageConfig: fully resolved windowing stage
// ---------------------------------------------------------------------------

/// One windowed aggregation stage. `slide == None` means tumbling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageConfig {
    pub name: String,
    pub length: HumanDuration,
    pub slide: Option<HumanDuration>,
    pub max_out_of_orderness: HumanDuration,
    pub allowed_lateness: HumanDuration,
}

impl StageConfig {
    /// Effective slide interval; defaults to `length` for tumbling stages.
    pub fn effective_slide(&self) -> HumanDuration {
        self.slide.unwrap_or(self.length)
    }

    pub fn is_tumbling(&self) -> bool {
        self.effective_slide() == self.length
    }
}

impl StageOverride {
    /// Resolve this override against `defaults`, producing a fully populated [`StageConfig`].
    pub fn resolve(self, name: String, defaults: &StageDefaults) -> StageConfig {
        StageConfig {
            name,
            length: self.length,
            slide: self.slide,
            max_out_of_orderness: self
                .max_out_of_orderness
                .unwrap_or(defaults.max_out_of_orderness),
            allowed_lateness: self.allowed_lateness.unwrap_or(defaults.allowed_lateness),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
