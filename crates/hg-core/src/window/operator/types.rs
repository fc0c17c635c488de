use std::time::Duration;

use hg_config::StageConfig;

use crate::error::CoreResult;
use crate::window::assigner::WindowSpec;

/// Construction parameters of a [`WindowOperator`](super::WindowOperator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    pub spec: WindowSpec,
    pub max_out_of_orderness: Duration,
    /// Grace period added to `window.end` before the window fires.
    pub allowed_lateness: Duration,
    /// Wall-clock spacing between firing evaluations on the push path.
    pub watermark_interval: Duration,
}

impl OperatorConfig {
    pub fn new(spec: WindowSpec) -> Self {
        Self {
            spec,
            max_out_of_orderness: Duration::ZERO,
            allowed_lateness: Duration::ZERO,
            watermark_interval: Duration::ZERO,
        }
    }

    pub fn with_max_out_of_orderness(mut self, delay: Duration) -> Self {
        self.max_out_of_orderness = delay;
        self
    }

    pub fn with_allowed_lateness(mut self, lateness: Duration) -> Self {
        self.allowed_lateness = lateness;
        self
    }

    pub fn with_watermark_interval(mut self, interval: Duration) -> Self {
        self.watermark_interval = interval;
        self
    }

    /// Build from a resolved `[stage.<name>]` section.
    pub fn from_stage(stage: &StageConfig, watermark_interval: Duration) -> CoreResult<Self> {
        let spec = WindowSpec::new(
            stage.length.as_duration(),
            stage.slide.map(|s| s.as_duration()),
        )?;
        Ok(Self::new(spec)
            .with_max_out_of_orderness(stage.max_out_of_orderness.as_duration())
            .with_allowed_lateness(stage.allowed_lateness.as_duration())
            .with_watermark_interval(watermark_interval))
    }
}

/// Counters for diagnostics. `records_late` counts records dropped because
/// every window they map to had already fired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperatorStats {
    pub records_in: u64,
    pub records_late: u64,
    /// `(record, window)` assignments skipped because the window had fired.
    pub late_assignments: u64,
    pub windows_created: u64,
    pub windows_fired: u64,
    pub accumulator_errors: u64,
}

/// What happened to one pushed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Merged into `windows` open windows.
    Accepted { windows: usize },
    /// All target windows had already fired.
    DroppedLate,
}
