use serde::{Deserialize, Serialize};

use crate::types::HumanDuration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Number of parallel key partitions (one window operator per lane).
    pub lanes: usize,
    /// Bounded capacity of every lane / output channel.
    pub channel_capacity: usize,
    /// Minimum wall-clock spacing between watermark evaluations.
    /// `"0s"` evaluates on every record.
    pub watermark_interval: HumanDuration,
    /// Force-fire every pending window when the input stream ends.
    #[serde(default = "default_flush_on_close")]
    pub flush_on_close: bool,
}

fn default_flush_on_close() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            lanes: 1,
            channel_capacity: 1024,
            watermark_interval: HumanDuration::ZERO,
            flush_on_close: true,
        }
    }
}
