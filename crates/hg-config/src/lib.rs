pub mod hourglass;
pub mod logging;
pub mod runtime;
pub mod stage;
pub mod types;
mod validate;

pub use hourglass::HourglassConfig;
pub use logging::{LogFormat, LoggingConfig};
pub use runtime::RuntimeConfig;
pub use stage::{StageConfig, StageDefaults, StageOverride};
pub use types::HumanDuration;
