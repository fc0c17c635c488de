#[macro_use]
mod log_macros;

pub mod error;
mod lane;
pub mod metrics;
pub mod runner;
pub mod signal;
pub mod tracing_init;

pub use error::{RuntimeError, RuntimeReason, RuntimeResult};
pub use metrics::{RunReport, RuntimeMetrics};
pub use runner::{InputRecord, PartitionedRunner};
