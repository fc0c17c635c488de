mod assigner;
mod operator;
mod scheduler;
mod store;
mod watermark;

pub use assigner::{EventTime, KeyedWindow, TimeWindow, WindowSpec};
pub use operator::{OperatorConfig, OperatorStats, PushOutcome, WindowOperator};
pub use scheduler::{FireScheduler, WindowState};
pub use store::AccumulatorStore;
pub use watermark::{END_OF_STREAM, NO_WATERMARK, WatermarkGenerator, WatermarkThrottle};
