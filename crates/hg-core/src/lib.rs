pub mod aggregate;
pub mod error;
pub mod pipeline;
pub mod sink;
pub mod window;

pub use aggregate::AggregateFunction;
pub use error::{CoreError, CoreReason, CoreResult};
pub use pipeline::ChainedPipeline;
pub use sink::{Emitter, FnEmitter, WindowResult};
pub use window::{
    EventTime, OperatorConfig, OperatorStats, PushOutcome, TimeWindow, WindowOperator,
    WindowSpec, WindowState,
};
