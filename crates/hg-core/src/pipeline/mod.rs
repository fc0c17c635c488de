//! Two-stage window pipelines.
//!
//! Results fired by the first stage become records of the second: the record
//! key comes from a caller-supplied rekey function, the event time is the last
//! instant of the fired window, and the payload is the whole
//! [`WindowResult`](crate::sink::WindowResult).

mod chain;

pub use chain::ChainedPipeline;
