use serde::Serialize;

use crate::error::CoreResult;
use crate::window::{EventTime, TimeWindow};

/// One fired window: the final accumulator value of `(key, window)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowResult<K, O> {
    pub key: K,
    pub window: TimeWindow,
    pub value: O,
    /// Watermark that fired the window (`END_OF_STREAM` for a flush).
    pub watermark: EventTime,
}

impl<K, O> WindowResult<K, O> {
    pub fn window_end(&self) -> EventTime {
        self.window.end
    }
}

/// Receives every fired window exactly once, per key in ascending end order.
pub trait Emitter<K, O> {
    fn emit(&mut self, result: WindowResult<K, O>) -> CoreResult<()>;
}

impl<K, O> Emitter<K, O> for Vec<WindowResult<K, O>> {
    fn emit(&mut self, result: WindowResult<K, O>) -> CoreResult<()> {
        self.push(result);
        Ok(())
    }
}

/// Adapts a closure into an [`Emitter`].
pub struct FnEmitter<F>(pub F);

impl<K, O, F> Emitter<K, O> for FnEmitter<F>
where
    F: FnMut(WindowResult<K, O>) -> CoreResult<()>,
{
    fn emit(&mut self, result: WindowResult<K, O>) -> CoreResult<()> {
        (self.0)(result)
    }
}
