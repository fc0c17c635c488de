//! Domain-tagged logging macros.
//!
//! Every macro adds a `domain` field so log consumers can filter by area
//! without parsing messages. Domains used by the runtime:
//!
//! - `sys`: runner start, shutdown, signals
//! - `pipe`: record routing, lanes, window firing
//! - `res`: watermark broadcasts and counters
//! - `conf`: configuration problems
//!
//! ```ignore
//! hg_info!(sys, lanes = 4, "runner started");
//! hg_warn!(pipe, lane = 2, error = %e, "accumulator rejected record");
//! ```
//!
//! The domain is a bare identifier, not a string.

#[doc(hidden)]
macro_rules! hg_log {
    ($level:ident, $domain:ident, $($field:tt)*) => {
        tracing::$level!(domain = stringify!($domain), $($field)*)
    };
}

#[allow(unused_macros)]
macro_rules! hg_error {
    ($domain:ident, $($rest:tt)*) => {
        hg_log!(error, $domain, $($rest)*)
    };
}

macro_rules! hg_warn {
    ($domain:ident, $($rest:tt)*) => {
        hg_log!(warn, $domain, $($rest)*)
    };
}

macro_rules! hg_info {
    ($domain:ident, $($rest:tt)*) => {
        hg_log!(info, $domain, $($rest)*)
    };
}

macro_rules! hg_debug {
    ($domain:ident, $($rest:tt)*) => {
        hg_log!(debug, $domain, $($rest)*)
    };
}

#[allow(unused_macros)]
macro_rules! hg_trace {
    ($domain:ident, $($rest:tt)*) => {
        hg_log!(trace, $domain, $($rest)*)
    };
}
