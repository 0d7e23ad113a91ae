//! Logging abstraction
//!
//! Crate-internal macros that work across targets:
//! - `std`: forwarded to `tracing`
//! - `defmt-log` without `std`: forwarded to `defmt`
//! - otherwise: compiled out (arguments are not evaluated)
//!
//! Format strings stick to plain `{}` placeholders so both backends accept them.

macro_rules! sched_error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "std")]
        tracing::error!($($arg)*);
        #[cfg(all(not(feature = "std"), feature = "defmt-log"))]
        defmt::error!($($arg)*);
    }};
}

macro_rules! sched_warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "std")]
        tracing::warn!($($arg)*);
        #[cfg(all(not(feature = "std"), feature = "defmt-log"))]
        defmt::warn!($($arg)*);
    }};
}

macro_rules! sched_info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "std")]
        tracing::info!($($arg)*);
        #[cfg(all(not(feature = "std"), feature = "defmt-log"))]
        defmt::info!($($arg)*);
    }};
}

macro_rules! sched_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "std")]
        tracing::debug!($($arg)*);
        #[cfg(all(not(feature = "std"), feature = "defmt-log"))]
        defmt::debug!($($arg)*);
    }};
}

macro_rules! sched_trace {
    ($($arg:tt)*) => {{
        #[cfg(feature = "std")]
        tracing::trace!($($arg)*);
        #[cfg(all(not(feature = "std"), feature = "defmt-log"))]
        defmt::trace!($($arg)*);
    }};
}

pub(crate) use {sched_debug, sched_error, sched_info, sched_trace, sched_warn};
