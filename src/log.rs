//! Logging macros that delegate to the `log` crate when the `log` feature
//! is enabled, and compile to nothing when it isn't.
//!
//! The disabled variants still type-check their arguments so that builds
//! with and without the feature accept the same code.

#[cfg(feature = "log")]
macro_rules! trace {
    ($($t:tt)*) => { ::log::trace!($($t)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! trace {
    ($($t:tt)*) => {{ let _ = format_args!($($t)*); }};
}

#[cfg(feature = "log")]
macro_rules! info {
    ($($t:tt)*) => { ::log::info!($($t)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! info {
    ($($t:tt)*) => {{ let _ = format_args!($($t)*); }};
}
