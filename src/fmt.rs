//! Internal logging shims.
//!
//! With the `defmt` feature enabled these forward to `defmt`; otherwise
//! they consume their arguments and compile to nothing, so host test
//! builds link without a global logger.

#![allow(unused_macros)]

#[cfg(feature = "defmt")]
macro_rules! os_trace {
    ($($arg:tt)*) => { ::defmt::trace!($($arg)*) };
}

#[cfg(not(feature = "defmt"))]
macro_rules! os_trace {
    ($s:literal $(, $x:expr)* $(,)?) => {{ $(let _ = &$x;)* }};
}

#[cfg(feature = "defmt")]
macro_rules! os_debug {
    ($($arg:tt)*) => { ::defmt::debug!($($arg)*) };
}

#[cfg(not(feature = "defmt"))]
macro_rules! os_debug {
    ($s:literal $(, $x:expr)* $(,)?) => {{ $(let _ = &$x;)* }};
}
