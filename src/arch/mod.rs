//! # Architecture Abstraction Layer
//!
//! The single seam between the portable kernel and the machine. Building
//! for ARM selects the real Cortex-M4 port; any other target gets a
//! recording simulation port so the kernel logic can be exercised by
//! host-side unit tests. Both export the same surface.

#[cfg(target_arch = "arm")]
pub mod cortex_m4;
#[cfg(target_arch = "arm")]
pub use cortex_m4::*;

#[cfg(not(target_arch = "arm"))]
pub mod host;
#[cfg(not(target_arch = "arm"))]
pub use host::*;
