//! The narrow OS-memory-acquisition boundary (spec §1's "out of scope"
//! program-break / arena-acquisition mechanism).
//!
//! Every other module reaches memory through [`allocate_region`] and
//! [`free_region`] — this is the only place that calls into `mmap` or
//! `VirtualAlloc`.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::{allocate_region, free_region};

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::{allocate_region, free_region};
