//! Architecture support. Only the 32-bit x86 target is implemented;
//! SMP and other architectures are Non-goals.

pub mod x86_64;
pub use x86_64::*;

pub mod timer;
pub mod context;
