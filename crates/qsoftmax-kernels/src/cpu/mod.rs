//! CPU kernel implementations

pub mod fallback;
pub mod parallel;

pub use fallback::*;
pub use parallel::*;
