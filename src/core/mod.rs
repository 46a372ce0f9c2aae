//! Capability traits and backend adapters.

pub mod traits;
pub mod wrappers;

pub use traits::*;
pub use wrappers::FnOperator;
