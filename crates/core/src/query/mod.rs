//! Read-side views over a session, recomputed on every call.

pub mod filter;
pub mod summary;

pub use filter::*;
pub use summary::*;
