//! Inspector-side WebSocket relay: accepts agent connections and forwards their events.

pub mod endpoint;
pub mod server;

pub use endpoint::*;
pub use server::*;
