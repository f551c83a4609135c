pub mod session_ingest;
pub mod worker;

pub use session_ingest::*;
pub use worker::*;
