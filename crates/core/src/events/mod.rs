pub mod enriched;
pub mod event;
pub mod id;
pub mod timestamp;

pub use enriched::*;
pub use event::*;
pub use id::*;
pub use timestamp::*;
