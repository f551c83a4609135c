pub mod record;
pub mod session;
pub mod shared;

pub use record::*;
pub use session::*;
pub use shared::*;
