mod hub;
mod session;

pub use hub::*;
pub use session::*;
