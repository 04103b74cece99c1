mod domain;
mod realtime_hub;
mod websocket;

pub use domain::*;
pub use realtime_hub::*;
pub use websocket::*;
