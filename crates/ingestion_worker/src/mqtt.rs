mod broker;
mod demo_publisher;
mod subscriber;

pub use broker::*;
pub use demo_publisher::*;
pub use subscriber::*;
