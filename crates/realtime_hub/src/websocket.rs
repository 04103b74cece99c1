mod frames;
mod server;

pub use frames::*;
pub use server::*;
