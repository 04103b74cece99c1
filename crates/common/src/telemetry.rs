mod config;
mod init;
mod metrics;

pub use config::*;
pub use init::*;
pub use metrics::*;
