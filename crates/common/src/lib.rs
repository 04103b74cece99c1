pub mod crypto;
pub mod domain;
pub mod telemetry;

pub use domain::*;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockEnvelopeDecryptor;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockMetricsRecorder;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockReadingBroadcaster;
