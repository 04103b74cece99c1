use serde::{Deserialize, Serialize};

/// Decrypted, validated telemetry from one sensor sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    pub device_id: String,
    pub timestamp_ms: u64,
    /// Light-dependent resistor level, sensor-specific unit
    #[serde(rename = "ldr")]
    pub illumination: u64,
    /// Passive infrared motion flag
    #[serde(rename = "pir")]
    pub motion_detected: bool,
}

impl Reading {
    /// Motion flag coded as 0/1 for gauge instruments
    pub fn motion_code(&self) -> i64 {
        i64::from(self.motion_detected)
    }

    /// Illumination as a gauge value, saturating at `i64::MAX`
    pub fn illumination_value(&self) -> i64 {
        i64::try_from(self.illumination).unwrap_or(i64::MAX)
    }
}
