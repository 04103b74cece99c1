use crate::domain::{MetricsRecorder, LDR_INSTRUMENT, PIR_INSTRUMENT};
use opentelemetry::metrics::{Gauge, Meter};
use tracing::warn;

/// Meter that owns the sensor gauges
pub const METER_NAME: &str = "iot";

/// [`MetricsRecorder`] backed by OpenTelemetry i64 gauges
#[derive(Clone)]
pub struct OtelMetricsRecorder {
    ldr: Gauge<i64>,
    pir: Gauge<i64>,
}

impl OtelMetricsRecorder {
    pub fn new(meter: &Meter) -> Self {
        let ldr = meter
            .i64_gauge(LDR_INSTRUMENT)
            .with_description("LDR Sensor Reading")
            .with_unit("Ohms")
            .build();
        let pir = meter
            .i64_gauge(PIR_INSTRUMENT)
            .with_description("PIR Sensor Reading")
            .with_unit("Boolean")
            .build();

        Self { ldr, pir }
    }

    /// Recorder on the globally registered meter provider
    pub fn from_global() -> Self {
        Self::new(&opentelemetry::global::meter(METER_NAME))
    }
}

impl MetricsRecorder for OtelMetricsRecorder {
    fn record_gauge(&self, instrument: &str, value: i64) {
        match instrument {
            LDR_INSTRUMENT => self.ldr.record(value, &[]),
            PIR_INSTRUMENT => self.pir.record(value, &[]),
            other => warn!(instrument = other, value, "dropping observation for unknown gauge"),
        }
    }
}
