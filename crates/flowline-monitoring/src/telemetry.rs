//! Telemetry sink writing events to the tracing pipeline.

use flowline_core::{TelemetryEvent, TelemetrySink};
use tracing::info;

/// Logs each telemetry event under the `flowline::telemetry` target
#[derive(Debug, Clone, Default)]
pub struct TracingTelemetrySink;

impl TracingTelemetrySink {
    /// Create the sink
    pub fn new() -> Self {
        Self
    }
}

impl TelemetrySink for TracingTelemetrySink {
    fn emit(&self, event: TelemetryEvent) {
        info!(
            target: "flowline::telemetry",
            event = %event.name,
            project_id = %event.project_id,
            properties = %event.properties,
            "Telemetry event"
        );
    }
}
