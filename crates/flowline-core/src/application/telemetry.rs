use serde::Serialize;
use serde_json::Value;

use crate::domain::ids::ProjectId;

/// Product telemetry event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    /// Event name, e.g. `flow.created`
    pub name: String,

    /// Project the event happened in
    pub project_id: ProjectId,

    /// Event properties
    pub properties: Value,
}

impl TelemetryEvent {
    /// Create an event
    pub fn new(name: impl Into<String>, project_id: ProjectId, properties: Value) -> Self {
        Self {
            name: name.into(),
            project_id,
            properties,
        }
    }
}

/// Fire-and-forget event sink
///
/// Implementations must not block and must not fail the caller.
pub trait TelemetrySink: Send + Sync {
    /// Emit an event
    fn emit(&self, event: TelemetryEvent);
}

/// Sink that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetrySink;

impl TelemetrySink for NoopTelemetrySink {
    fn emit(&self, _event: TelemetryEvent) {}
}
