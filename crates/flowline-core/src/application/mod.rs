/// Keyed lock capability and the in-process implementation
pub mod lock;

/// Fire-and-forget telemetry
pub mod telemetry;

/// Flow version service
pub mod flow_version_service;

/// Flow instance (publish status) service
pub mod flow_instance_service;

/// Flow lifecycle service
pub mod flow_service;

/// Flow run service
pub mod flow_run_service;
