//!
//! Flowline Core - flow lifecycle domain and services
//!
//! This crate defines the domain model (flows, versions, instances, runs),
//! the repository traits backends implement, the keyed lock capability and
//! the application services orchestrating the flow lifecycle.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - entities, value objects, pagination and repository traits
pub mod domain;

/// Application services - lifecycle orchestration, locking and telemetry
pub mod application;

/// Error types
pub mod error;

pub use error::CoreError;

// Re-export main API types for easy use
pub use domain::flow::{CreateFlowRequest, Flow, FlowStatus, PopulatedFlow};
pub use domain::flow_instance::{FlowInstance, FlowInstanceStatus};
pub use domain::flow_run::{FlowRun, FlowRunStatus, RunEnvironment};
pub use domain::flow_version::{
    Action, ActionInput, ActionKind, FlowOperationRequest, FlowVersion, FlowVersionContent,
    FlowVersionState, Trigger, TriggerInput, TriggerKind,
};
pub use domain::ids::{FlowId, FlowInstanceId, FlowRunId, FlowVersionId, FolderId, ProjectId};
pub use domain::pagination::{Cursor, FolderFilter, PageRequest, SeekPage, NO_FOLDER_SENTINEL};
pub use domain::project::Project;
pub use domain::repository::{
    FlowInstanceRepository, FlowQuery, FlowRepository, FlowRunRepository, FlowVersionRepository,
    ProjectRepository, RunQuery,
};

pub use application::flow_instance_service::{FlowInstanceService, PersistentFlowInstanceService};
pub use application::flow_run_service::FlowRunService;
pub use application::flow_service::{FlowService, DEFAULT_LOCK_TIMEOUT};
pub use application::flow_version_service::{FlowVersionService, PersistentFlowVersionService};
pub use application::lock::{flow_lock_key, with_lock, InMemoryLockService, LockHandle, LockService};
pub use application::telemetry::{NoopTelemetrySink, TelemetryEvent, TelemetrySink};
