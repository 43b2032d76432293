use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::flow_instance::{FlowInstance, FlowInstanceStatus};
use super::flow_version::FlowVersion;
use super::ids::{FlowId, FlowVersionId, FolderId, ProjectId};

/// Aggregate: Flow record
///
/// The record itself only carries identity and placement. Its definition
/// lives in [`FlowVersion`] snapshots and its publish status in a
/// [`FlowInstance`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    /// Unique identifier
    pub id: FlowId,

    /// Owning project
    pub project_id: ProjectId,

    /// Folder the flow is filed under, if any
    pub folder_id: Option<FolderId>,

    /// Creation timestamp
    pub created: DateTime<Utc>,

    /// Last updated timestamp
    pub updated: DateTime<Utc>,
}

impl Flow {
    /// Create a new flow record with a generated ID
    pub fn new(project_id: ProjectId, folder_id: Option<FolderId>) -> Self {
        let now = Utc::now();
        Self {
            id: FlowId::generate(),
            project_id,
            folder_id,
            created: now,
            updated: now,
        }
    }
}

/// Publish status composed onto flow reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowStatus {
    /// Published and enabled
    Enabled,

    /// Published but disabled
    Disabled,

    /// No instance record exists
    Unpublished,
}

impl Default for FlowStatus {
    fn default() -> Self {
        FlowStatus::Unpublished
    }
}

impl From<FlowInstanceStatus> for FlowStatus {
    fn from(status: FlowInstanceStatus) -> Self {
        match status {
            FlowInstanceStatus::Enabled => FlowStatus::Enabled,
            FlowInstanceStatus::Disabled => FlowStatus::Disabled,
        }
    }
}

/// Read model: flow record composed with a version and its status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulatedFlow {
    /// The flow record
    #[serde(flatten)]
    pub flow: Flow,

    /// Requested or latest version
    pub version: FlowVersion,

    /// Publish status
    pub status: FlowStatus,

    /// Version the instance points at, when published
    pub published_version_id: Option<FlowVersionId>,
}

impl PopulatedFlow {
    /// Compose a flow from its parts
    pub fn compose(flow: Flow, version: FlowVersion, instance: Option<FlowInstance>) -> Self {
        let (status, published_version_id) = match instance {
            Some(instance) => (instance.status.into(), Some(instance.flow_version_id)),
            None => (FlowStatus::default(), None),
        };

        Self {
            flow,
            version,
            status,
            published_version_id,
        }
    }
}

/// Request to create a flow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFlowRequest {
    /// Display name of the initial version
    pub display_name: String,

    /// Optional folder
    #[serde(default)]
    pub folder_id: Option<FolderId>,
}
