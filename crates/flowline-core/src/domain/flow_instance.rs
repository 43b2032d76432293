use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{FlowId, FlowInstanceId, FlowVersionId, ProjectId};

/// Status of a published flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowInstanceStatus {
    /// Published and accepting triggers
    Enabled,

    /// Published but paused
    Disabled,
}

impl FlowInstanceStatus {
    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowInstanceStatus::Enabled => "ENABLED",
            FlowInstanceStatus::Disabled => "DISABLED",
        }
    }

    /// Parse the database representation
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ENABLED" => Some(FlowInstanceStatus::Enabled),
            "DISABLED" => Some(FlowInstanceStatus::Disabled),
            _ => None,
        }
    }
}

/// Aggregate: Flow instance
///
/// At most one instance exists per flow. It records which version is
/// published and whether it is enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowInstance {
    /// Unique identifier
    pub id: FlowInstanceId,

    /// Owning project
    pub project_id: ProjectId,

    /// Published flow
    pub flow_id: FlowId,

    /// Published (locked) version
    pub flow_version_id: FlowVersionId,

    /// Enabled or disabled
    pub status: FlowInstanceStatus,

    /// Creation timestamp
    pub created: DateTime<Utc>,

    /// Last updated timestamp
    pub updated: DateTime<Utc>,
}

impl FlowInstance {
    /// Create a new instance pointing at a version
    pub fn new(
        project_id: ProjectId,
        flow_id: FlowId,
        flow_version_id: FlowVersionId,
        status: FlowInstanceStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: FlowInstanceId::generate(),
            project_id,
            flow_id,
            flow_version_id,
            status,
            created: now,
            updated: now,
        }
    }
}
