use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::ProjectId;

/// Aggregate: Project owning flows and runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Unique identifier
    pub id: ProjectId,

    /// Human-readable name
    pub display_name: String,

    /// Creation timestamp
    pub created: DateTime<Utc>,
}

impl Project {
    /// Create a new project with a generated ID
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            id: ProjectId::generate(),
            display_name: display_name.into(),
            created: Utc::now(),
        }
    }
}
