//! Flow run records
//!
//! A run is created RUNNING with no finish time. The single terminal
//! transition sets both the terminal status and `finish_time`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::flow_version::FlowVersion;
use super::ids::{FlowId, FlowRunId, FlowVersionId, ProjectId};
use crate::CoreError;

/// Environment a run executes in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunEnvironment {
    /// Published flow triggered for real
    Production,

    /// Test run from the builder
    Testing,
}

impl RunEnvironment {
    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RunEnvironment::Production => "PRODUCTION",
            RunEnvironment::Testing => "TESTING",
        }
    }

    /// Parse the database representation
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PRODUCTION" => Some(RunEnvironment::Production),
            "TESTING" => Some(RunEnvironment::Testing),
            _ => None,
        }
    }
}

/// Run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowRunStatus {
    /// Still executing
    Running,
    /// Finished successfully
    Succeeded,
    /// A step failed
    Failed,
    /// Exceeded its execution time
    Timeout,
    /// Stopped by a step
    Stopped,
    /// The engine failed
    InternalError,
}

impl FlowRunStatus {
    /// Whether this status ends a run
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FlowRunStatus::Running)
    }

    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowRunStatus::Running => "RUNNING",
            FlowRunStatus::Succeeded => "SUCCEEDED",
            FlowRunStatus::Failed => "FAILED",
            FlowRunStatus::Timeout => "TIMEOUT",
            FlowRunStatus::Stopped => "STOPPED",
            FlowRunStatus::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Parse the database representation
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "RUNNING" => Some(FlowRunStatus::Running),
            "SUCCEEDED" => Some(FlowRunStatus::Succeeded),
            "FAILED" => Some(FlowRunStatus::Failed),
            "TIMEOUT" => Some(FlowRunStatus::Timeout),
            "STOPPED" => Some(FlowRunStatus::Stopped),
            "INTERNAL_ERROR" => Some(FlowRunStatus::InternalError),
            _ => None,
        }
    }
}

/// Aggregate: Flow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowRun {
    /// Unique identifier
    pub id: FlowRunId,

    /// Owning project
    pub project_id: ProjectId,

    /// Flow that ran
    pub flow_id: FlowId,

    /// Version that ran
    pub flow_version_id: FlowVersionId,

    /// Execution environment, if known
    pub environment: Option<RunEnvironment>,

    /// Display name of the version at start time
    pub flow_display_name: String,

    /// Reference to the stored execution log
    pub logs_file_id: Option<String>,

    /// Current status
    pub status: FlowRunStatus,

    /// Start timestamp
    pub start_time: DateTime<Utc>,

    /// Terminal transition timestamp
    pub finish_time: Option<DateTime<Utc>>,
}

impl FlowRun {
    /// Start a run of the given version
    pub fn start(
        project_id: ProjectId,
        version: &FlowVersion,
        environment: Option<RunEnvironment>,
    ) -> Self {
        Self {
            id: FlowRunId::generate(),
            project_id,
            flow_id: version.flow_id.clone(),
            flow_version_id: version.id.clone(),
            environment,
            flow_display_name: version.display_name.clone(),
            logs_file_id: None,
            status: FlowRunStatus::Running,
            start_time: Utc::now(),
            finish_time: None,
        }
    }

    /// Whether the run reached a terminal status
    pub fn is_finished(&self) -> bool {
        self.finish_time.is_some()
    }

    /// Terminal transition, allowed once
    pub fn finish(
        &mut self,
        status: FlowRunStatus,
        logs_file_id: Option<String>,
    ) -> Result<(), CoreError> {
        if self.is_finished() {
            return Err(CoreError::RunAlreadyFinished {
                id: self.id.0.clone(),
            });
        }
        if !status.is_terminal() {
            return Err(CoreError::Validation(format!(
                "{} is not a terminal run status",
                status.as_str()
            )));
        }

        self.status = status;
        self.logs_file_id = logs_file_id;
        self.finish_time = Some(Utc::now());
        Ok(())
    }
}
