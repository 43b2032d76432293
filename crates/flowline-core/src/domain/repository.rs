//! Repository traits
//!
//! Persistence boundary for the Flowline domain. Backends live in separate
//! crates (`flowline-state-inmemory`, `flowline-state-postgres`).
//!
//! Every lookup that takes a `ProjectId` is scoped to it: a row belonging
//! to another project is reported as absent.

use async_trait::async_trait;

use super::flow::Flow;
use super::flow_instance::FlowInstance;
use super::flow_run::{FlowRun, FlowRunStatus};
use super::flow_version::FlowVersion;
use super::ids::{FlowId, FlowRunId, FlowVersionId, FolderId, ProjectId};
use super::pagination::{FolderFilter, PageRequest, SeekPage};
use super::project::Project;
use crate::CoreError;

/// Flow list query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowQuery {
    /// Owning project
    pub project_id: ProjectId,
    /// Folder filter
    pub folder: FolderFilter,
    /// Page
    pub page: PageRequest,
}

/// Flow run list query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunQuery {
    /// Owning project
    pub project_id: ProjectId,
    /// Only runs of this flow
    pub flow_id: Option<FlowId>,
    /// Only runs in this status
    pub status: Option<FlowRunStatus>,
    /// Page
    pub page: PageRequest,
}

/// Repository for projects
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    /// Insert or replace a project
    async fn save(&self, project: &Project) -> Result<(), CoreError>;

    /// Find a project by ID
    async fn find_by_id(&self, id: &ProjectId) -> Result<Option<Project>, CoreError>;

    /// Delete a project and everything it owns, returning whether it existed
    async fn delete(&self, id: &ProjectId) -> Result<bool, CoreError>;
}

/// Repository for flow records
#[async_trait]
pub trait FlowRepository: Send + Sync {
    /// Insert or replace a flow record
    async fn save(&self, flow: &Flow) -> Result<(), CoreError>;

    /// Find a flow in a project
    async fn find_by_id(
        &self,
        project_id: &ProjectId,
        id: &FlowId,
    ) -> Result<Option<Flow>, CoreError>;

    /// Move a flow to another folder (or none)
    async fn update_folder(
        &self,
        project_id: &ProjectId,
        id: &FlowId,
        folder_id: Option<FolderId>,
    ) -> Result<(), CoreError>;

    /// Delete a flow with its versions, instance and runs
    async fn delete(&self, project_id: &ProjectId, id: &FlowId) -> Result<(), CoreError>;

    /// Count a project's flows
    async fn count(&self, project_id: &ProjectId, folder: &FolderFilter)
        -> Result<u64, CoreError>;

    /// List one page of a project's flows, newest first
    async fn list(&self, query: &FlowQuery) -> Result<SeekPage<Flow>, CoreError>;
}

/// Repository for flow versions
#[async_trait]
pub trait FlowVersionRepository: Send + Sync {
    /// Insert or replace a version
    async fn save(&self, version: &FlowVersion) -> Result<(), CoreError>;

    /// Find a version by ID
    async fn find_by_id(&self, id: &FlowVersionId) -> Result<Option<FlowVersion>, CoreError>;

    /// Most recently created version of a flow
    async fn find_latest(&self, flow_id: &FlowId) -> Result<Option<FlowVersion>, CoreError>;
}

/// Repository for flow instances
#[async_trait]
pub trait FlowInstanceRepository: Send + Sync {
    /// Instance of a flow, if published
    async fn find_by_flow(
        &self,
        project_id: &ProjectId,
        flow_id: &FlowId,
    ) -> Result<Option<FlowInstance>, CoreError>;

    /// Insert or replace the instance of a flow
    async fn save(&self, instance: &FlowInstance) -> Result<(), CoreError>;

    /// Remove the instance of a flow
    async fn delete_by_flow(
        &self,
        project_id: &ProjectId,
        flow_id: &FlowId,
    ) -> Result<(), CoreError>;
}

/// Repository for flow runs
#[async_trait]
pub trait FlowRunRepository: Send + Sync {
    /// Insert or replace a run
    async fn save(&self, run: &FlowRun) -> Result<(), CoreError>;

    /// Find a run in a project
    async fn find_by_id(
        &self,
        project_id: &ProjectId,
        id: &FlowRunId,
    ) -> Result<Option<FlowRun>, CoreError>;

    /// Store the terminal fields of `run` if the stored run is unfinished
    ///
    /// The check and the write are one atomic step. Fails with
    /// `RunAlreadyFinished` when the stored run already has a finish time.
    async fn finish(&self, run: &FlowRun) -> Result<(), CoreError>;

    /// List one page of runs, newest first
    async fn list(&self, query: &RunQuery) -> Result<SeekPage<FlowRun>, CoreError>;
}
