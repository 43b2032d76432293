use std::sync::Arc;

use crate::domain::flow_run::{FlowRun, FlowRunStatus, RunEnvironment};
use crate::domain::ids::{FlowId, FlowRunId, FlowVersionId, ProjectId};
use crate::domain::pagination::{PageRequest, SeekPage};
use crate::domain::repository::{FlowRepository, FlowRunRepository, FlowVersionRepository, RunQuery};
use crate::CoreError;

/// Service recording flow runs
pub struct FlowRunService {
    flow_repo: Arc<dyn FlowRepository>,
    version_repo: Arc<dyn FlowVersionRepository>,
    run_repo: Arc<dyn FlowRunRepository>,
}

impl FlowRunService {
    /// Create a new flow run service
    pub fn new(
        flow_repo: Arc<dyn FlowRepository>,
        version_repo: Arc<dyn FlowVersionRepository>,
        run_repo: Arc<dyn FlowRunRepository>,
    ) -> Self {
        Self {
            flow_repo,
            version_repo,
            run_repo,
        }
    }

    /// Record the start of a run of `flow_version_id`
    pub async fn start(
        &self,
        project_id: &ProjectId,
        flow_version_id: &FlowVersionId,
        environment: Option<RunEnvironment>,
    ) -> Result<FlowRun, CoreError> {
        let version = self
            .version_repo
            .find_by_id(flow_version_id)
            .await?
            .ok_or_else(|| CoreError::FlowVersionNotFound {
                id: flow_version_id.0.clone(),
            })?;

        // The version must belong to a flow of this project
        if self
            .flow_repo
            .find_by_id(project_id, &version.flow_id)
            .await?
            .is_none()
        {
            return Err(CoreError::flow_not_found(version.flow_id.as_str()));
        }

        let run = FlowRun::start(project_id.clone(), &version, environment);
        self.run_repo.save(&run).await?;

        tracing::info!(
            project_id = %project_id,
            flow_id = %run.flow_id,
            run_id = %run.id,
            "Flow run started"
        );
        Ok(run)
    }

    /// Record the terminal transition of a run
    pub async fn finish(
        &self,
        project_id: &ProjectId,
        run_id: &FlowRunId,
        status: FlowRunStatus,
        logs_file_id: Option<String>,
    ) -> Result<FlowRun, CoreError> {
        let mut run = self.get_one(project_id, run_id).await?;
        run.finish(status, logs_file_id)?;
        self.run_repo.finish(&run).await?;

        tracing::info!(
            run_id = %run.id,
            status = status.as_str(),
            "Flow run finished"
        );
        Ok(run)
    }

    /// A run, or `FlowRunNotFound`
    pub async fn get_one(
        &self,
        project_id: &ProjectId,
        run_id: &FlowRunId,
    ) -> Result<FlowRun, CoreError> {
        self.run_repo
            .find_by_id(project_id, run_id)
            .await?
            .ok_or_else(|| CoreError::FlowRunNotFound {
                id: run_id.0.clone(),
            })
    }

    /// One page of runs, newest first
    pub async fn list(
        &self,
        project_id: &ProjectId,
        flow_id: Option<FlowId>,
        status: Option<FlowRunStatus>,
        page: PageRequest,
    ) -> Result<SeekPage<FlowRun>, CoreError> {
        self.run_repo
            .list(&RunQuery {
                project_id: project_id.clone(),
                flow_id,
                status,
                page,
            })
            .await
    }
}
