use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::flow_version::{FlowOperationRequest, FlowVersion, FlowVersionContent};
use crate::domain::ids::{FlowId, FlowVersionId, ProjectId};
use crate::domain::repository::{FlowRepository, FlowVersionRepository};
use crate::CoreError;

/// Manages version snapshots and applies operations to them
#[async_trait]
pub trait FlowVersionService: Send + Sync {
    /// Create and persist a new draft version
    async fn create_version(
        &self,
        flow_id: &FlowId,
        content: FlowVersionContent,
    ) -> Result<FlowVersion, CoreError>;

    /// The given version of a flow, or its latest when `version_id` is `None`
    async fn get_flow_version(
        &self,
        project_id: &ProjectId,
        flow_id: &FlowId,
        version_id: Option<FlowVersionId>,
        include_artifacts: bool,
    ) -> Result<Option<FlowVersion>, CoreError>;

    /// Latest version of a flow, artifacts included
    async fn get_latest(&self, flow_id: &FlowId) -> Result<Option<FlowVersion>, CoreError>;

    /// Persist a new draft seeded from `version` with `operation` applied
    ///
    /// Nothing is stored when the operation is rejected.
    async fn fork(
        &self,
        project_id: &ProjectId,
        version: &FlowVersion,
        operation: &FlowOperationRequest,
    ) -> Result<FlowVersion, CoreError>;

    /// Mark a version locked and persist it
    async fn lock_version(&self, version: FlowVersion) -> Result<FlowVersion, CoreError>;

    /// Apply an operation to a draft version and persist it
    async fn apply_operation(
        &self,
        project_id: &ProjectId,
        version: FlowVersion,
        operation: &FlowOperationRequest,
    ) -> Result<FlowVersion, CoreError>;
}

/// Repository-backed [`FlowVersionService`]
pub struct PersistentFlowVersionService {
    flow_repo: Arc<dyn FlowRepository>,
    version_repo: Arc<dyn FlowVersionRepository>,
}

impl PersistentFlowVersionService {
    /// Create a new version service
    pub fn new(
        flow_repo: Arc<dyn FlowRepository>,
        version_repo: Arc<dyn FlowVersionRepository>,
    ) -> Self {
        Self {
            flow_repo,
            version_repo,
        }
    }
}

#[async_trait]
impl FlowVersionService for PersistentFlowVersionService {
    async fn create_version(
        &self,
        flow_id: &FlowId,
        content: FlowVersionContent,
    ) -> Result<FlowVersion, CoreError> {
        let version = FlowVersion::new(flow_id.clone(), content);
        self.version_repo.save(&version).await?;

        tracing::debug!(flow_id = %flow_id, version_id = %version.id, "Flow version created");
        Ok(version)
    }

    async fn get_flow_version(
        &self,
        project_id: &ProjectId,
        flow_id: &FlowId,
        version_id: Option<FlowVersionId>,
        include_artifacts: bool,
    ) -> Result<Option<FlowVersion>, CoreError> {
        if self.flow_repo.find_by_id(project_id, flow_id).await?.is_none() {
            return Ok(None);
        }

        let version = match version_id {
            Some(id) => self
                .version_repo
                .find_by_id(&id)
                .await?
                .filter(|version| version.flow_id == *flow_id),
            None => self.version_repo.find_latest(flow_id).await?,
        };

        Ok(version.map(|version| {
            if include_artifacts {
                version
            } else {
                version.without_artifacts()
            }
        }))
    }

    async fn get_latest(&self, flow_id: &FlowId) -> Result<Option<FlowVersion>, CoreError> {
        self.version_repo.find_latest(flow_id).await
    }

    async fn fork(
        &self,
        project_id: &ProjectId,
        version: &FlowVersion,
        operation: &FlowOperationRequest,
    ) -> Result<FlowVersion, CoreError> {
        let mut forked = version.fork();
        forked.apply(operation)?;
        self.version_repo.save(&forked).await?;

        tracing::info!(
            project_id = %project_id,
            flow_id = %version.flow_id,
            from_version = %version.id,
            to_version = %forked.id,
            "Forked locked flow version"
        );
        Ok(forked)
    }

    async fn lock_version(&self, mut version: FlowVersion) -> Result<FlowVersion, CoreError> {
        if !version.is_locked() {
            version.lock();
            self.version_repo.save(&version).await?;
            tracing::info!(flow_id = %version.flow_id, version_id = %version.id, "Flow version locked");
        }
        Ok(version)
    }

    async fn apply_operation(
        &self,
        project_id: &ProjectId,
        mut version: FlowVersion,
        operation: &FlowOperationRequest,
    ) -> Result<FlowVersion, CoreError> {
        version.apply(operation)?;
        self.version_repo.save(&version).await?;

        tracing::debug!(
            project_id = %project_id,
            flow_id = %version.flow_id,
            version_id = %version.id,
            operation = operation.kind(),
            valid = version.valid,
            "Applied flow operation"
        );
        Ok(version)
    }
}
