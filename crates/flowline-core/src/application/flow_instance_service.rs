use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use super::flow_version_service::FlowVersionService;
use super::lock::{flow_lock_key, with_lock, LockService};
use crate::domain::flow_instance::{FlowInstance, FlowInstanceStatus};
use crate::domain::ids::{FlowId, ProjectId};
use crate::domain::repository::{FlowInstanceRepository, FlowRepository};
use crate::CoreError;

/// Tracks the publish status of flows
#[async_trait]
pub trait FlowInstanceService: Send + Sync {
    /// Instance of a flow, `None` when unpublished
    async fn get(
        &self,
        project_id: &ProjectId,
        flow_id: &FlowId,
    ) -> Result<Option<FlowInstance>, CoreError>;

    /// Lock the latest version and point the instance at it
    async fn publish(
        &self,
        project_id: &ProjectId,
        flow_id: &FlowId,
        status: FlowInstanceStatus,
    ) -> Result<FlowInstance, CoreError>;

    /// Enable or disable a published flow
    async fn update_status(
        &self,
        project_id: &ProjectId,
        flow_id: &FlowId,
        status: FlowInstanceStatus,
    ) -> Result<FlowInstance, CoreError>;

    /// Cleanup hook run before a flow record is deleted
    async fn on_flow_delete(&self, project_id: &ProjectId, flow_id: &FlowId)
        -> Result<(), CoreError>;
}

/// Repository-backed [`FlowInstanceService`]
pub struct PersistentFlowInstanceService {
    flow_repo: Arc<dyn FlowRepository>,
    instance_repo: Arc<dyn FlowInstanceRepository>,
    version_service: Arc<dyn FlowVersionService>,
    lock: Arc<dyn LockService>,
    lock_timeout: Duration,
}

impl PersistentFlowInstanceService {
    /// Create a new instance service
    pub fn new(
        flow_repo: Arc<dyn FlowRepository>,
        instance_repo: Arc<dyn FlowInstanceRepository>,
        version_service: Arc<dyn FlowVersionService>,
        lock: Arc<dyn LockService>,
    ) -> Self {
        Self {
            flow_repo,
            instance_repo,
            version_service,
            lock,
            lock_timeout: super::flow_service::DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Override the bound on lock acquisition
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    async fn require_flow(&self, project_id: &ProjectId, flow_id: &FlowId) -> Result<(), CoreError> {
        match self.flow_repo.find_by_id(project_id, flow_id).await? {
            Some(_) => Ok(()),
            None => Err(CoreError::flow_not_found(flow_id.as_str())),
        }
    }
}

#[async_trait]
impl FlowInstanceService for PersistentFlowInstanceService {
    async fn get(
        &self,
        project_id: &ProjectId,
        flow_id: &FlowId,
    ) -> Result<Option<FlowInstance>, CoreError> {
        self.instance_repo.find_by_flow(project_id, flow_id).await
    }

    async fn publish(
        &self,
        project_id: &ProjectId,
        flow_id: &FlowId,
        status: FlowInstanceStatus,
    ) -> Result<FlowInstance, CoreError> {
        let key = flow_lock_key(flow_id);
        with_lock(self.lock.as_ref(), &key, self.lock_timeout, || async {
            self.require_flow(project_id, flow_id).await?;

            let latest = self
                .version_service
                .get_latest(flow_id)
                .await?
                .ok_or_else(|| CoreError::FlowVersionNotFound {
                    id: flow_id.0.clone(),
                })?;
            let locked = self.version_service.lock_version(latest).await?;

            let instance = match self.instance_repo.find_by_flow(project_id, flow_id).await? {
                Some(mut existing) => {
                    existing.flow_version_id = locked.id.clone();
                    existing.status = status;
                    existing.updated = Utc::now();
                    existing
                }
                None => FlowInstance::new(
                    project_id.clone(),
                    flow_id.clone(),
                    locked.id.clone(),
                    status,
                ),
            };
            self.instance_repo.save(&instance).await?;

            tracing::info!(
                project_id = %project_id,
                flow_id = %flow_id,
                version_id = %locked.id,
                status = instance.status.as_str(),
                "Flow published"
            );
            Ok(instance)
        })
        .await
    }

    async fn update_status(
        &self,
        project_id: &ProjectId,
        flow_id: &FlowId,
        status: FlowInstanceStatus,
    ) -> Result<FlowInstance, CoreError> {
        let mut instance = self
            .instance_repo
            .find_by_flow(project_id, flow_id)
            .await?
            .ok_or_else(|| CoreError::Validation(format!("Flow {} is not published", flow_id)))?;

        if instance.status != status {
            instance.status = status;
            instance.updated = Utc::now();
            self.instance_repo.save(&instance).await?;
            tracing::info!(flow_id = %flow_id, status = status.as_str(), "Flow status changed");
        }
        Ok(instance)
    }

    async fn on_flow_delete(
        &self,
        project_id: &ProjectId,
        flow_id: &FlowId,
    ) -> Result<(), CoreError> {
        self.require_flow(project_id, flow_id).await?;
        self.instance_repo.delete_by_flow(project_id, flow_id).await?;

        tracing::debug!(flow_id = %flow_id, "Flow instance removed");
        Ok(())
    }
}
