//! Flow lifecycle orchestration
//!
//! [`FlowService`] composes flow records with their versions and publish
//! status. Mutation of a flow's version chain happens only inside
//! [`FlowService::update`], under the lock keyed by the flow id.

use futures::future::{try_join, try_join_all};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use super::flow_instance_service::FlowInstanceService;
use super::flow_version_service::FlowVersionService;
use super::lock::{flow_lock_key, with_lock, LockService};
use super::telemetry::{TelemetryEvent, TelemetrySink};
use crate::domain::flow::{CreateFlowRequest, Flow, PopulatedFlow};
use crate::domain::flow_version::{FlowOperationRequest, FlowVersionContent};
use crate::domain::ids::{FlowId, FlowVersionId, FolderId, ProjectId};
use crate::domain::pagination::{FolderFilter, PageRequest, SeekPage, NO_FOLDER_SENTINEL};
use crate::domain::repository::{FlowQuery, FlowRepository};
use crate::CoreError;

/// Default bound on waiting for a flow lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5000);

/// Service for the flow lifecycle
pub struct FlowService {
    flow_repo: Arc<dyn FlowRepository>,
    version_service: Arc<dyn FlowVersionService>,
    instance_service: Arc<dyn FlowInstanceService>,
    lock: Arc<dyn LockService>,
    telemetry: Arc<dyn TelemetrySink>,
    lock_timeout: Duration,
}

impl FlowService {
    /// Create a new flow service
    pub fn new(
        flow_repo: Arc<dyn FlowRepository>,
        version_service: Arc<dyn FlowVersionService>,
        instance_service: Arc<dyn FlowInstanceService>,
        lock: Arc<dyn LockService>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            flow_repo,
            version_service,
            instance_service,
            lock,
            telemetry,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Override the bound on lock acquisition
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Create a flow with an empty-trigger draft version
    pub async fn create(
        &self,
        project_id: &ProjectId,
        request: CreateFlowRequest,
    ) -> Result<PopulatedFlow, CoreError> {
        ensure_assignable_folder(request.folder_id.as_ref())?;
        let flow = Flow::new(project_id.clone(), request.folder_id);
        self.flow_repo.save(&flow).await?;

        self.version_service
            .create_version(&flow.id, FlowVersionContent::empty(request.display_name))
            .await?;

        let version = self
            .version_service
            .get_flow_version(project_id, &flow.id, None, false)
            .await?
            .ok_or_else(|| CoreError::FlowVersionNotFound {
                id: flow.id.0.clone(),
            })?;

        self.telemetry.emit(TelemetryEvent::new(
            "flow.created",
            project_id.clone(),
            json!({ "flowId": flow.id }),
        ));

        tracing::info!(project_id = %project_id, flow_id = %flow.id, "Flow created");
        Ok(PopulatedFlow::compose(flow, version, None))
    }

    /// Composed flow, or `FlowNotFound`
    pub async fn get_one_or_throw(
        &self,
        project_id: &ProjectId,
        id: &FlowId,
    ) -> Result<PopulatedFlow, CoreError> {
        self.get_one(project_id, id, None, false)
            .await?
            .ok_or_else(|| CoreError::flow_not_found(id.as_str()))
    }

    /// Composed flow at the given (or latest) version, `None` if absent
    pub async fn get_one(
        &self,
        project_id: &ProjectId,
        id: &FlowId,
        version_id: Option<FlowVersionId>,
        include_artifacts: bool,
    ) -> Result<Option<PopulatedFlow>, CoreError> {
        let flow = match self.flow_repo.find_by_id(project_id, id).await? {
            Some(flow) => flow,
            None => return Ok(None),
        };

        let missing_id = match &version_id {
            Some(version_id) => version_id.0.clone(),
            None => id.0.clone(),
        };
        let version = self
            .version_service
            .get_flow_version(project_id, id, version_id, include_artifacts)
            .await?
            .ok_or(CoreError::FlowVersionNotFound { id: missing_id })?;

        let instance = self.instance_service.get(project_id, id).await?;
        Ok(Some(PopulatedFlow::compose(flow, version, instance)))
    }

    /// One page of composed flows, newest first
    pub async fn list(
        &self,
        project_id: &ProjectId,
        page: PageRequest,
        folder: FolderFilter,
    ) -> Result<SeekPage<PopulatedFlow>, CoreError> {
        let query = FlowQuery {
            project_id: project_id.clone(),
            folder,
            page,
        };
        let SeekPage {
            data,
            next,
            previous,
        } = self.flow_repo.list(&query).await?;

        let data = try_join_all(data.into_iter().map(|flow| self.populate_latest(flow))).await?;

        Ok(SeekPage {
            data,
            next,
            previous,
        })
    }

    /// Apply an operation to a flow under its lock
    ///
    /// A LOCKED current version is forked into a new draft carrying the
    /// operation; a rejected operation leaves no draft behind. Returns `None` if the flow disappeared before
    /// it could be read back.
    pub async fn update(
        &self,
        project_id: &ProjectId,
        flow_id: &FlowId,
        operation: FlowOperationRequest,
    ) -> Result<Option<PopulatedFlow>, CoreError> {
        let key = flow_lock_key(flow_id);
        with_lock(self.lock.as_ref(), &key, self.lock_timeout, || {
            self.apply_locked(project_id, flow_id, &operation)
        })
        .await?;

        tracing::info!(
            project_id = %project_id,
            flow_id = %flow_id,
            operation = operation.kind(),
            "Flow updated"
        );
        self.get_one(project_id, flow_id, None, false).await
    }

    /// Delete a flow
    ///
    /// Instance cleanup runs first and observes the record still present.
    pub async fn delete(&self, project_id: &ProjectId, flow_id: &FlowId) -> Result<(), CoreError> {
        self.instance_service
            .on_flow_delete(project_id, flow_id)
            .await?;
        self.flow_repo.delete(project_id, flow_id).await?;

        tracing::info!(project_id = %project_id, flow_id = %flow_id, "Flow deleted");
        Ok(())
    }

    /// Number of flows in a project
    pub async fn count(
        &self,
        project_id: &ProjectId,
        folder: FolderFilter,
    ) -> Result<u64, CoreError> {
        self.flow_repo.count(project_id, &folder).await
    }

    async fn apply_locked(
        &self,
        project_id: &ProjectId,
        flow_id: &FlowId,
        operation: &FlowOperationRequest,
    ) -> Result<(), CoreError> {
        let flow = self
            .flow_repo
            .find_by_id(project_id, flow_id)
            .await?
            .ok_or_else(|| CoreError::flow_not_found(flow_id.as_str()))?;

        if let FlowOperationRequest::ChangeFolder { folder_id } = operation {
            ensure_assignable_folder(folder_id.as_ref())?;
            return self
                .flow_repo
                .update_folder(project_id, &flow.id, folder_id.clone())
                .await;
        }

        let current = self
            .version_service
            .get_latest(&flow.id)
            .await?
            .ok_or_else(|| CoreError::FlowVersionNotFound {
                id: flow.id.0.clone(),
            })?;

        if current.is_locked() && *operation == FlowOperationRequest::LockFlow {
            return Ok(());
        }

        if current.is_locked() {
            self.version_service
                .fork(project_id, &current, operation)
                .await?;
        } else {
            self.version_service
                .apply_operation(project_id, current, operation)
                .await?;
        }
        Ok(())
    }

    async fn populate_latest(&self, flow: Flow) -> Result<PopulatedFlow, CoreError> {
        let (version, instance) = try_join(
            self.version_service.get_latest(&flow.id),
            self.instance_service.get(&flow.project_id, &flow.id),
        )
        .await?;

        let version = version.ok_or_else(|| CoreError::FlowVersionNotFound {
            id: flow.id.0.clone(),
        })?;
        Ok(PopulatedFlow::compose(flow, version.without_artifacts(), instance))
    }
}

/// The no-folder sentinel is a filter value, never a folder of its own
fn ensure_assignable_folder(folder_id: Option<&FolderId>) -> Result<(), CoreError> {
    match folder_id {
        Some(id) if id.as_str() == NO_FOLDER_SENTINEL => Err(CoreError::Validation(format!(
            "{} is reserved and cannot be used as a folder id",
            NO_FOLDER_SENTINEL
        ))),
        _ => Ok(()),
    }
}
