use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use flowline_core::{
    CoreError, Flow, FlowId, FlowInstance, FlowInstanceRepository, FlowQuery, FlowRepository,
    FlowRun, FlowRunId, FlowRunRepository, FlowVersion, FlowVersionId, FlowVersionRepository,
    FolderFilter, FolderId, Project, ProjectId, ProjectRepository, RunQuery, SeekPage,
};

use crate::Tables;

fn require_project(tables: &Tables, project_id: &ProjectId) -> Result<(), CoreError> {
    if tables.projects.contains_key(project_id.as_str()) {
        Ok(())
    } else {
        Err(CoreError::ProjectNotFound {
            id: project_id.0.clone(),
        })
    }
}

/// In-memory implementation of the ProjectRepository
pub struct InMemoryProjectRepository {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryProjectRepository {
    /// Create a new in-memory project repository
    pub(crate) fn new(tables: Arc<RwLock<Tables>>) -> Self {
        Self { tables }
    }
}

#[async_trait]
impl ProjectRepository for InMemoryProjectRepository {
    async fn save(&self, project: &Project) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        tables
            .projects
            .insert(project.id.0.clone(), project.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &ProjectId) -> Result<Option<Project>, CoreError> {
        let tables = self.tables.read().await;
        Ok(tables.projects.get(id.as_str()).cloned())
    }

    async fn delete(&self, id: &ProjectId) -> Result<bool, CoreError> {
        let mut tables = self.tables.write().await;
        let existed = tables.projects.contains_key(id.as_str());
        tables.delete_project_cascade(id);
        debug!(project_id = %id, existed, "Deleted project");
        Ok(existed)
    }
}

/// In-memory implementation of the FlowRepository
pub struct InMemoryFlowRepository {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryFlowRepository {
    /// Create a new in-memory flow repository
    pub(crate) fn new(tables: Arc<RwLock<Tables>>) -> Self {
        Self { tables }
    }
}

#[async_trait]
impl FlowRepository for InMemoryFlowRepository {
    async fn save(&self, flow: &Flow) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        require_project(&tables, &flow.project_id)?;
        tables.flows.insert(flow.id.0.clone(), flow.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        project_id: &ProjectId,
        id: &FlowId,
    ) -> Result<Option<Flow>, CoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .flows
            .get(id.as_str())
            .filter(|flow| flow.project_id == *project_id)
            .cloned())
    }

    async fn update_folder(
        &self,
        project_id: &ProjectId,
        id: &FlowId,
        folder_id: Option<FolderId>,
    ) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        match tables
            .flows
            .get_mut(id.as_str())
            .filter(|flow| flow.project_id == *project_id)
        {
            Some(flow) => {
                flow.folder_id = folder_id;
                flow.updated = chrono::Utc::now();
                Ok(())
            }
            None => Err(CoreError::flow_not_found(id.as_str())),
        }
    }

    async fn delete(&self, project_id: &ProjectId, id: &FlowId) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        let owned = tables
            .flows
            .get(id.as_str())
            .map_or(false, |flow| flow.project_id == *project_id);
        if owned {
            tables.delete_flow_cascade(id);
            debug!(flow_id = %id, "Deleted flow");
        }
        Ok(())
    }

    async fn count(
        &self,
        project_id: &ProjectId,
        folder: &FolderFilter,
    ) -> Result<u64, CoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .flows
            .values()
            .filter(|flow| flow.project_id == *project_id && folder.matches(flow.folder_id.as_ref()))
            .count() as u64)
    }

    async fn list(&self, query: &FlowQuery) -> Result<SeekPage<Flow>, CoreError> {
        let tables = self.tables.read().await;
        let flows: Vec<Flow> = tables
            .flows
            .values()
            .filter(|flow| {
                flow.project_id == query.project_id && query.folder.matches(flow.folder_id.as_ref())
            })
            .cloned()
            .collect();

        Ok(SeekPage::select(flows, &query.page, |flow| {
            (flow.created, flow.id.0.clone())
        }))
    }
}

/// In-memory implementation of the FlowVersionRepository
pub struct InMemoryFlowVersionRepository {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryFlowVersionRepository {
    /// Create a new in-memory flow version repository
    pub(crate) fn new(tables: Arc<RwLock<Tables>>) -> Self {
        Self { tables }
    }
}

#[async_trait]
impl FlowVersionRepository for InMemoryFlowVersionRepository {
    async fn save(&self, version: &FlowVersion) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        let existing = tables.versions.get(version.id.as_str()).map(|(seq, _)| *seq);
        let seq = match existing {
            Some(seq) => seq,
            None => {
                tables.next_seq += 1;
                tables.next_seq
            }
        };
        tables
            .versions
            .insert(version.id.0.clone(), (seq, version.clone()));
        Ok(())
    }

    async fn find_by_id(&self, id: &FlowVersionId) -> Result<Option<FlowVersion>, CoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .versions
            .get(id.as_str())
            .map(|(_, version)| version.clone()))
    }

    async fn find_latest(&self, flow_id: &FlowId) -> Result<Option<FlowVersion>, CoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .versions
            .values()
            .filter(|(_, version)| version.flow_id == *flow_id)
            .max_by_key(|(seq, _)| *seq)
            .map(|(_, version)| version.clone()))
    }
}

/// In-memory implementation of the FlowInstanceRepository
pub struct InMemoryFlowInstanceRepository {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryFlowInstanceRepository {
    /// Create a new in-memory flow instance repository
    pub(crate) fn new(tables: Arc<RwLock<Tables>>) -> Self {
        Self { tables }
    }
}

#[async_trait]
impl FlowInstanceRepository for InMemoryFlowInstanceRepository {
    async fn find_by_flow(
        &self,
        project_id: &ProjectId,
        flow_id: &FlowId,
    ) -> Result<Option<FlowInstance>, CoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .instances
            .get(flow_id.as_str())
            .filter(|instance| instance.project_id == *project_id)
            .cloned())
    }

    async fn save(&self, instance: &FlowInstance) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        tables
            .instances
            .insert(instance.flow_id.0.clone(), instance.clone());
        Ok(())
    }

    async fn delete_by_flow(
        &self,
        project_id: &ProjectId,
        flow_id: &FlowId,
    ) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        let owned = tables
            .instances
            .get(flow_id.as_str())
            .map_or(false, |instance| instance.project_id == *project_id);
        if owned {
            tables.instances.remove(flow_id.as_str());
        }
        Ok(())
    }
}

/// In-memory implementation of the FlowRunRepository
pub struct InMemoryFlowRunRepository {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryFlowRunRepository {
    /// Create a new in-memory flow run repository
    pub(crate) fn new(tables: Arc<RwLock<Tables>>) -> Self {
        Self { tables }
    }
}

#[async_trait]
impl FlowRunRepository for InMemoryFlowRunRepository {
    async fn save(&self, run: &FlowRun) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        require_project(&tables, &run.project_id)?;
        if !tables.flows.contains_key(run.flow_id.as_str()) {
            return Err(CoreError::flow_not_found(run.flow_id.as_str()));
        }
        tables.runs.insert(run.id.0.clone(), run.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        project_id: &ProjectId,
        id: &FlowRunId,
    ) -> Result<Option<FlowRun>, CoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .runs
            .get(id.as_str())
            .filter(|run| run.project_id == *project_id)
            .cloned())
    }

    async fn finish(&self, run: &FlowRun) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .runs
            .get_mut(run.id.as_str())
            .filter(|stored| stored.project_id == run.project_id)
            .ok_or_else(|| CoreError::FlowRunNotFound {
                id: run.id.0.clone(),
            })?;
        if stored.is_finished() {
            return Err(CoreError::RunAlreadyFinished {
                id: run.id.0.clone(),
            });
        }

        stored.status = run.status;
        stored.logs_file_id = run.logs_file_id.clone();
        stored.finish_time = run.finish_time;
        debug!(run_id = %run.id, status = run.status.as_str(), "Finished flow run");
        Ok(())
    }

    async fn list(&self, query: &RunQuery) -> Result<SeekPage<FlowRun>, CoreError> {
        let tables = self.tables.read().await;
        let runs: Vec<FlowRun> = tables
            .runs
            .values()
            .filter(|run| run.project_id == query.project_id)
            .filter(|run| query.flow_id.as_ref().map_or(true, |id| run.flow_id == *id))
            .filter(|run| query.status.map_or(true, |status| run.status == status))
            .cloned()
            .collect();

        Ok(SeekPage::select(runs, &query.page, |run| {
            (run.start_time, run.id.0.clone())
        }))
    }
}
