use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::debug;

use flowline_core::domain::pagination::CursorDirection;
use flowline_core::{
    CoreError, Flow, FlowId, FlowInstance, FlowInstanceId, FlowInstanceRepository,
    FlowInstanceStatus, FlowQuery, FlowRepository, FlowRun, FlowRunId, FlowRunRepository,
    FlowRunStatus, FlowVersion, FlowVersionId, FlowVersionRepository, FlowVersionState,
    FolderFilter, FolderId, PageRequest, Project, ProjectId, ProjectRepository, RunEnvironment,
    RunQuery, SeekPage, Trigger,
};

use crate::PostgresConnection;

const FLOW_COLUMNS: &str = "id, project_id, folder_id, created, updated";
const VERSION_COLUMNS: &str = "id, flow_id, display_name, trigger, valid, state, created, updated";
const INSTANCE_COLUMNS: &str = "id, project_id, flow_id, flow_version_id, status, created, updated";
const RUN_COLUMNS: &str = "id, project_id, flow_id, flow_version_id, environment, flow_display_name, logs_file_id, status, start_time, finish_time";

fn db_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> CoreError {
    move |e| CoreError::StateStore(format!("{}: {}", context, e))
}

/// Name of the violated constraint when `e` is a foreign key violation
fn violated_foreign_key(e: &sqlx::Error) -> Option<String> {
    let db = e.as_database_error()?;
    if db.code().as_deref() == Some("23503") {
        Some(db.constraint().unwrap_or_default().to_string())
    } else {
        None
    }
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, CoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| CoreError::StateStore(format!("Failed to read column {}: {}", column, e)))
}

fn get_enum<T>(row: &PgRow, column: &str, parse: fn(&str) -> Option<T>) -> Result<T, CoreError> {
    let raw: String = get(row, column)?;
    parse(&raw)
        .ok_or_else(|| CoreError::Serialization(format!("Unknown {} value: {}", column, raw)))
}

fn push_folder_filter(builder: &mut QueryBuilder<'_, Postgres>, folder: &FolderFilter) {
    match folder {
        FolderFilter::Any => {}
        FolderFilter::None => {
            builder.push(" AND folder_id IS NULL");
        }
        FolderFilter::Specific(id) => {
            builder.push(" AND folder_id = ").push_bind(id.0.clone());
        }
    }
}

/// Seek condition, ordering and limit for a page keyed on `(created_column, id)`
fn push_seek(builder: &mut QueryBuilder<'_, Postgres>, page: &PageRequest, created_column: &str) {
    if let Some(cursor) = &page.cursor {
        let op = match cursor.direction {
            CursorDirection::Next => "<",
            CursorDirection::Previous => ">",
        };
        builder
            .push(format!(" AND ({}, id) {} (", created_column, op))
            .push_bind(cursor.created)
            .push(", ")
            .push_bind(cursor.id.clone())
            .push(")");
    }

    let order = match page.direction() {
        CursorDirection::Next => "DESC",
        CursorDirection::Previous => "ASC",
    };
    builder
        .push(format!(" ORDER BY {} {}, id {} LIMIT ", created_column, order, order))
        .push_bind(page.fetch_limit() as i64);
}

fn project_from_row(row: &PgRow) -> Result<Project, CoreError> {
    Ok(Project {
        id: ProjectId(get(row, "id")?),
        display_name: get(row, "display_name")?,
        created: get(row, "created")?,
    })
}

fn flow_from_row(row: &PgRow) -> Result<Flow, CoreError> {
    Ok(Flow {
        id: FlowId(get(row, "id")?),
        project_id: ProjectId(get(row, "project_id")?),
        folder_id: get::<Option<String>>(row, "folder_id")?.map(FolderId),
        created: get(row, "created")?,
        updated: get(row, "updated")?,
    })
}

fn version_from_row(row: &PgRow) -> Result<FlowVersion, CoreError> {
    let trigger: Json<Trigger> = get(row, "trigger")?;
    Ok(FlowVersion {
        id: FlowVersionId(get(row, "id")?),
        flow_id: FlowId(get(row, "flow_id")?),
        display_name: get(row, "display_name")?,
        trigger: trigger.0,
        valid: get(row, "valid")?,
        state: get_enum(row, "state", FlowVersionState::parse)?,
        created: get(row, "created")?,
        updated: get(row, "updated")?,
    })
}

fn instance_from_row(row: &PgRow) -> Result<FlowInstance, CoreError> {
    Ok(FlowInstance {
        id: FlowInstanceId(get(row, "id")?),
        project_id: ProjectId(get(row, "project_id")?),
        flow_id: FlowId(get(row, "flow_id")?),
        flow_version_id: FlowVersionId(get(row, "flow_version_id")?),
        status: get_enum(row, "status", FlowInstanceStatus::parse)?,
        created: get(row, "created")?,
        updated: get(row, "updated")?,
    })
}

fn run_from_row(row: &PgRow) -> Result<FlowRun, CoreError> {
    let environment = match get::<Option<String>>(row, "environment")? {
        Some(raw) => Some(RunEnvironment::parse(&raw).ok_or_else(|| {
            CoreError::Serialization(format!("Unknown environment value: {}", raw))
        })?),
        None => None,
    };

    Ok(FlowRun {
        id: FlowRunId(get(row, "id")?),
        project_id: ProjectId(get(row, "project_id")?),
        flow_id: FlowId(get(row, "flow_id")?),
        flow_version_id: FlowVersionId(get(row, "flow_version_id")?),
        environment,
        flow_display_name: get(row, "flow_display_name")?,
        logs_file_id: get(row, "logs_file_id")?,
        status: get_enum(row, "status", FlowRunStatus::parse)?,
        start_time: get(row, "start_time")?,
        finish_time: get(row, "finish_time")?,
    })
}

/// Postgres implementation of the ProjectRepository
#[derive(Clone)]
pub struct PostgresProjectRepository {
    conn: PostgresConnection,
}

impl PostgresProjectRepository {
    /// Create a new Postgres project repository
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ProjectRepository for PostgresProjectRepository {
    async fn save(&self, project: &Project) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO projects (id, display_name, created) VALUES ($1, $2, $3)
             ON CONFLICT (id) DO UPDATE SET display_name = EXCLUDED.display_name",
        )
        .bind(&project.id.0)
        .bind(&project.display_name)
        .bind(project.created)
        .execute(self.conn.pool())
        .await
        .map_err(db_err("Failed to save project"))?;
        Ok(())
    }

    async fn find_by_id(&self, id: &ProjectId) -> Result<Option<Project>, CoreError> {
        let row = sqlx::query("SELECT id, display_name, created FROM projects WHERE id = $1")
            .bind(&id.0)
            .fetch_optional(self.conn.pool())
            .await
            .map_err(db_err("Failed to load project"))?;
        row.as_ref().map(project_from_row).transpose()
    }

    async fn delete(&self, id: &ProjectId) -> Result<bool, CoreError> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(&id.0)
            .execute(self.conn.pool())
            .await
            .map_err(db_err("Failed to delete project"))?;
        debug!(project_id = %id, rows = result.rows_affected(), "Deleted project");
        Ok(result.rows_affected() > 0)
    }
}

/// Postgres implementation of the FlowRepository
#[derive(Clone)]
pub struct PostgresFlowRepository {
    conn: PostgresConnection,
}

impl PostgresFlowRepository {
    /// Create a new Postgres flow repository
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl FlowRepository for PostgresFlowRepository {
    async fn save(&self, flow: &Flow) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO flows (id, project_id, folder_id, created, updated)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO UPDATE SET folder_id = EXCLUDED.folder_id, updated = EXCLUDED.updated",
        )
        .bind(&flow.id.0)
        .bind(&flow.project_id.0)
        .bind(flow.folder_id.as_ref().map(|id| id.0.as_str()))
        .bind(flow.created)
        .bind(flow.updated)
        .execute(self.conn.pool())
        .await
        .map_err(|e| match violated_foreign_key(&e) {
            Some(_) => CoreError::ProjectNotFound {
                id: flow.project_id.0.clone(),
            },
            None => CoreError::StateStore(format!("Failed to save flow: {}", e)),
        })?;
        Ok(())
    }

    async fn find_by_id(
        &self,
        project_id: &ProjectId,
        id: &FlowId,
    ) -> Result<Option<Flow>, CoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM flows WHERE id = $1 AND project_id = $2",
            FLOW_COLUMNS
        ))
        .bind(&id.0)
        .bind(&project_id.0)
        .fetch_optional(self.conn.pool())
        .await
        .map_err(db_err("Failed to load flow"))?;
        row.as_ref().map(flow_from_row).transpose()
    }

    async fn update_folder(
        &self,
        project_id: &ProjectId,
        id: &FlowId,
        folder_id: Option<FolderId>,
    ) -> Result<(), CoreError> {
        let result = sqlx::query(
            "UPDATE flows SET folder_id = $1, updated = NOW() WHERE id = $2 AND project_id = $3",
        )
        .bind(folder_id.map(|id| id.0))
        .bind(&id.0)
        .bind(&project_id.0)
        .execute(self.conn.pool())
        .await
        .map_err(db_err("Failed to update flow folder"))?;

        if result.rows_affected() == 0 {
            return Err(CoreError::flow_not_found(id.as_str()));
        }
        Ok(())
    }

    async fn delete(&self, project_id: &ProjectId, id: &FlowId) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM flows WHERE id = $1 AND project_id = $2")
            .bind(&id.0)
            .bind(&project_id.0)
            .execute(self.conn.pool())
            .await
            .map_err(db_err("Failed to delete flow"))?;
        debug!(flow_id = %id, "Deleted flow");
        Ok(())
    }

    async fn count(
        &self,
        project_id: &ProjectId,
        folder: &FolderFilter,
    ) -> Result<u64, CoreError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM flows WHERE project_id = ");
        builder.push_bind(project_id.0.clone());
        push_folder_filter(&mut builder, folder);

        let row = builder
            .build()
            .fetch_one(self.conn.pool())
            .await
            .map_err(db_err("Failed to count flows"))?;
        let count: i64 = row
            .try_get(0)
            .map_err(db_err("Failed to read flow count"))?;
        Ok(count as u64)
    }

    async fn list(&self, query: &FlowQuery) -> Result<SeekPage<Flow>, CoreError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM flows WHERE project_id = ",
            FLOW_COLUMNS
        ));
        builder.push_bind(query.project_id.0.clone());
        push_folder_filter(&mut builder, &query.folder);
        push_seek(&mut builder, &query.page, "created");

        let rows = builder
            .build()
            .fetch_all(self.conn.pool())
            .await
            .map_err(db_err("Failed to list flows"))?;
        let flows = rows.iter().map(flow_from_row).collect::<Result<Vec<_>, _>>()?;

        Ok(SeekPage::from_rows(flows, &query.page, |flow| {
            (flow.created, flow.id.0.clone())
        }))
    }
}

/// Postgres implementation of the FlowVersionRepository
#[derive(Clone)]
pub struct PostgresFlowVersionRepository {
    conn: PostgresConnection,
}

impl PostgresFlowVersionRepository {
    /// Create a new Postgres flow version repository
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl FlowVersionRepository for PostgresFlowVersionRepository {
    async fn save(&self, version: &FlowVersion) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO flow_versions (id, flow_id, display_name, trigger, valid, state, created, updated)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (id) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                trigger = EXCLUDED.trigger,
                valid = EXCLUDED.valid,
                state = EXCLUDED.state,
                updated = EXCLUDED.updated",
        )
        .bind(&version.id.0)
        .bind(&version.flow_id.0)
        .bind(&version.display_name)
        .bind(Json(&version.trigger))
        .bind(version.valid)
        .bind(version.state.as_str())
        .bind(version.created)
        .bind(version.updated)
        .execute(self.conn.pool())
        .await
        .map_err(|e| match violated_foreign_key(&e) {
            Some(_) => CoreError::flow_not_found(version.flow_id.as_str()),
            None => CoreError::StateStore(format!("Failed to save flow version: {}", e)),
        })?;
        Ok(())
    }

    async fn find_by_id(&self, id: &FlowVersionId) -> Result<Option<FlowVersion>, CoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM flow_versions WHERE id = $1",
            VERSION_COLUMNS
        ))
        .bind(&id.0)
        .fetch_optional(self.conn.pool())
        .await
        .map_err(db_err("Failed to load flow version"))?;
        row.as_ref().map(version_from_row).transpose()
    }

    async fn find_latest(&self, flow_id: &FlowId) -> Result<Option<FlowVersion>, CoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM flow_versions WHERE flow_id = $1 ORDER BY seq DESC LIMIT 1",
            VERSION_COLUMNS
        ))
        .bind(&flow_id.0)
        .fetch_optional(self.conn.pool())
        .await
        .map_err(db_err("Failed to load latest flow version"))?;
        row.as_ref().map(version_from_row).transpose()
    }
}

/// Postgres implementation of the FlowInstanceRepository
#[derive(Clone)]
pub struct PostgresFlowInstanceRepository {
    conn: PostgresConnection,
}

impl PostgresFlowInstanceRepository {
    /// Create a new Postgres flow instance repository
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl FlowInstanceRepository for PostgresFlowInstanceRepository {
    async fn find_by_flow(
        &self,
        project_id: &ProjectId,
        flow_id: &FlowId,
    ) -> Result<Option<FlowInstance>, CoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM flow_instances WHERE flow_id = $1 AND project_id = $2",
            INSTANCE_COLUMNS
        ))
        .bind(&flow_id.0)
        .bind(&project_id.0)
        .fetch_optional(self.conn.pool())
        .await
        .map_err(db_err("Failed to load flow instance"))?;
        row.as_ref().map(instance_from_row).transpose()
    }

    async fn save(&self, instance: &FlowInstance) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO flow_instances (id, project_id, flow_id, flow_version_id, status, created, updated)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (flow_id) DO UPDATE SET
                flow_version_id = EXCLUDED.flow_version_id,
                status = EXCLUDED.status,
                updated = EXCLUDED.updated",
        )
        .bind(&instance.id.0)
        .bind(&instance.project_id.0)
        .bind(&instance.flow_id.0)
        .bind(&instance.flow_version_id.0)
        .bind(instance.status.as_str())
        .bind(instance.created)
        .bind(instance.updated)
        .execute(self.conn.pool())
        .await
        .map_err(db_err("Failed to save flow instance"))?;
        Ok(())
    }

    async fn delete_by_flow(
        &self,
        project_id: &ProjectId,
        flow_id: &FlowId,
    ) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM flow_instances WHERE flow_id = $1 AND project_id = $2")
            .bind(&flow_id.0)
            .bind(&project_id.0)
            .execute(self.conn.pool())
            .await
            .map_err(db_err("Failed to delete flow instance"))?;
        Ok(())
    }
}

/// Postgres implementation of the FlowRunRepository
#[derive(Clone)]
pub struct PostgresFlowRunRepository {
    conn: PostgresConnection,
}

impl PostgresFlowRunRepository {
    /// Create a new Postgres flow run repository
    pub fn new(conn: PostgresConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl FlowRunRepository for PostgresFlowRunRepository {
    async fn save(&self, run: &FlowRun) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO flow_runs (id, project_id, flow_id, flow_version_id, environment,
                flow_display_name, logs_file_id, status, start_time, finish_time)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (id) DO UPDATE SET
                logs_file_id = EXCLUDED.logs_file_id,
                status = EXCLUDED.status,
                finish_time = EXCLUDED.finish_time
             WHERE flow_runs.finish_time IS NULL",
        )
        .bind(&run.id.0)
        .bind(&run.project_id.0)
        .bind(&run.flow_id.0)
        .bind(&run.flow_version_id.0)
        .bind(run.environment.map(|env| env.as_str()))
        .bind(&run.flow_display_name)
        .bind(run.logs_file_id.as_deref())
        .bind(run.status.as_str())
        .bind(run.start_time)
        .bind(run.finish_time)
        .execute(self.conn.pool())
        .await
        .map_err(|e| match violated_foreign_key(&e).as_deref() {
            Some("fk_flow_runs_project_id") => CoreError::ProjectNotFound {
                id: run.project_id.0.clone(),
            },
            Some(_) => CoreError::flow_not_found(run.flow_id.as_str()),
            None => CoreError::StateStore(format!("Failed to save flow run: {}", e)),
        })?;
        Ok(())
    }

    async fn find_by_id(
        &self,
        project_id: &ProjectId,
        id: &FlowRunId,
    ) -> Result<Option<FlowRun>, CoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM flow_runs WHERE id = $1 AND project_id = $2",
            RUN_COLUMNS
        ))
        .bind(&id.0)
        .bind(&project_id.0)
        .fetch_optional(self.conn.pool())
        .await
        .map_err(db_err("Failed to load flow run"))?;
        row.as_ref().map(run_from_row).transpose()
    }

    async fn finish(&self, run: &FlowRun) -> Result<(), CoreError> {
        let result = sqlx::query(
            "UPDATE flow_runs SET status = $2, logs_file_id = $3, finish_time = $4
             WHERE id = $1 AND project_id = $5 AND finish_time IS NULL",
        )
        .bind(&run.id.0)
        .bind(run.status.as_str())
        .bind(run.logs_file_id.as_deref())
        .bind(run.finish_time)
        .bind(&run.project_id.0)
        .execute(self.conn.pool())
        .await
        .map_err(db_err("Failed to finish flow run"))?;

        if result.rows_affected() == 0 {
            return Err(match self.find_by_id(&run.project_id, &run.id).await? {
                Some(_) => CoreError::RunAlreadyFinished {
                    id: run.id.0.clone(),
                },
                None => CoreError::FlowRunNotFound {
                    id: run.id.0.clone(),
                },
            });
        }
        debug!(run_id = %run.id, status = run.status.as_str(), "Finished flow run");
        Ok(())
    }

    async fn list(&self, query: &RunQuery) -> Result<SeekPage<FlowRun>, CoreError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM flow_runs WHERE project_id = ",
            RUN_COLUMNS
        ));
        builder.push_bind(query.project_id.0.clone());
        if let Some(flow_id) = &query.flow_id {
            builder.push(" AND flow_id = ").push_bind(flow_id.0.clone());
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        push_seek(&mut builder, &query.page, "start_time");

        let rows = builder
            .build()
            .fetch_all(self.conn.pool())
            .await
            .map_err(db_err("Failed to list flow runs"))?;
        let runs = rows.iter().map(run_from_row).collect::<Result<Vec<_>, _>>()?;

        Ok(SeekPage::from_rows(runs, &query.page, |run| {
            (run.start_time, run.id.0.clone())
        }))
    }
}
