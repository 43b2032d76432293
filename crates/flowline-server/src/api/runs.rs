//! Flow run endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use flowline_core::{
    FlowId, FlowRun, FlowRunId, FlowRunStatus, FlowVersionId, PageRequest, ProjectId,
    RunEnvironment, SeekPage,
};

use super::errors::ApiError;
use crate::server::AppState;

/// Body of a run start request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunRequest {
    /// Version to run
    pub flow_version_id: FlowVersionId,
    /// Environment tag
    #[serde(default)]
    pub environment: Option<RunEnvironment>,
}

/// Body of a run finish request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishRunRequest {
    /// Terminal status
    pub status: FlowRunStatus,
    /// Reference to the stored execution log
    #[serde(default)]
    pub logs_file_id: Option<String>,
}

/// Query of a run list request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRunsQuery {
    /// Only runs of this flow
    pub flow_id: Option<String>,
    /// Only runs in this status
    pub status: Option<FlowRunStatus>,
    /// Cursor from a previous page
    pub cursor: Option<String>,
    /// Page size
    pub limit: Option<usize>,
}

/// Start a run of a flow version
pub async fn start_run_handler(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(request): Json<StartRunRequest>,
) -> Result<(StatusCode, Json<FlowRun>), ApiError> {
    let run = state
        .runs
        .start(
            &ProjectId::from(project_id),
            &request.flow_version_id,
            request.environment,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(run)))
}

/// Move a run to its terminal status
pub async fn finish_run_handler(
    State(state): State<Arc<AppState>>,
    Path((project_id, run_id)): Path<(String, String)>,
    Json(request): Json<FinishRunRequest>,
) -> Result<Json<FlowRun>, ApiError> {
    let run = state
        .runs
        .finish(
            &ProjectId::from(project_id),
            &FlowRunId::from(run_id),
            request.status,
            request.logs_file_id,
        )
        .await?;
    Ok(Json(run))
}

/// Read one run
pub async fn get_run_handler(
    State(state): State<Arc<AppState>>,
    Path((project_id, run_id)): Path<(String, String)>,
) -> Result<Json<FlowRun>, ApiError> {
    let run = state
        .runs
        .get_one(&ProjectId::from(project_id), &FlowRunId::from(run_id))
        .await?;
    Ok(Json(run))
}

/// List runs newest first
pub async fn list_runs_handler(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<SeekPage<FlowRun>>, ApiError> {
    let page = PageRequest::from_query(query.cursor.as_deref(), query.limit)?;
    let runs = state
        .runs
        .list(
            &ProjectId::from(project_id),
            query.flow_id.map(FlowId::from),
            query.status,
            page,
        )
        .await?;
    Ok(Json(runs))
}
