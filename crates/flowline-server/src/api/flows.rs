//! Flow endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use flowline_core::{
    CoreError, CreateFlowRequest, FlowId, FlowInstance, FlowInstanceStatus,
    FlowOperationRequest, FlowVersionId, FolderFilter, PageRequest, PopulatedFlow, ProjectId,
    SeekPage,
};

use super::errors::ApiError;
use crate::server::AppState;

/// Query of a flow list request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFlowsQuery {
    /// Cursor from a previous page
    pub cursor: Option<String>,
    /// Page size
    pub limit: Option<usize>,
    /// Folder id, or `NULL` for flows without a folder
    pub folder_id: Option<String>,
}

/// Query of a flow count request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountFlowsQuery {
    /// Folder id, or `NULL` for flows without a folder
    pub folder_id: Option<String>,
}

/// Query of a single flow read
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetFlowQuery {
    /// Read this version instead of the latest
    pub version_id: Option<String>,
    /// Keep build artifacts in the trigger settings
    #[serde(default)]
    pub include_artifacts: bool,
}

/// Body of a publish request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishFlowRequest {
    /// Status of the published instance
    #[serde(default)]
    pub status: Option<FlowInstanceStatus>,
}

/// Body of a status change
#[derive(Debug, Deserialize)]
pub struct UpdateFlowStatusRequest {
    /// New status of the published instance
    pub status: FlowInstanceStatus,
}

/// Create a flow with an empty first version
pub async fn create_flow_handler(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(request): Json<CreateFlowRequest>,
) -> Result<(StatusCode, Json<PopulatedFlow>), ApiError> {
    let flow = state
        .flows
        .create(&ProjectId::from(project_id), request)
        .await?;
    Ok((StatusCode::CREATED, Json(flow)))
}

/// List flows newest first
pub async fn list_flows_handler(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Query(query): Query<ListFlowsQuery>,
) -> Result<Json<SeekPage<PopulatedFlow>>, ApiError> {
    let page = PageRequest::from_query(query.cursor.as_deref(), query.limit)?;
    let folder = FolderFilter::from_query(query.folder_id.as_deref());
    let flows = state
        .flows
        .list(&ProjectId::from(project_id), page, folder)
        .await?;
    Ok(Json(flows))
}

/// Count flows
pub async fn count_flows_handler(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Query(query): Query<CountFlowsQuery>,
) -> Result<Json<u64>, ApiError> {
    let folder = FolderFilter::from_query(query.folder_id.as_deref());
    let count = state
        .flows
        .count(&ProjectId::from(project_id), folder)
        .await?;
    Ok(Json(count))
}

/// Read one flow
pub async fn get_flow_handler(
    State(state): State<Arc<AppState>>,
    Path((project_id, flow_id)): Path<(String, String)>,
    Query(query): Query<GetFlowQuery>,
) -> Result<Json<PopulatedFlow>, ApiError> {
    let flow_id = FlowId::from(flow_id);
    let flow = state
        .flows
        .get_one(
            &ProjectId::from(project_id),
            &flow_id,
            query.version_id.map(FlowVersionId::from),
            query.include_artifacts,
        )
        .await?
        .ok_or_else(|| CoreError::flow_not_found(flow_id.as_str()))?;
    Ok(Json(flow))
}

/// Apply one operation to a flow
pub async fn update_flow_handler(
    State(state): State<Arc<AppState>>,
    Path((project_id, flow_id)): Path<(String, String)>,
    Json(operation): Json<FlowOperationRequest>,
) -> Result<Json<PopulatedFlow>, ApiError> {
    let flow_id = FlowId::from(flow_id);
    info!(flow_id = %flow_id, operation = operation.kind(), "Updating flow");

    let flow = state
        .flows
        .update(&ProjectId::from(project_id), &flow_id, operation)
        .await?
        .ok_or_else(|| CoreError::flow_not_found(flow_id.as_str()))?;
    Ok(Json(flow))
}

/// Delete a flow
pub async fn delete_flow_handler(
    State(state): State<Arc<AppState>>,
    Path((project_id, flow_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .flows
        .delete(&ProjectId::from(project_id), &FlowId::from(flow_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Publish the flow's latest version
pub async fn publish_flow_handler(
    State(state): State<Arc<AppState>>,
    Path((project_id, flow_id)): Path<(String, String)>,
    body: Option<Json<PublishFlowRequest>>,
) -> Result<Json<FlowInstance>, ApiError> {
    let status = body
        .and_then(|Json(request)| request.status)
        .unwrap_or(FlowInstanceStatus::Enabled);
    let instance = state
        .instances
        .publish(&ProjectId::from(project_id), &FlowId::from(flow_id), status)
        .await?;
    Ok(Json(instance))
}

/// Enable or disable a published flow
pub async fn update_flow_status_handler(
    State(state): State<Arc<AppState>>,
    Path((project_id, flow_id)): Path<(String, String)>,
    Json(request): Json<UpdateFlowStatusRequest>,
) -> Result<Json<FlowInstance>, ApiError> {
    let instance = state
        .instances
        .update_status(
            &ProjectId::from(project_id),
            &FlowId::from(flow_id),
            request.status,
        )
        .await?;
    Ok(Json(instance))
}
