//! Project endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use flowline_core::{Project, ProjectId};

use super::errors::ApiError;
use crate::server::AppState;

/// Body of a project create request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    /// Human-readable name
    pub display_name: String,
}

/// Create a project
pub async fn create_project_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    if request.display_name.trim().is_empty() {
        return Err(ApiError::BadRequest("displayName must not be empty".to_string()));
    }

    let project = Project::new(request.display_name);
    state.projects.save(&project).await?;
    info!(project_id = %project.id, "Project created");

    Ok((StatusCode::CREATED, Json(project)))
}

/// Delete a project with everything it owns
pub async fn delete_project_handler(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let project_id = ProjectId::from(project_id);
    if !state.projects.delete(&project_id).await? {
        return Err(ApiError::NotFound(format!("Project {}", project_id)));
    }

    info!(project_id = %project_id, "Project deleted");
    Ok(StatusCode::NO_CONTENT)
}
