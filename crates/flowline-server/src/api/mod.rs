//! API module for the Flowline Server
//!
//! This module contains the API routes and handlers for the Flowline Server.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod errors;
pub mod flows;
pub mod health;
pub mod projects;
pub mod runs;

use crate::server::AppState;

/// Build the router for API endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Projects
        .route("/v1/projects", post(projects::create_project_handler))
        .route(
            "/v1/projects/:project_id",
            axum::routing::delete(projects::delete_project_handler),
        )
        // Flows
        .route(
            "/v1/projects/:project_id/flows",
            post(flows::create_flow_handler).get(flows::list_flows_handler),
        )
        .route(
            "/v1/projects/:project_id/flows/count",
            get(flows::count_flows_handler),
        )
        .route(
            "/v1/projects/:project_id/flows/:flow_id",
            get(flows::get_flow_handler)
                .post(flows::update_flow_handler)
                .delete(flows::delete_flow_handler),
        )
        .route(
            "/v1/projects/:project_id/flows/:flow_id/publish",
            post(flows::publish_flow_handler),
        )
        .route(
            "/v1/projects/:project_id/flows/:flow_id/status",
            post(flows::update_flow_status_handler),
        )
        // Flow runs
        .route(
            "/v1/projects/:project_id/flow-runs",
            post(runs::start_run_handler).get(runs::list_runs_handler),
        )
        .route(
            "/v1/projects/:project_id/flow-runs/:run_id",
            get(runs::get_run_handler),
        )
        .route(
            "/v1/projects/:project_id/flow-runs/:run_id/finish",
            post(runs::finish_run_handler),
        )
        // Health check
        .route("/health", get(health::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub use errors::*;
