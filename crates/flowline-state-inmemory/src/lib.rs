//! In-memory state store implementation for Flowline
//!
//! This crate provides in-memory implementations of the repository traits
//! defined in `flowline-core`. It is useful for development, testing and
//! single-node deployments where persistence is not required.
//!
//! All repositories created by one [`InMemoryStateStoreProvider`] share the
//! same tables, so deleting a project or a flow cascades the same way the
//! relational backend does.

use flowline_core::{
    FlowInstanceRepository, FlowRepository, FlowRunRepository, FlowVersionRepository,
    ProjectRepository,
};
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod repositories;
pub use repositories::{
    InMemoryFlowInstanceRepository, InMemoryFlowRepository, InMemoryFlowRunRepository,
    InMemoryFlowVersionRepository, InMemoryProjectRepository,
};

mod tables;
pub(crate) use tables::Tables;

/// The full set of repositories over one store
#[derive(Clone)]
pub struct InMemoryRepositories {
    /// Projects
    pub projects: Arc<dyn ProjectRepository>,
    /// Flow records
    pub flows: Arc<dyn FlowRepository>,
    /// Flow versions
    pub versions: Arc<dyn FlowVersionRepository>,
    /// Flow instances
    pub instances: Arc<dyn FlowInstanceRepository>,
    /// Flow runs
    pub runs: Arc<dyn FlowRunRepository>,
}

/// Provider for in-memory repositories
#[derive(Clone, Default)]
pub struct InMemoryStateStoreProvider {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStateStoreProvider {
    /// Create a provider over empty tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Create repositories sharing this provider's tables
    pub fn create_repositories(&self) -> InMemoryRepositories {
        InMemoryRepositories {
            projects: Arc::new(InMemoryProjectRepository::new(self.tables.clone())),
            flows: Arc::new(InMemoryFlowRepository::new(self.tables.clone())),
            versions: Arc::new(InMemoryFlowVersionRepository::new(self.tables.clone())),
            instances: Arc::new(InMemoryFlowInstanceRepository::new(self.tables.clone())),
            runs: Arc::new(InMemoryFlowRunRepository::new(self.tables.clone())),
        }
    }
}

#[cfg(test)]
mod tests;
