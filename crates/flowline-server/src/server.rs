//! Flowline Server wiring
//!
//! Builds the repositories, lock and services selected by [`ServerConfig`]
//! and serves the API router.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

use flowline_core::{
    FlowInstanceRepository, FlowInstanceService, FlowRepository, FlowRunRepository,
    FlowRunService, FlowService, FlowVersionRepository, FlowVersionService, InMemoryLockService,
    LockService, PersistentFlowInstanceService, PersistentFlowVersionService, ProjectRepository,
    TelemetrySink,
};
use flowline_monitoring::TracingTelemetrySink;
use flowline_state_inmemory::{InMemoryRepositories, InMemoryStateStoreProvider};

use crate::config::{LockBackend, ServerConfig};
use crate::error::{ServerError, ServerResult};

/// Repositories backing one server
#[derive(Clone)]
pub struct StateRepositories {
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

impl From<InMemoryRepositories> for StateRepositories {
    fn from(repos: InMemoryRepositories) -> Self {
        Self {
            projects: repos.projects,
            flows: repos.flows,
            versions: repos.versions,
            instances: repos.instances,
            runs: repos.runs,
        }
    }
}

#[cfg(feature = "postgres")]
impl From<flowline_state_postgres::PostgresRepositories> for StateRepositories {
    fn from(repos: flowline_state_postgres::PostgresRepositories) -> Self {
        Self {
            projects: repos.projects,
            flows: repos.flows,
            versions: repos.versions,
            instances: repos.instances,
            runs: repos.runs,
        }
    }
}

/// Services shared by all request handlers
pub struct AppState {
    /// Project records
    pub projects: Arc<dyn ProjectRepository>,
    /// Flow lifecycle
    pub flows: FlowService,
    /// Publish status
    pub instances: Arc<dyn FlowInstanceService>,
    /// Run bookkeeping
    pub runs: FlowRunService,
}

impl AppState {
    /// Wire the services over the given repositories and lock
    pub fn new(
        repos: StateRepositories,
        lock: Arc<dyn LockService>,
        telemetry: Arc<dyn TelemetrySink>,
        lock_timeout: Duration,
    ) -> Self {
        let versions: Arc<dyn FlowVersionService> = Arc::new(PersistentFlowVersionService::new(
            repos.flows.clone(),
            repos.versions.clone(),
        ));
        let instances: Arc<dyn FlowInstanceService> = Arc::new(
            PersistentFlowInstanceService::new(
                repos.flows.clone(),
                repos.instances.clone(),
                versions.clone(),
                lock.clone(),
            )
            .with_lock_timeout(lock_timeout),
        );
        let flows = FlowService::new(
            repos.flows.clone(),
            versions,
            instances.clone(),
            lock,
            telemetry,
        )
        .with_lock_timeout(lock_timeout);
        let runs = FlowRunService::new(repos.flows, repos.versions, repos.runs);

        Self {
            projects: repos.projects,
            flows,
            instances,
            runs,
        }
    }

    /// Single-node state over fresh in-memory tables
    pub fn in_memory(lock_timeout: Duration) -> Self {
        let repos = InMemoryStateStoreProvider::new().create_repositories();
        Self::new(
            repos.into(),
            Arc::new(InMemoryLockService::new()),
            Arc::new(TracingTelemetrySink::new()),
            lock_timeout,
        )
    }

    /// Build the state selected by the configuration
    pub async fn from_config(config: &ServerConfig) -> ServerResult<Self> {
        let telemetry: Arc<dyn TelemetrySink> = Arc::new(TracingTelemetrySink::new());

        if config.state_store_url.starts_with("memory://") {
            info!("Using in-memory state store");
            let repos = InMemoryStateStoreProvider::new().create_repositories();
            let lock = build_lock(config, None).await?;
            return Ok(Self::new(repos.into(), lock, telemetry, config.lock_timeout()));
        }

        if config.uses_postgres() {
            return Self::from_postgres(config, telemetry).await;
        }

        Err(ServerError::ConfigError(format!(
            "Unsupported state store URL: {}",
            config.state_store_url
        )))
    }

    #[cfg(feature = "postgres")]
    async fn from_postgres(
        config: &ServerConfig,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> ServerResult<Self> {
        use flowline_state_postgres::{PostgresConfig, PostgresStateStoreProvider};

        info!("Using PostgreSQL state store");
        let provider = PostgresStateStoreProvider::with_config(PostgresConfig {
            connection_string: config.state_store_url.clone(),
            max_connections: config.state_store_max_connections,
            ..Default::default()
        })
        .await?;
        let lock = build_lock(config, Some(&provider)).await?;
        Ok(Self::new(
            provider.create_repositories().into(),
            lock,
            telemetry,
            config.lock_timeout(),
        ))
    }

    #[cfg(not(feature = "postgres"))]
    async fn from_postgres(
        _config: &ServerConfig,
        _telemetry: Arc<dyn TelemetrySink>,
    ) -> ServerResult<Self> {
        Err(ServerError::ConfigError(
            "PostgreSQL support is not compiled in; enable the `postgres` feature".to_string(),
        ))
    }

    /// Whether the state store answers a read
    pub async fn state_store_healthy(&self) -> bool {
        self.projects
            .find_by_id(&"health-check".into())
            .await
            .is_ok()
    }
}

#[cfg(feature = "postgres")]
type PostgresProvider = flowline_state_postgres::PostgresStateStoreProvider;
#[cfg(not(feature = "postgres"))]
type PostgresProvider = ();

async fn build_lock(
    config: &ServerConfig,
    postgres: Option<&PostgresProvider>,
) -> ServerResult<Arc<dyn LockService>> {
    match config.lock_backend {
        LockBackend::Memory => {
            info!("Using in-memory flow lock");
            Ok(Arc::new(InMemoryLockService::new()))
        }
        LockBackend::Postgres => postgres_lock(postgres),
        LockBackend::Redis => redis_lock(config).await,
    }
}

#[cfg(feature = "postgres")]
fn postgres_lock(postgres: Option<&PostgresProvider>) -> ServerResult<Arc<dyn LockService>> {
    let provider = postgres.ok_or_else(|| {
        ServerError::ConfigError(
            "The postgres lock backend requires a postgres state store".to_string(),
        )
    })?;
    info!("Using PostgreSQL advisory flow lock");
    Ok(Arc::new(provider.lock_service()))
}

#[cfg(not(feature = "postgres"))]
fn postgres_lock(_postgres: Option<&PostgresProvider>) -> ServerResult<Arc<dyn LockService>> {
    Err(ServerError::ConfigError(
        "PostgreSQL support is not compiled in; enable the `postgres` feature".to_string(),
    ))
}

#[cfg(feature = "redis")]
async fn redis_lock(config: &ServerConfig) -> ServerResult<Arc<dyn LockService>> {
    let url = config.redis_url.as_deref().ok_or_else(|| {
        ServerError::ConfigError("redis_url is required by the redis lock backend".to_string())
    })?;
    info!("Using Redis flow lock");
    let lock = crate::redis_lock::RedisLockService::connect(url).await?;
    Ok(Arc::new(lock))
}

#[cfg(not(feature = "redis"))]
async fn redis_lock(_config: &ServerConfig) -> ServerResult<Arc<dyn LockService>> {
    Err(ServerError::ConfigError(
        "Redis support is not compiled in; enable the `redis` feature".to_string(),
    ))
}

/// The Flowline HTTP server
pub struct FlowlineServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl FlowlineServer {
    /// Build a server from configuration
    pub async fn new(config: ServerConfig) -> ServerResult<Self> {
        let state = Arc::new(AppState::from_config(&config).await?);
        Ok(Self { config, state })
    }

    /// Shared handler state
    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Run the server until ctrl-c
    pub async fn run(self) -> ServerResult<()> {
        info!("Starting Flowline Server");

        let app = crate::api::build_router(self.state.clone());

        let addr = format!("{}:{}", self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let addr: SocketAddr = listener.local_addr()?;
        info!("Listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Flowline Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}
