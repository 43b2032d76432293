//! Integration tests against a live database
//!
//! Skipped unless `DATABASE_URL` points at a Postgres instance.

use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;

use flowline_core::{
    CoreError, Flow, FlowInstance, FlowInstanceStatus, FlowQuery, FlowRun, FlowRunStatus,
    FlowVersion, FlowVersionContent, FolderFilter, FolderId, LockHandle, LockService, PageRequest,
    Project, RunEnvironment, RunQuery,
};
use flowline_state_postgres::{PostgresRepositories, PostgresStateStoreProvider};

async fn provider() -> Option<PostgresStateStoreProvider> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Some(
        PostgresStateStoreProvider::new(&url)
            .await
            .expect("database should be reachable"),
    )
}

async fn seeded_project(repos: &PostgresRepositories) -> Project {
    let project = Project::new(format!("test-{}", uuid::Uuid::new_v4()));
    repos.projects.save(&project).await.unwrap();
    project
}

async fn seeded_flow(
    repos: &PostgresRepositories,
    project: &Project,
    folder: Option<&str>,
    age_secs: i64,
) -> Flow {
    let mut flow = Flow::new(project.id.clone(), folder.map(FolderId::from));
    flow.created = Utc::now() - ChronoDuration::seconds(age_secs);
    repos.flows.save(&flow).await.unwrap();
    flow
}

#[tokio::test]
async fn saving_flow_for_missing_project_is_rejected() {
    let Some(provider) = provider().await else { return };
    let repos = provider.create_repositories();

    let flow = Flow::new("no-such-project".into(), None);
    let err = repos.flows.save(&flow).await.unwrap_err();

    assert!(matches!(err, CoreError::ProjectNotFound { .. }));
}

#[tokio::test]
async fn latest_version_follows_insertion_order_across_upserts() {
    let Some(provider) = provider().await else { return };
    let repos = provider.create_repositories();
    let project = seeded_project(&repos).await;
    let flow = seeded_flow(&repos, &project, None, 0).await;

    let mut first = FlowVersion::new(flow.id.clone(), FlowVersionContent::empty("First"));
    repos.versions.save(&first).await.unwrap();
    let mut second = first.fork();
    second.display_name = "Second".to_string();
    repos.versions.save(&second).await.unwrap();

    // Rewriting the older row must not promote it
    first.lock();
    repos.versions.save(&first).await.unwrap();

    let latest = repos.versions.find_latest(&flow.id).await.unwrap().unwrap();
    assert_eq!(latest.id, second.id);

    let reloaded = repos.versions.find_by_id(&first.id).await.unwrap().unwrap();
    assert!(reloaded.is_locked());
    assert_eq!(reloaded.trigger, first.trigger);
}

#[tokio::test]
async fn flow_list_pages_newest_first_with_folder_filter() {
    let Some(provider) = provider().await else { return };
    let repos = provider.create_repositories();
    let project = seeded_project(&repos).await;

    let oldest = seeded_flow(&repos, &project, None, 30).await;
    let middle = seeded_flow(&repos, &project, None, 20).await;
    seeded_flow(&repos, &project, Some("folder-a"), 15).await;
    let newest = seeded_flow(&repos, &project, None, 10).await;

    let query = |page| FlowQuery {
        project_id: project.id.clone(),
        folder: FolderFilter::None,
        page,
    };

    let first = repos
        .flows
        .list(&query(PageRequest { cursor: None, limit: 2 }))
        .await
        .unwrap();
    let ids: Vec<_> = first.data.iter().map(|f| f.id.clone()).collect();
    assert_eq!(ids, vec![newest.id.clone(), middle.id.clone()]);
    assert!(first.previous.is_none());

    let next = PageRequest::from_query(first.next.as_deref(), Some(2)).unwrap();
    let second = repos.flows.list(&query(next)).await.unwrap();
    let ids: Vec<_> = second.data.iter().map(|f| f.id.clone()).collect();
    assert_eq!(ids, vec![oldest.id.clone()]);
    assert!(second.next.is_none());

    let back = PageRequest::from_query(second.previous.as_deref(), Some(2)).unwrap();
    let again = repos.flows.list(&query(back)).await.unwrap();
    let ids: Vec<_> = again.data.iter().map(|f| f.id.clone()).collect();
    assert_eq!(ids, vec![newest.id, middle.id]);

    assert_eq!(repos.flows.count(&project.id, &FolderFilter::None).await.unwrap(), 3);
    assert_eq!(repos.flows.count(&project.id, &FolderFilter::Any).await.unwrap(), 4);
    assert_eq!(
        repos
            .flows
            .count(&project.id, &FolderFilter::Specific("folder-a".into()))
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn deleting_project_cascades_to_owned_rows() {
    let Some(provider) = provider().await else { return };
    let repos = provider.create_repositories();
    let project = seeded_project(&repos).await;
    let flow = seeded_flow(&repos, &project, None, 0).await;

    let version = FlowVersion::new(flow.id.clone(), FlowVersionContent::empty("Flow"));
    repos.versions.save(&version).await.unwrap();
    let instance = FlowInstance::new(
        project.id.clone(),
        flow.id.clone(),
        version.id.clone(),
        FlowInstanceStatus::Enabled,
    );
    repos.instances.save(&instance).await.unwrap();

    assert!(repos.projects.delete(&project.id).await.unwrap());
    assert!(!repos.projects.delete(&project.id).await.unwrap());

    assert!(repos.flows.find_by_id(&project.id, &flow.id).await.unwrap().is_none());
    assert!(repos.versions.find_by_id(&version.id).await.unwrap().is_none());
    assert!(repos
        .instances
        .find_by_flow(&project.id, &flow.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn run_list_filters_by_status() {
    let Some(provider) = provider().await else { return };
    let repos = provider.create_repositories();
    let project = seeded_project(&repos).await;
    let flow = seeded_flow(&repos, &project, None, 0).await;
    let version = FlowVersion::new(flow.id.clone(), FlowVersionContent::empty("Flow"));
    repos.versions.save(&version).await.unwrap();

    let running = FlowRun::start(project.id.clone(), &version, Some(RunEnvironment::Testing));
    repos.runs.save(&running).await.unwrap();
    let mut failed = FlowRun::start(project.id.clone(), &version, None);
    failed.finish(FlowRunStatus::Failed, Some("logs-1".to_string())).unwrap();
    repos.runs.save(&failed).await.unwrap();

    let page = repos
        .runs
        .list(&RunQuery {
            project_id: project.id.clone(),
            flow_id: Some(flow.id.clone()),
            status: Some(FlowRunStatus::Failed),
            page: PageRequest::default(),
        })
        .await
        .unwrap();

    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].id, failed.id);
    assert_eq!(page.data[0].logs_file_id.as_deref(), Some("logs-1"));
    assert!(page.data[0].is_finished());

    let loaded = repos.runs.find_by_id(&project.id, &running.id).await.unwrap().unwrap();
    assert_eq!(loaded.environment, Some(RunEnvironment::Testing));
    assert_eq!(loaded.status, FlowRunStatus::Running);
}

#[tokio::test]
async fn run_finish_applies_once() {
    let Some(provider) = provider().await else { return };
    let repos = provider.create_repositories();
    let project = seeded_project(&repos).await;
    let flow = seeded_flow(&repos, &project, None, 0).await;
    let version = FlowVersion::new(flow.id.clone(), FlowVersionContent::empty("Flow"));
    repos.versions.save(&version).await.unwrap();

    let running = FlowRun::start(project.id.clone(), &version, None);
    repos.runs.save(&running).await.unwrap();

    let mut succeeded = running.clone();
    succeeded.finish(FlowRunStatus::Succeeded, None).unwrap();
    let mut failed = running.clone();
    failed.finish(FlowRunStatus::Failed, Some("logs-2".to_string())).unwrap();

    let (first, second) = tokio::join!(repos.runs.finish(&succeeded), repos.runs.finish(&failed));
    assert!(first.is_ok() != second.is_ok());
    let rejected = if first.is_err() { first } else { second };
    assert_eq!(
        rejected,
        Err(CoreError::RunAlreadyFinished {
            id: running.id.0.clone()
        })
    );

    let stored = repos.runs.find_by_id(&project.id, &running.id).await.unwrap().unwrap();
    assert!(stored.is_finished());

    // An upsert never reopens or rewrites a finished run
    repos.runs.save(&running).await.unwrap();
    let reloaded = repos.runs.find_by_id(&project.id, &running.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, stored.status);
    assert!(reloaded.is_finished());
}

#[tokio::test]
async fn advisory_lock_excludes_second_holder_until_released() {
    let Some(provider) = provider().await else { return };
    let lock = provider.lock_service();
    let key = format!("flow:{}", uuid::Uuid::new_v4());

    let held = lock.acquire(&key, Duration::from_millis(500)).await.unwrap();
    let err = lock
        .acquire(&key, Duration::from_millis(100))
        .await
        .err()
        .expect("second acquire should time out");
    assert_eq!(
        err,
        CoreError::LockTimeout {
            key: key.clone(),
            timeout_ms: 100
        }
    );

    held.release().await.unwrap();
    let again = lock.acquire(&key, Duration::from_millis(500)).await.unwrap();
    assert_eq!(again.key(), key);
    again.release().await.unwrap();
}
