use crate::InMemoryStateStoreProvider;
use flowline_core::{
    CoreError, Flow, FlowInstance, FlowInstanceStatus, FlowQuery, FlowRun, FlowRunStatus,
    FlowVersion, FlowVersionContent, FolderFilter, FolderId, PageRequest, Project, ProjectId,
    RunQuery,
};

async fn seeded() -> (InMemoryStateStoreProvider, Project) {
    let provider = InMemoryStateStoreProvider::new();
    let project = Project::new("Acme");
    provider
        .create_repositories()
        .projects
        .save(&project)
        .await
        .unwrap();
    (provider, project)
}

#[tokio::test]
async fn test_flow_save_requires_project() {
    let provider = InMemoryStateStoreProvider::new();
    let repos = provider.create_repositories();
    let flow = Flow::new(ProjectId::from("nope"), None);

    let result = repos.flows.save(&flow).await;
    assert_eq!(
        result,
        Err(CoreError::ProjectNotFound {
            id: "nope".to_string()
        })
    );
}

#[tokio::test]
async fn test_flows_are_scoped_to_project() -> Result<(), CoreError> {
    let (provider, project) = seeded().await;
    let repos = provider.create_repositories();
    let flow = Flow::new(project.id.clone(), None);
    repos.flows.save(&flow).await?;

    assert!(repos.flows.find_by_id(&project.id, &flow.id).await?.is_some());
    assert!(repos
        .flows
        .find_by_id(&ProjectId::from("other"), &flow.id)
        .await?
        .is_none());
    Ok(())
}

#[tokio::test]
async fn test_folder_filter_on_count_and_list() -> Result<(), CoreError> {
    let (provider, project) = seeded().await;
    let repos = provider.create_repositories();
    let folder = FolderId::from("folder-1");

    repos.flows.save(&Flow::new(project.id.clone(), None)).await?;
    repos.flows.save(&Flow::new(project.id.clone(), None)).await?;
    repos
        .flows
        .save(&Flow::new(project.id.clone(), Some(folder.clone())))
        .await?;

    assert_eq!(repos.flows.count(&project.id, &FolderFilter::Any).await?, 3);
    assert_eq!(repos.flows.count(&project.id, &FolderFilter::None).await?, 2);
    assert_eq!(
        repos
            .flows
            .count(&project.id, &FolderFilter::Specific(folder.clone()))
            .await?,
        1
    );

    let page = repos
        .flows
        .list(&FlowQuery {
            project_id: project.id.clone(),
            folder: FolderFilter::None,
            page: PageRequest::default(),
        })
        .await?;
    assert_eq!(page.data.len(), 2);
    assert!(page.data.iter().all(|flow| flow.folder_id.is_none()));
    Ok(())
}

#[tokio::test]
async fn test_latest_version_follows_insertion_order() -> Result<(), CoreError> {
    let (provider, project) = seeded().await;
    let repos = provider.create_repositories();
    let flow = Flow::new(project.id.clone(), None);
    repos.flows.save(&flow).await?;

    let mut first = FlowVersion::new(flow.id.clone(), FlowVersionContent::empty("v1"));
    repos.versions.save(&first).await?;
    let second = first.fork();
    repos.versions.save(&second).await?;

    // Re-saving an older version keeps its position
    first.lock();
    repos.versions.save(&first).await?;

    let latest = repos.versions.find_latest(&flow.id).await?.unwrap();
    assert_eq!(latest.id, second.id);
    assert!(repos.versions.find_by_id(&first.id).await?.unwrap().is_locked());
    Ok(())
}

#[tokio::test]
async fn test_flow_delete_cascades() -> Result<(), CoreError> {
    let (provider, project) = seeded().await;
    let repos = provider.create_repositories();
    let flow = Flow::new(project.id.clone(), None);
    repos.flows.save(&flow).await?;
    let version = FlowVersion::new(flow.id.clone(), FlowVersionContent::empty("v1"));
    repos.versions.save(&version).await?;
    repos
        .instances
        .save(&FlowInstance::new(
            project.id.clone(),
            flow.id.clone(),
            version.id.clone(),
            FlowInstanceStatus::Enabled,
        ))
        .await?;
    let run = FlowRun::start(project.id.clone(), &version, None);
    repos.runs.save(&run).await?;

    repos.flows.delete(&project.id, &flow.id).await?;

    assert!(repos.flows.find_by_id(&project.id, &flow.id).await?.is_none());
    assert!(repos.versions.find_by_id(&version.id).await?.is_none());
    assert!(repos.instances.find_by_flow(&project.id, &flow.id).await?.is_none());
    assert!(repos.runs.find_by_id(&project.id, &run.id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_project_delete_cascades() -> Result<(), CoreError> {
    let (provider, project) = seeded().await;
    let repos = provider.create_repositories();
    let flow = Flow::new(project.id.clone(), None);
    repos.flows.save(&flow).await?;

    assert!(repos.projects.delete(&project.id).await?);
    assert!(!repos.projects.delete(&project.id).await?);
    assert!(repos.flows.find_by_id(&project.id, &flow.id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_run_list_filters() -> Result<(), CoreError> {
    let (provider, project) = seeded().await;
    let repos = provider.create_repositories();
    let flow = Flow::new(project.id.clone(), None);
    repos.flows.save(&flow).await?;
    let version = FlowVersion::new(flow.id.clone(), FlowVersionContent::empty("v1"));

    let running = FlowRun::start(project.id.clone(), &version, None);
    let mut failed = FlowRun::start(project.id.clone(), &version, None);
    failed.finish(FlowRunStatus::Failed, None)?;
    repos.runs.save(&running).await?;
    repos.runs.save(&failed).await?;

    let page = repos
        .runs
        .list(&RunQuery {
            project_id: project.id.clone(),
            flow_id: Some(flow.id.clone()),
            status: Some(FlowRunStatus::Failed),
            page: PageRequest::default(),
        })
        .await?;
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].id, failed.id);
    Ok(())
}
