/// Generate SQL migrations for the PostgreSQL state store
///
/// Migrations are applied in order on startup. Every statement is
/// idempotent so re-running them against an existing schema is harmless.
pub fn generate_migrations() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "20240601000000_projects_and_flows",
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                created TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );

            CREATE TABLE IF NOT EXISTS flows (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                folder_id TEXT,
                created TIMESTAMPTZ NOT NULL,
                updated TIMESTAMPTZ NOT NULL,
                CONSTRAINT fk_flows_project_id FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_flows_project_id_created ON flows(project_id, created DESC, id DESC);
            CREATE INDEX IF NOT EXISTS idx_flows_folder_id ON flows(folder_id);
            "#,
        ),
        (
            "20240601000001_flow_versions_and_instances",
            r#"
            CREATE TABLE IF NOT EXISTS flow_versions (
                id TEXT PRIMARY KEY,
                seq BIGSERIAL NOT NULL,
                flow_id TEXT NOT NULL,
                display_name TEXT NOT NULL,
                trigger JSONB NOT NULL,
                valid BOOLEAN NOT NULL,
                state TEXT NOT NULL,
                created TIMESTAMPTZ NOT NULL,
                updated TIMESTAMPTZ NOT NULL,
                CONSTRAINT fk_flow_versions_flow_id FOREIGN KEY (flow_id) REFERENCES flows(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_flow_versions_flow_id_seq ON flow_versions(flow_id, seq DESC);

            CREATE TABLE IF NOT EXISTS flow_instances (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                flow_id TEXT NOT NULL UNIQUE,
                flow_version_id TEXT NOT NULL,
                status TEXT NOT NULL,
                created TIMESTAMPTZ NOT NULL,
                updated TIMESTAMPTZ NOT NULL,
                CONSTRAINT fk_flow_instances_project_id FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
                CONSTRAINT fk_flow_instances_flow_id FOREIGN KEY (flow_id) REFERENCES flows(id) ON DELETE CASCADE,
                CONSTRAINT fk_flow_instances_flow_version_id FOREIGN KEY (flow_version_id) REFERENCES flow_versions(id) ON DELETE CASCADE
            );
            "#,
        ),
        (
            "20240601000002_flow_runs",
            r#"
            CREATE TABLE IF NOT EXISTS flow_runs (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                flow_id TEXT NOT NULL,
                flow_version_id TEXT NOT NULL,
                environment TEXT,
                flow_display_name TEXT NOT NULL,
                logs_file_id TEXT,
                status TEXT NOT NULL,
                start_time TIMESTAMPTZ NOT NULL,
                finish_time TIMESTAMPTZ,
                CONSTRAINT fk_flow_runs_project_id FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
                CONSTRAINT fk_flow_runs_flow_id FOREIGN KEY (flow_id) REFERENCES flows(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_flow_runs_project_id ON flow_runs(project_id);
            CREATE INDEX IF NOT EXISTS idx_flow_runs_project_id_start_time ON flow_runs(project_id, start_time DESC, id DESC);
            "#,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_ordered_and_unique() {
        let migrations = generate_migrations();
        let names: Vec<&str> = migrations.iter().map(|(name, _)| *name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_flow_runs_schema() {
        let all: String = generate_migrations()
            .into_iter()
            .map(|(_, sql)| sql)
            .collect();
        assert!(all.contains("CREATE INDEX IF NOT EXISTS idx_flow_runs_project_id ON flow_runs(project_id)"));
        assert!(all.contains("finish_time TIMESTAMPTZ,"));
        assert!(all.contains("REFERENCES flows(id) ON DELETE CASCADE"));
    }
}
