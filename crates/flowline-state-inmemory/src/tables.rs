use flowline_core::{FlowId, FlowInstance, FlowRun, FlowVersion, Flow, Project, ProjectId};
use std::collections::HashMap;

/// Rows of every table, behind one lock so cascades are atomic
#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub projects: HashMap<String, Project>,
    pub flows: HashMap<String, Flow>,
    /// Versions keyed by id, with an insertion sequence number
    pub versions: HashMap<String, (u64, FlowVersion)>,
    /// At most one instance per flow, keyed by flow id
    pub instances: HashMap<String, FlowInstance>,
    pub runs: HashMap<String, FlowRun>,
    pub next_seq: u64,
}

impl Tables {
    /// Remove a flow and every row depending on it
    pub fn delete_flow_cascade(&mut self, flow_id: &FlowId) {
        self.flows.remove(flow_id.as_str());
        self.versions.retain(|_, (_, version)| version.flow_id != *flow_id);
        self.instances.remove(flow_id.as_str());
        self.runs.retain(|_, run| run.flow_id != *flow_id);
    }

    /// Remove a project and every row depending on it
    pub fn delete_project_cascade(&mut self, project_id: &ProjectId) {
        let flow_ids: Vec<FlowId> = self
            .flows
            .values()
            .filter(|flow| flow.project_id == *project_id)
            .map(|flow| flow.id.clone())
            .collect();
        for flow_id in &flow_ids {
            self.delete_flow_cascade(flow_id);
        }
        self.runs.retain(|_, run| run.project_id != *project_id);
        self.projects.remove(project_id.as_str());
    }
}
