/// Identifier value objects
pub mod ids;

/// Project aggregate
pub mod project;

/// Flow record and its composed read model
pub mod flow;

/// Flow versions, the trigger/action graph and version operations
pub mod flow_version;

/// Flow instance (publish status)
pub mod flow_instance;

/// Flow run records
pub mod flow_run;

/// Cursor pagination and folder filtering
pub mod pagination;

/// Repository traits
pub mod repository;
