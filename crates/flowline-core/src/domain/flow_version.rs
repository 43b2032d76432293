//! Flow versions
//!
//! A version is a snapshot of a flow's trigger and its chain of actions.
//! Versions start as `DRAFT` and may be edited in place. Once `LOCKED`
//! (published) a version is immutable: [`FlowVersion::apply`] refuses it and
//! callers must [`FlowVersion::fork`] a new draft instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use super::ids::{FlowId, FlowVersionId, FolderId};
use crate::CoreError;

/// Name of the placeholder trigger every new flow starts with
pub const EMPTY_TRIGGER_NAME: &str = "trigger";

/// Display name of the placeholder trigger
pub const EMPTY_TRIGGER_DISPLAY_NAME: &str = "Select Trigger";

/// Settings key holding code artifacts, stripped unless requested
pub const ARTIFACTS_KEY: &str = "artifacts";

/// Maximum number of actions in one version
///
/// Each action nests one level deeper in the stored JSON. Decoders refuse
/// documents nested past 128 levels, settings included.
pub const MAX_ACTIONS: usize = 64;

/// Version state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowVersionState {
    /// Mutable
    Draft,

    /// Published, never mutated in place
    Locked,
}

impl FlowVersionState {
    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowVersionState::Draft => "DRAFT",
            FlowVersionState::Locked => "LOCKED",
        }
    }

    /// Parse the database representation
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "DRAFT" => Some(FlowVersionState::Draft),
            "LOCKED" => Some(FlowVersionState::Locked),
            _ => None,
        }
    }
}

/// Kind of trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerKind {
    /// Placeholder, always invalid
    Empty,
    /// Inbound webhook
    Webhook,
    /// Cron-like schedule
    Schedule,
    /// Trigger provided by an integration piece
    Piece,
}

/// Kind of action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    /// User code
    Code,
    /// Action provided by an integration piece
    Piece,
    /// Conditional branch
    Branch,
    /// Loop over items
    Loop,
}

/// An action step, linked to the next step in the chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Step name, unique within the version
    pub name: String,

    /// Display name
    pub display_name: String,

    /// Kind of action
    #[serde(rename = "type")]
    pub kind: ActionKind,

    /// Free-form step settings
    #[serde(default)]
    pub settings: Value,

    /// Whether the step is fully configured
    pub valid: bool,

    /// Next step in the chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<Box<Action>>,
}

/// The trigger heading a version's step chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    /// Step name, unique within the version
    pub name: String,

    /// Display name
    pub display_name: String,

    /// Kind of trigger
    #[serde(rename = "type")]
    pub kind: TriggerKind,

    /// Free-form step settings
    #[serde(default)]
    pub settings: Value,

    /// Whether the trigger is fully configured
    pub valid: bool,

    /// First action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<Box<Action>>,
}

impl Trigger {
    /// The unnamed, invalid placeholder trigger
    pub fn empty() -> Self {
        Self {
            name: EMPTY_TRIGGER_NAME.to_string(),
            display_name: EMPTY_TRIGGER_DISPLAY_NAME.to_string(),
            kind: TriggerKind::Empty,
            settings: Value::Object(Default::default()),
            valid: false,
            next_action: None,
        }
    }

    /// Iterate over the action chain
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        std::iter::successors(self.next_action.as_deref(), |action| {
            action.next_action.as_deref()
        })
    }

    /// All step names, trigger first
    pub fn step_names(&self) -> Vec<&str> {
        std::iter::once(self.name.as_str())
            .chain(self.actions().map(|action| action.name.as_str()))
            .collect()
    }

    fn is_valid(&self) -> bool {
        self.kind != TriggerKind::Empty && self.valid && self.actions().all(|action| action.valid)
    }
}

/// Step fields supplied by trigger edits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerInput {
    /// Step name
    pub name: String,
    /// Display name
    pub display_name: String,
    /// Kind of trigger
    #[serde(rename = "type")]
    pub kind: TriggerKind,
    /// Settings
    #[serde(default)]
    pub settings: Value,
    /// Whether the trigger is fully configured
    pub valid: bool,
}

/// Step fields supplied by action edits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionInput {
    /// Step name
    pub name: String,
    /// Display name
    pub display_name: String,
    /// Kind of action
    #[serde(rename = "type")]
    pub kind: ActionKind,
    /// Settings
    #[serde(default)]
    pub settings: Value,
    /// Whether the action is fully configured
    pub valid: bool,
}

impl From<ActionInput> for Action {
    fn from(input: ActionInput) -> Self {
        Self {
            name: input.name,
            display_name: input.display_name,
            kind: input.kind,
            settings: input.settings,
            valid: input.valid,
            next_action: None,
        }
    }
}

/// Operation requested against a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "request", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowOperationRequest {
    /// Move the flow record to another folder (record-only)
    #[serde(rename_all = "camelCase")]
    ChangeFolder {
        /// Target folder, `None` for no folder
        folder_id: Option<FolderId>,
    },

    /// Rename the version
    #[serde(rename_all = "camelCase")]
    ChangeName {
        /// New display name
        display_name: String,
    },

    /// Replace the whole definition
    #[serde(rename_all = "camelCase")]
    ImportFlow {
        /// New display name
        display_name: String,
        /// New trigger and action chain
        trigger: Trigger,
    },

    /// Replace the trigger, keeping the action chain
    UpdateTrigger(TriggerInput),

    /// Insert an action after the named step
    #[serde(rename_all = "camelCase")]
    AddAction {
        /// Step the new action follows
        parent_step: String,
        /// The new action
        action: ActionInput,
    },

    /// Replace an action's fields, keeping its position
    UpdateAction(ActionInput),

    /// Remove an action and relink the chain
    DeleteAction {
        /// Name of the action to remove
        name: String,
    },

    /// Lock the version (publish)
    LockFlow,
}

impl FlowOperationRequest {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            FlowOperationRequest::ChangeFolder { .. } => "CHANGE_FOLDER",
            FlowOperationRequest::ChangeName { .. } => "CHANGE_NAME",
            FlowOperationRequest::ImportFlow { .. } => "IMPORT_FLOW",
            FlowOperationRequest::UpdateTrigger(_) => "UPDATE_TRIGGER",
            FlowOperationRequest::AddAction { .. } => "ADD_ACTION",
            FlowOperationRequest::UpdateAction(_) => "UPDATE_ACTION",
            FlowOperationRequest::DeleteAction { .. } => "DELETE_ACTION",
            FlowOperationRequest::LockFlow => "LOCK_FLOW",
        }
    }
}

/// Content a version is created from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowVersionContent {
    /// Display name
    pub display_name: String,
    /// Trigger and action chain
    pub trigger: Trigger,
}

impl FlowVersionContent {
    /// Content of a brand new flow
    pub fn empty(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            trigger: Trigger::empty(),
        }
    }
}

/// Aggregate: Flow version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowVersion {
    /// Unique identifier
    pub id: FlowVersionId,

    /// Flow this version belongs to
    pub flow_id: FlowId,

    /// Display name
    pub display_name: String,

    /// Trigger and action chain
    pub trigger: Trigger,

    /// Whether every step is valid
    pub valid: bool,

    /// Draft or locked
    pub state: FlowVersionState,

    /// Creation timestamp
    pub created: DateTime<Utc>,

    /// Last updated timestamp
    pub updated: DateTime<Utc>,
}

impl FlowVersion {
    /// Create a new draft version
    pub fn new(flow_id: FlowId, content: FlowVersionContent) -> Self {
        let now = Utc::now();
        let valid = content.trigger.is_valid();
        Self {
            id: FlowVersionId::generate(),
            flow_id,
            display_name: content.display_name,
            trigger: content.trigger,
            valid,
            state: FlowVersionState::Draft,
            created: now,
            updated: now,
        }
    }

    /// Whether the version is locked
    pub fn is_locked(&self) -> bool {
        self.state == FlowVersionState::Locked
    }

    /// Copy-on-write: a new draft seeded from this version's content
    pub fn fork(&self) -> FlowVersion {
        FlowVersion::new(
            self.flow_id.clone(),
            FlowVersionContent {
                display_name: self.display_name.clone(),
                trigger: self.trigger.clone(),
            },
        )
    }

    /// Mark the version as locked
    pub fn lock(&mut self) {
        if !self.is_locked() {
            self.state = FlowVersionState::Locked;
            self.updated = Utc::now();
        }
    }

    /// Apply an operation in place
    ///
    /// Fails with [`CoreError::VersionLocked`] on a locked version. On error
    /// the version is left unchanged.
    pub fn apply(&mut self, operation: &FlowOperationRequest) -> Result<(), CoreError> {
        if self.is_locked() {
            return Err(CoreError::VersionLocked {
                id: self.id.0.clone(),
            });
        }

        let mut trigger = self.trigger.clone();
        let mut display_name = self.display_name.clone();

        match operation {
            FlowOperationRequest::ChangeFolder { .. } => {
                return Err(CoreError::Validation(
                    "CHANGE_FOLDER applies to the flow record, not to a version".to_string(),
                ));
            }
            FlowOperationRequest::ChangeName { display_name: name } => {
                display_name = name.clone();
            }
            FlowOperationRequest::ImportFlow {
                display_name: name,
                trigger: imported,
            } => {
                display_name = name.clone();
                trigger = imported.clone();
            }
            FlowOperationRequest::UpdateTrigger(input) => {
                trigger.name = input.name.clone();
                trigger.display_name = input.display_name.clone();
                trigger.kind = input.kind;
                trigger.settings = input.settings.clone();
                trigger.valid = input.valid;
            }
            FlowOperationRequest::AddAction {
                parent_step,
                action,
            } => {
                let slot = if trigger.name == *parent_step {
                    &mut trigger.next_action
                } else {
                    let parent = find_action_mut(&mut trigger.next_action, parent_step)
                        .ok_or_else(|| unknown_step(parent_step))?;
                    &mut parent.next_action
                };
                let mut inserted = Box::new(Action::from(action.clone()));
                inserted.next_action = slot.take();
                *slot = Some(inserted);
            }
            FlowOperationRequest::UpdateAction(input) => {
                let target = find_action_mut(&mut trigger.next_action, &input.name)
                    .ok_or_else(|| unknown_step(&input.name))?;
                target.display_name = input.display_name.clone();
                target.kind = input.kind;
                target.settings = input.settings.clone();
                target.valid = input.valid;
            }
            FlowOperationRequest::DeleteAction { name } => {
                unlink_action(&mut trigger.next_action, name).ok_or_else(|| unknown_step(name))?;
            }
            FlowOperationRequest::LockFlow => {
                self.lock();
                return Ok(());
            }
        }

        ensure_unique_step_names(&trigger)?;
        ensure_action_count(&trigger)?;

        self.valid = trigger.is_valid();
        self.trigger = trigger;
        self.display_name = display_name;
        self.updated = Utc::now();
        Ok(())
    }

    /// Strip code artifacts out of action settings
    pub fn without_artifacts(mut self) -> Self {
        let mut next = self.trigger.next_action.as_deref_mut();
        while let Some(action) = next {
            if action.kind == ActionKind::Code {
                if let Value::Object(settings) = &mut action.settings {
                    settings.remove(ARTIFACTS_KEY);
                }
            }
            next = action.next_action.as_deref_mut();
        }
        self
    }
}

fn unknown_step(name: &str) -> CoreError {
    CoreError::Validation(format!("Step not found: {}", name))
}

fn find_action_mut<'a>(slot: &'a mut Option<Box<Action>>, name: &str) -> Option<&'a mut Action> {
    match slot {
        Some(action) => {
            if action.name == name {
                Some(action.as_mut())
            } else {
                find_action_mut(&mut action.next_action, name)
            }
        }
        None => None,
    }
}

fn unlink_action(slot: &mut Option<Box<Action>>, name: &str) -> Option<Box<Action>> {
    if slot.as_ref().map_or(false, |action| action.name == name) {
        let mut removed = slot.take()?;
        *slot = removed.next_action.take();
        return Some(removed);
    }

    match slot {
        Some(action) => unlink_action(&mut action.next_action, name),
        None => None,
    }
}

fn ensure_unique_step_names(trigger: &Trigger) -> Result<(), CoreError> {
    let mut seen = HashSet::new();
    for name in trigger.step_names() {
        if !seen.insert(name) {
            return Err(CoreError::Validation(format!("Duplicate step name: {}", name)));
        }
    }
    Ok(())
}

fn ensure_action_count(trigger: &Trigger) -> Result<(), CoreError> {
    let count = trigger.actions().count();
    if count > MAX_ACTIONS {
        return Err(CoreError::Validation(format!(
            "A flow may hold at most {} actions, got {}",
            MAX_ACTIONS, count
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn draft() -> FlowVersion {
        FlowVersion::new(FlowId::from("flow-1"), FlowVersionContent::empty("Untitled"))
    }

    fn code_action(name: &str) -> ActionInput {
        ActionInput {
            name: name.to_string(),
            display_name: format!("Run {}", name),
            kind: ActionKind::Code,
            settings: json!({"input": {}, "artifacts": {"bundle": "b64"}}),
            valid: true,
        }
    }

    fn webhook_trigger() -> TriggerInput {
        TriggerInput {
            name: EMPTY_TRIGGER_NAME.to_string(),
            display_name: "Catch Webhook".to_string(),
            kind: TriggerKind::Webhook,
            settings: json!({}),
            valid: true,
        }
    }

    fn add_after(version: &mut FlowVersion, parent: &str, name: &str) {
        version
            .apply(&FlowOperationRequest::AddAction {
                parent_step: parent.to_string(),
                action: code_action(name),
            })
            .unwrap();
    }

    #[test]
    fn test_new_version_has_invalid_empty_trigger() {
        let version = draft();
        assert_eq!(version.trigger.kind, TriggerKind::Empty);
        assert_eq!(version.trigger.name, EMPTY_TRIGGER_NAME);
        assert!(!version.trigger.valid);
        assert!(!version.valid);
        assert_eq!(version.state, FlowVersionState::Draft);
    }

    #[test]
    fn test_add_update_delete_actions() {
        let mut version = draft();
        add_after(&mut version, "trigger", "step_1");
        add_after(&mut version, "step_1", "step_3");
        add_after(&mut version, "step_1", "step_2");
        assert_eq!(
            version.trigger.step_names(),
            vec!["trigger", "step_1", "step_2", "step_3"]
        );

        let mut renamed = code_action("step_2");
        renamed.display_name = "Renamed".to_string();
        version
            .apply(&FlowOperationRequest::UpdateAction(renamed))
            .unwrap();
        let step_2 = version.trigger.actions().find(|a| a.name == "step_2").unwrap();
        assert_eq!(step_2.display_name, "Renamed");
        assert_eq!(step_2.next_action.as_ref().unwrap().name, "step_3");

        version
            .apply(&FlowOperationRequest::DeleteAction {
                name: "step_2".to_string(),
            })
            .unwrap();
        assert_eq!(version.trigger.step_names(), vec!["trigger", "step_1", "step_3"]);
    }

    #[test]
    fn test_validity_is_recomputed() {
        let mut version = draft();
        version
            .apply(&FlowOperationRequest::UpdateTrigger(webhook_trigger()))
            .unwrap();
        assert!(version.valid);

        let mut broken = code_action("step_1");
        broken.valid = false;
        version
            .apply(&FlowOperationRequest::AddAction {
                parent_step: "trigger".to_string(),
                action: broken,
            })
            .unwrap();
        assert!(!version.valid);
    }

    #[test]
    fn test_duplicate_and_unknown_steps_are_rejected() {
        let mut version = draft();
        add_after(&mut version, "trigger", "step_1");
        let before = version.clone();

        let duplicate = version.apply(&FlowOperationRequest::AddAction {
            parent_step: "trigger".to_string(),
            action: code_action("step_1"),
        });
        assert!(matches!(duplicate, Err(CoreError::Validation(msg)) if msg.contains("Duplicate")));

        let unknown = version.apply(&FlowOperationRequest::DeleteAction {
            name: "missing".to_string(),
        });
        assert!(matches!(unknown, Err(CoreError::Validation(_))));
        assert_eq!(version, before);
    }

    #[test]
    fn test_locked_version_refuses_mutation_and_forks() {
        let mut version = draft();
        version.apply(&FlowOperationRequest::LockFlow).unwrap();
        assert!(version.is_locked());
        let snapshot = version.clone();

        let result = version.apply(&FlowOperationRequest::ChangeName {
            display_name: "Nope".to_string(),
        });
        assert_eq!(
            result,
            Err(CoreError::VersionLocked {
                id: version.id.0.clone()
            })
        );
        assert_eq!(version, snapshot);

        let mut fork = version.fork();
        assert_ne!(fork.id, version.id);
        assert_eq!(fork.state, FlowVersionState::Draft);
        assert_eq!(fork.trigger, version.trigger);
        fork.apply(&FlowOperationRequest::ChangeName {
            display_name: "Edited".to_string(),
        })
        .unwrap();
        assert_eq!(version, snapshot);
    }

    #[test]
    fn test_action_count_is_bounded_and_stays_decodable() {
        let mut version = draft();
        let mut parent = EMPTY_TRIGGER_NAME.to_string();
        for i in 0..MAX_ACTIONS {
            let name = format!("step_{}", i + 1);
            add_after(&mut version, &parent, &name);
            parent = name;
        }
        assert_eq!(version.trigger.actions().count(), MAX_ACTIONS);

        let before = version.clone();
        let overflow = version.apply(&FlowOperationRequest::AddAction {
            parent_step: parent,
            action: code_action("one_too_many"),
        });
        assert!(matches!(overflow, Err(CoreError::Validation(msg)) if msg.contains("at most")));
        assert_eq!(version, before);

        let json = serde_json::to_string(&version.trigger).unwrap();
        let decoded: Trigger = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, version.trigger);
    }

    #[test]
    fn test_change_folder_is_not_a_version_operation() {
        let mut version = draft();
        let result = version.apply(&FlowOperationRequest::ChangeFolder { folder_id: None });
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_without_artifacts() {
        let mut version = draft();
        add_after(&mut version, "trigger", "step_1");
        let stripped = version.without_artifacts();
        let action = stripped.trigger.actions().next().unwrap();
        assert!(action.settings.get(ARTIFACTS_KEY).is_none());
        assert!(action.settings.get("input").is_some());
    }

    #[test]
    fn test_operation_wire_format() {
        let op: FlowOperationRequest = serde_json::from_value(json!({
            "type": "ADD_ACTION",
            "request": {
                "parentStep": "trigger",
                "action": {
                    "name": "step_1",
                    "displayName": "Code",
                    "type": "CODE",
                    "settings": {},
                    "valid": true
                }
            }
        }))
        .unwrap();
        assert_eq!(op.kind(), "ADD_ACTION");

        let lock: FlowOperationRequest = serde_json::from_value(json!({"type": "LOCK_FLOW"})).unwrap();
        assert_eq!(lock, FlowOperationRequest::LockFlow);
    }
}
