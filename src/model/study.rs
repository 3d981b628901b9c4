use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{EntryFormat, Id, UserContext};

/// Initial workflow state used when a payload does not name one
pub const DEFAULT_INITIAL_STATE: &str = "GenericState";

fn default_initial_state() -> String {
    DEFAULT_INITIAL_STATE.to_string()
}

/// A study document. `entries` are persisted in API format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Study {
    pub id: Id,
    pub entries: Vec<Value>,
    pub meta_information: MetaInformation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaInformation {
    pub state: String,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub change_log: Vec<ChangeLog>,
}

impl MetaInformation {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            deprecated: false,
            change_log: Vec::new(),
        }
    }

    /// Change logs are append-only.
    pub fn add_log(&mut self, log: ChangeLog) {
        self.change_log.push(log);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLog {
    pub action: String,
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_user: Option<String>,
}

impl ChangeLog {
    pub fn new(action: impl Into<String>, user: &UserContext, manual_user: Option<String>) -> Self {
        Self {
            action: action.into(),
            user_id: user.user_id.clone(),
            timestamp: Utc::now(),
            manual_user,
        }
    }
}

/// Position of one uniquely identified entity inside a study's entry tree.
///
/// Rows of the secondary index that replaces scanning every study for a UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityLocation {
    pub uuid: String,
    pub study_id: Id,
    /// Name of the list entry holding the entity (e.g. `datasets`)
    pub list_prop: String,
    /// UUID of the closest enclosing entity, `None` for top-level lists
    pub parent_uuid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManualMetaInformation {
    #[serde(default)]
    pub user: Option<String>,
}

/// Payload of study creation
#[derive(Debug, Clone, Deserialize)]
pub struct NewStudy {
    pub form_name: String,
    #[serde(default = "default_initial_state")]
    pub initial_state: String,
    pub entries: Value,
    #[serde(default)]
    pub entry_format: EntryFormat,
    #[serde(default)]
    pub manual_meta_information: Option<ManualMetaInformation>,
}

/// Payload shared by study replacement and dataset / processing event writes
#[derive(Debug, Clone, Deserialize)]
pub struct EntriesPayload {
    pub form_name: String,
    pub entries: Value,
    #[serde(default)]
    pub entry_format: EntryFormat,
    #[serde(default)]
    pub manual_meta_information: Option<ManualMetaInformation>,
}

/// Optional body of delete requests
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeletePayload {
    #[serde(default)]
    pub manual_meta_information: Option<ManualMetaInformation>,
}

/// Which sample validation steps to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleValidationFlags {
    #[serde(default)]
    pub treatment_ind: bool,
    #[serde(default)]
    pub individual: bool,
    #[serde(default)]
    pub treatment_sam: bool,
    #[serde(default)]
    pub sample: bool,
}

/// Form used by each sample validation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleFormNames {
    pub treatment_ind: String,
    pub individual: String,
    pub treatment_sam: String,
    pub sample: String,
}

impl Default for SampleFormNames {
    fn default() -> Self {
        Self {
            treatment_ind: "treatment".to_string(),
            individual: "individual".to_string(),
            treatment_sam: "treatment".to_string(),
            sample: "sample".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplePayload {
    pub entries: Value,
    #[serde(default)]
    pub entry_format: EntryFormat,
    #[serde(default)]
    pub validate: SampleValidationFlags,
    #[serde(default)]
    pub form_names: SampleFormNames,
    #[serde(default)]
    pub manual_meta_information: Option<ManualMetaInformation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplesPayload {
    pub entries: Vec<Value>,
    #[serde(default)]
    pub entry_format: EntryFormat,
    #[serde(default)]
    pub validate: SampleValidationFlags,
    #[serde(default)]
    pub form_names: SampleFormNames,
    #[serde(default)]
    pub replace: bool,
    #[serde(default)]
    pub manual_meta_information: Option<ManualMetaInformation>,
}

/// Extract `manual_meta_information.user` from an optional block.
pub fn manual_user(meta: &Option<ManualMetaInformation>) -> Option<String> {
    meta.as_ref().and_then(|m| m.user.clone())
}
