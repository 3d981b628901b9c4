use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

use crate::error::ApiError;
use crate::model::{StateDefinition, DEFAULT_INITIAL_STATE};

/// Legacy state name still found in stored studies
const LEGACY_STATE_ALIASES: &[(&str, &str)] = &[("rna_sequencing_biokit", "BiokitUploadState")];

/// Computes study workflow states from the study's Form-format data.
pub trait StateMachine: Send + Sync {
    /// State of a new study, starting from `initial_state`.
    fn create_study(&self, initial_state: &str, form: &Map<String, Value>) -> Result<String, ApiError>;
    /// State after a mutation of a study currently in `current_state`.
    fn change_state(&self, current_state: &str, form: &Map<String, Value>) -> String;
}

/// Strategy-driven workflow: each state lists `(field, value) -> next state`
/// rules and the first matching rule wins.
#[derive(Debug, Clone)]
pub struct Workflow {
    states: HashMap<String, StateDefinition>,
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Workflow {
    pub fn new(states: Vec<StateDefinition>) -> Self {
        let mut states: HashMap<String, StateDefinition> =
            states.into_iter().map(|s| (s.name.clone(), s)).collect();
        states
            .entry(DEFAULT_INITIAL_STATE.to_string())
            .or_insert_with(|| StateDefinition::new(DEFAULT_INITIAL_STATE));
        Self { states }
    }

    /// Load state definitions from a JSON array file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow states from {}", path.display()))?;
        let states: Vec<StateDefinition> =
            serde_json::from_str(&content).context("Failed to parse workflow states")?;
        Ok(Self::new(states))
    }

    pub fn state(&self, name: &str) -> Option<&StateDefinition> {
        self.states.get(resolve_alias(name))
    }

    pub fn states(&self) -> Vec<&StateDefinition> {
        let mut states: Vec<_> = self.states.values().collect();
        states.sort_by(|a, b| a.name.cmp(&b.name));
        states
    }
}

fn resolve_alias(name: &str) -> &str {
    LEGACY_STATE_ALIASES
        .iter()
        .find(|(legacy, _)| *legacy == name)
        .map(|(_, current)| *current)
        .unwrap_or(name)
}

impl StateMachine for Workflow {
    fn create_study(&self, initial_state: &str, form: &Map<String, Value>) -> Result<String, ApiError> {
        let state = self
            .state(initial_state)
            .ok_or_else(|| ApiError::request_body(format!("Unknown initial state '{}'", initial_state)))?;

        Ok(state
            .strategies_create_study
            .iter()
            .find(|strategy| strategy.matches(form))
            .map(|strategy| strategy.state_if_true.clone())
            .unwrap_or_else(|| state.name.clone()))
    }

    fn change_state(&self, current_state: &str, form: &Map<String, Value>) -> String {
        let Some(state) = self.state(current_state) else {
            log::warn!("Study is in unknown state '{}', keeping it", current_state);
            return current_state.to_string();
        };

        state
            .strategies_change_state
            .iter()
            .find(|strategy| strategy.matches(form))
            .map(|strategy| strategy.state_if_true.clone())
            .unwrap_or_else(|| state.name.clone())
    }
}
