use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One workflow state and the rules leading out of it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDefinition {
    pub name: String,
    #[serde(default)]
    pub strategies_create_study: Vec<Strategy>,
    #[serde(default)]
    pub strategies_change_state: Vec<Strategy>,
    #[serde(default)]
    pub ui_actions: Value,
}

/// Move to `state_if_true` when form field `name` holds `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    pub value: String,
    pub state_if_true: String,
}

impl Strategy {
    pub fn matches(&self, form: &Map<String, Value>) -> bool {
        match form.get(&self.name) {
            Some(Value::String(s)) => *s == self.value,
            Some(Value::Array(items)) => items.iter().any(|item| scalar_eq(item, &self.value)),
            Some(other) => scalar_eq(other, &self.value),
            None => false,
        }
    }
}

fn scalar_eq(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => s == expected,
        Value::Bool(_) | Value::Number(_) => value.to_string() == expected,
        _ => false,
    }
}

impl StateDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            strategies_create_study: Vec::new(),
            strategies_change_state: Vec::new(),
            ui_actions: Value::Null,
        }
    }
}
