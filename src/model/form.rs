use serde::{Deserialize, Serialize};

/// A stored form definition, used to validate form-format data and to order
/// the fields of stored entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormDefinition {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub fields: Vec<FormField>,
    #[serde(default)]
    pub deprecated: bool,
}

/// One field of a form. `name` is a property name.
///
/// A field with sub-fields is a nested form: its value is an object, or a list
/// of objects when `multiple` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FormField>,
}

impl FormField {
    pub fn optional(name: &str) -> Self {
        Self {
            name: name.to_string(),
            label: String::new(),
            required: false,
            multiple: false,
            fields: Vec::new(),
        }
    }

    pub fn required(name: &str) -> Self {
        Self {
            required: true,
            ..Self::optional(name)
        }
    }

    pub fn list(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn with_fields(mut self, fields: Vec<FormField>) -> Self {
        self.fields = fields;
        self
    }
}

impl FormDefinition {
    pub fn new(name: &str, fields: Vec<FormField>) -> Self {
        Self {
            name: name.to_string(),
            label: name.to_string(),
            description: String::new(),
            fields,
            deprecated: false,
        }
    }
}
