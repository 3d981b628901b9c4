use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ConversionError;
use crate::model::Id;

/// Allowed vocabulary of a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueType {
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controlled_vocabulary: Option<Id>,
}

/// A registered property. `name` is the machine representation used as key in
/// form format, `id` is the key used in API format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: Id,
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    #[serde(default)]
    pub deprecated: bool,
}

/// Property input model for registration (the id is assigned server-side)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProperty {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub value_type: Option<ValueType>,
}

impl NewProperty {
    pub fn into_property(self, id: Id) -> Property {
        Property {
            id,
            name: to_snake_case(&self.name),
            label: self.label,
            description: self.description,
            level: self.level,
            synonyms: self.synonyms.iter().map(|s| to_snake_case(s)).collect(),
            value_type: self.value_type,
            deprecated: false,
        }
    }
}

/// Internal representation of a name: trimmed, lowercase, spaces as underscores.
pub fn to_snake_case(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Read-only lookup tables of the property directory.
///
/// Built once per request and never mutated during a conversion. A missing
/// identifier or name is a hard error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyMap {
    id_to_name: HashMap<Id, String>,
    name_to_id: HashMap<String, Id>,
    name_to_synonyms: HashMap<String, Vec<String>>,
}

impl PropertyMap {
    pub fn from_properties<'a>(properties: impl IntoIterator<Item = &'a Property>) -> Self {
        let mut map = Self::default();
        for property in properties {
            map.insert(&property.id, &property.name);
            if !property.synonyms.is_empty() {
                map.name_to_synonyms
                    .insert(property.name.clone(), property.synonyms.clone());
            }
        }
        map
    }

    /// Build a map from `(identifier, name)` pairs only.
    #[cfg(test)]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut map = Self::default();
        for (id, name) in pairs {
            map.insert(id.as_ref(), name.as_ref());
        }
        map
    }

    #[cfg(test)]
    pub fn with_synonyms(mut self, name: &str, synonyms: &[&str]) -> Self {
        self.name_to_synonyms.insert(
            name.to_string(),
            synonyms.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    fn insert(&mut self, id: &str, name: &str) {
        // Identical keys: the last one wins
        self.id_to_name.insert(id.to_string(), name.to_string());
        self.name_to_id.insert(name.to_string(), id.to_string());
    }

    pub fn name_of(&self, id: &str) -> Result<&str, ConversionError> {
        self.id_to_name
            .get(id)
            .map(String::as_str)
            .ok_or_else(|| ConversionError::UnknownPropertyId(id.to_string()))
    }

    pub fn id_of(&self, name: &str) -> Result<&str, ConversionError> {
        self.name_to_id
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ConversionError::UnknownPropertyName(name.to_string()))
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.name_to_id.contains_key(name)
    }

    /// Resolve a name or one of its synonyms to the canonical property name.
    pub fn canonical_name<'a>(&'a self, key: &'a str) -> Option<&'a str> {
        if self.contains_name(key) {
            return Some(key);
        }
        self.name_to_synonyms
            .iter()
            .find(|(_, synonyms)| synonyms.iter().any(|s| s == key))
            .map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.id_to_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_name.is_empty()
    }
}
