//! Dual-format entry tree.
//!
//! A study is stored as a list of entries in *API format*
//! (`[{"property": <id>, "value": ...}]`) and validated in *Form format*
//! (`{<name>: ...}`). The types here hold one internal tree that can be parsed
//! from and rendered to both shapes.
//!
//! | value            | API format                 | Form format          |
//! |------------------|----------------------------|----------------------|
//! | scalar           | primitive                  | primitive            |
//! | list of scalars  | `[primitive, ...]`         | `[primitive, ...]`   |
//! | nested object    | `[entry, ...]`             | `{name: value, ...}` |
//! | list of objects  | `[[entry, ...], ...]`      | `[{...}, ...]`       |

use serde_json::{Map, Value};

use crate::error::ConversionError;
use crate::model::{Id, PropertyMap, UUID_FIELD};

pub const DEFAULT_KEY_NAME: &str = "property";
pub const DEFAULT_VALUE_NAME: &str = "value";

/// Field names of one API-format entry object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryKeys {
    pub key_name: String,
    pub value_name: String,
}

impl EntryKeys {
    pub fn new(key_name: impl Into<String>, value_name: impl Into<String>) -> Self {
        Self {
            key_name: key_name.into(),
            value_name: value_name.into(),
        }
    }
}

impl Default for EntryKeys {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_NAME, DEFAULT_VALUE_NAME)
    }
}

/// One `(property, value)` pair. `property_id` and `property_name` always agree
/// with the [`PropertyMap`] the entry was parsed with.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub property_id: Id,
    pub property_name: String,
    pub value: EntryValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryValue {
    /// String, number, boolean or null
    Scalar(Value),
    ScalarList(Vec<Value>),
    Object(NestedEntry),
    ObjectList(NestedListEntry),
}

/// Fields of one embedded object, in insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NestedEntry {
    pub entries: Vec<Entry>,
}

/// A list of embedded objects (e.g. all datasets of a study).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NestedListEntry {
    pub items: Vec<NestedEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListShape {
    Scalars,
    Objects,
    Lists,
}

impl ListShape {
    fn of_element(value: &Value) -> Self {
        match value {
            Value::Array(_) => Self::Lists,
            Value::Object(_) => Self::Objects,
            _ => Self::Scalars,
        }
    }

    /// Shape shared by every element; an empty list counts as scalars.
    fn of_list(property: &str, items: &[Value]) -> Result<Self, ConversionError> {
        let Some(first) = items.first() else {
            return Ok(Self::Scalars);
        };
        let shape = Self::of_element(first);
        if items.iter().all(|item| Self::of_element(item) == shape) {
            Ok(shape)
        } else {
            Err(ConversionError::MixedList {
                property: property.to_string(),
            })
        }
    }
}

impl Entry {
    pub fn new(property_id: impl Into<Id>, property_name: impl Into<String>, value: EntryValue) -> Self {
        Self {
            property_id: property_id.into(),
            property_name: property_name.into(),
            value,
        }
    }

    /// Build an entry from its property name, resolving the identifier.
    pub fn from_name(
        name: &str,
        value: EntryValue,
        mapper: &PropertyMap,
    ) -> Result<Self, ConversionError> {
        let id = mapper.id_of(name)?;
        Ok(Self::new(id, name, value))
    }

    /// Parse one `{key_name: id, value_name: value}` object.
    pub fn add_api_format(
        raw: &Value,
        mapper: &PropertyMap,
        keys: &EntryKeys,
    ) -> Result<Self, ConversionError> {
        let object = raw.as_object().ok_or_else(|| ConversionError::UnexpectedShape {
            context: "entry".to_string(),
            expected: "an object with a property and a value",
        })?;

        let property_id = match object.get(&keys.key_name) {
            Some(Value::String(id)) => id.as_str(),
            Some(_) => {
                return Err(ConversionError::InvalidKey {
                    field: keys.key_name.clone(),
                })
            }
            None => return Err(ConversionError::MissingField(keys.key_name.clone())),
        };
        let raw_value = object
            .get(&keys.value_name)
            .ok_or_else(|| ConversionError::MissingField(keys.value_name.clone()))?;

        let property_name = mapper.name_of(property_id)?;
        let value = EntryValue::from_api(property_name, raw_value, mapper, keys)?;

        Ok(Self::new(property_id, property_name, value))
    }

    /// Parse one `name: value` pair of a form-format object.
    pub fn add_form_format(
        name: &str,
        raw_value: &Value,
        mapper: &PropertyMap,
    ) -> Result<Self, ConversionError> {
        let value = EntryValue::from_form(name, raw_value, mapper)?;
        Self::from_name(name, value, mapper)
    }

    pub fn get_api_format(&self, keys: &EntryKeys) -> Value {
        let mut object = Map::new();
        object.insert(keys.key_name.clone(), Value::String(self.property_id.clone()));
        object.insert(keys.value_name.clone(), self.value.get_api_format(keys));
        Value::Object(object)
    }

    pub fn get_form_format(&self) -> Value {
        self.value.get_form_format()
    }

    /// The value as a string, if it is a string scalar.
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            EntryValue::Scalar(Value::String(s)) => Some(s),
            _ => None,
        }
    }
}

impl EntryValue {
    fn from_api(
        property: &str,
        raw: &Value,
        mapper: &PropertyMap,
        keys: &EntryKeys,
    ) -> Result<Self, ConversionError> {
        match raw {
            Value::Array(items) => match ListShape::of_list(property, items)? {
                ListShape::Scalars => Ok(Self::ScalarList(items.clone())),
                ListShape::Objects => Ok(Self::Object(NestedEntry::add_api_format(
                    items, mapper, keys,
                )?)),
                ListShape::Lists => Ok(Self::ObjectList(NestedListEntry::add_api_format(
                    items, mapper, keys,
                )?)),
            },
            Value::Object(_) => Err(ConversionError::UnexpectedShape {
                context: property.to_string(),
                expected: "a primitive or a list of entries",
            }),
            primitive => Ok(Self::Scalar(primitive.clone())),
        }
    }

    fn from_form(property: &str, raw: &Value, mapper: &PropertyMap) -> Result<Self, ConversionError> {
        match raw {
            // An empty object renders as `[]` in API format, so it is read as
            // the empty list it would come back as
            Value::Object(fields) if fields.is_empty() => Ok(Self::ScalarList(Vec::new())),
            Value::Object(fields) => Ok(Self::Object(NestedEntry::add_form_format(fields, mapper)?)),
            Value::Array(items) => match ListShape::of_list(property, items)? {
                ListShape::Scalars => Ok(Self::ScalarList(items.clone())),
                ListShape::Objects => Ok(Self::ObjectList(NestedListEntry::add_form_format(
                    items, mapper,
                )?)),
                ListShape::Lists => Err(ConversionError::UnexpectedShape {
                    context: property.to_string(),
                    expected: "a list of primitives or a list of objects",
                }),
            },
            primitive => Ok(Self::Scalar(primitive.clone())),
        }
    }

    pub fn get_api_format(&self, keys: &EntryKeys) -> Value {
        match self {
            Self::Scalar(value) => value.clone(),
            Self::ScalarList(values) => Value::Array(values.clone()),
            Self::Object(nested) => nested.get_api_format(keys),
            Self::ObjectList(list) => list.get_api_format(keys),
        }
    }

    pub fn get_form_format(&self) -> Value {
        match self {
            Self::Scalar(value) => value.clone(),
            Self::ScalarList(values) => Value::Array(values.clone()),
            Self::Object(nested) => Value::Object(nested.get_form_format()),
            Self::ObjectList(list) => list.get_form_format(),
        }
    }
}

impl NestedEntry {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    pub fn add_api_format(
        items: &[Value],
        mapper: &PropertyMap,
        keys: &EntryKeys,
    ) -> Result<Self, ConversionError> {
        items
            .iter()
            .map(|item| Entry::add_api_format(item, mapper, keys))
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    pub fn add_form_format(
        fields: &Map<String, Value>,
        mapper: &PropertyMap,
    ) -> Result<Self, ConversionError> {
        fields
            .iter()
            .map(|(name, value)| Entry::add_form_format(name, value, mapper))
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    pub fn get_api_format(&self, keys: &EntryKeys) -> Value {
        Value::Array(self.entries.iter().map(|e| e.get_api_format(keys)).collect())
    }

    pub fn get_form_format(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .map(|e| (e.property_name.clone(), e.get_form_format()))
            .collect()
    }

    pub fn get_entry_by_name(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.property_name == name)
    }

    pub fn uuid(&self) -> Option<&str> {
        self.get_entry_by_name(UUID_FIELD).and_then(Entry::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl NestedListEntry {
    pub fn new(items: Vec<NestedEntry>) -> Self {
        Self { items }
    }

    pub fn add_api_format(
        items: &[Value],
        mapper: &PropertyMap,
        keys: &EntryKeys,
    ) -> Result<Self, ConversionError> {
        items
            .iter()
            .map(|item| match item {
                Value::Array(entries) => NestedEntry::add_api_format(entries, mapper, keys),
                _ => Err(ConversionError::UnexpectedShape {
                    context: "nested list".to_string(),
                    expected: "a list of entries",
                }),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    pub fn add_form_format(items: &[Value], mapper: &PropertyMap) -> Result<Self, ConversionError> {
        items
            .iter()
            .map(|item| match item {
                Value::Object(fields) => NestedEntry::add_form_format(fields, mapper),
                _ => Err(ConversionError::UnexpectedShape {
                    context: "nested list".to_string(),
                    expected: "an object",
                }),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    pub fn get_api_format(&self, keys: &EntryKeys) -> Value {
        Value::Array(self.items.iter().map(|i| i.get_api_format(keys)).collect())
    }

    pub fn get_form_format(&self) -> Value {
        Value::Array(
            self.items
                .iter()
                .map(|i| Value::Object(i.get_form_format()))
                .collect(),
        )
    }

    /// First nested entry whose string field `field` equals `value`, with its position.
    pub fn find_nested_entry(&self, field: &str, value: &str) -> Option<(usize, &NestedEntry)> {
        self.items.iter().enumerate().find(|(_, item)| {
            item.get_entry_by_name(field)
                .and_then(Entry::as_str)
                .is_some_and(|v| v == value)
        })
    }

    /// Remove the first nested entry matching `field == value`.
    pub fn delete_nested_entry(&mut self, field: &str, value: &str) -> Option<NestedEntry> {
        let (position, _) = self.find_nested_entry(field, value)?;
        Some(self.items.remove(position))
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapper() -> PropertyMap {
        PropertyMap::from_pairs([
            ("1", "contacts"),
            ("2", "tags"),
            ("3", "name"),
            ("4", "phone"),
            ("5", "address"),
            ("6", "uuid"),
        ])
    }

    #[test]
    fn test_api_scalar_and_scalar_list() {
        let keys = EntryKeys::default();
        let scalar = Entry::add_api_format(&json!({"property": "3", "value": "Edward"}), &mapper(), &keys).unwrap();
        let list = Entry::add_api_format(&json!({"property": "2", "value": ["a", "b"]}), &mapper(), &keys).unwrap();

        assert_eq!(scalar.property_name, "name");
        assert_eq!(scalar.value, EntryValue::Scalar(json!("Edward")));
        assert_eq!(list.value, EntryValue::ScalarList(vec![json!("a"), json!("b")]));
    }

    #[test]
    fn test_api_nested_object_and_nested_list() {
        let keys = EntryKeys::default();
        let object = Entry::add_api_format(
            &json!({"property": "5", "value": [{"property": "3", "value": "Home"}]}),
            &mapper(),
            &keys,
        )
        .unwrap();
        let list = Entry::add_api_format(
            &json!({"property": "1", "value": [[{"property": "3", "value": "Edward"}], [{"property": "3", "value": "Ann"}]]}),
            &mapper(),
            &keys,
        )
        .unwrap();

        match object.value {
            EntryValue::Object(nested) => assert_eq!(nested.entries[0].property_name, "name"),
            other => panic!("Expected nested object, got {:?}", other),
        }
        match list.value {
            EntryValue::ObjectList(list) => assert_eq!(list.len(), 2),
            other => panic!("Expected nested list, got {:?}", other),
        }
    }

    #[test]
    fn test_mixed_list_is_rejected() {
        let keys = EntryKeys::default();
        let err = Entry::add_api_format(
            &json!({"property": "2", "value": ["a", {"property": "3", "value": "b"}]}),
            &mapper(),
            &keys,
        )
        .unwrap_err();

        assert_eq!(
            err,
            ConversionError::MixedList {
                property: "tags".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_identifier_is_an_error() {
        let keys = EntryKeys::default();
        let err = Entry::add_api_format(&json!({"property": "42", "value": 1}), &mapper(), &keys).unwrap_err();

        assert_eq!(err, ConversionError::UnknownPropertyId("42".to_string()));
    }

    #[test]
    fn test_missing_value_and_non_string_key() {
        let keys = EntryKeys::default();

        assert_eq!(
            Entry::add_api_format(&json!({"property": "3"}), &mapper(), &keys).unwrap_err(),
            ConversionError::MissingField("value".to_string())
        );
        assert_eq!(
            Entry::add_api_format(&json!({"property": 3, "value": "x"}), &mapper(), &keys).unwrap_err(),
            ConversionError::InvalidKey {
                field: "property".to_string()
            }
        );
    }

    #[test]
    fn test_form_object_and_object_list() {
        let object = Entry::add_form_format("address", &json!({"name": "Home"}), &mapper()).unwrap();
        let list = Entry::add_form_format("contacts", &json!([{"name": "Edward"}, {"name": "Ann"}]), &mapper()).unwrap();

        assert_eq!(object.property_id, "5");
        assert!(matches!(object.value, EntryValue::Object(_)));
        assert!(matches!(list.value, EntryValue::ObjectList(ref l) if l.len() == 2));
        assert_eq!(list.get_form_format(), json!([{"name": "Edward"}, {"name": "Ann"}]));
    }

    #[test]
    fn test_empty_form_object_reads_as_empty_list() {
        let keys = EntryKeys::default();
        let entry = Entry::add_form_format("address", &json!({}), &mapper()).unwrap();

        assert_eq!(entry.value, EntryValue::ScalarList(Vec::new()));
        assert_eq!(entry.get_form_format(), json!([]));

        let api = entry.get_api_format(&keys);
        assert_eq!(api, json!({"property": "5", "value": []}));
        let reparsed = Entry::add_api_format(&api, &mapper(), &keys).unwrap();
        assert_eq!(reparsed, entry);
    }

    #[test]
    fn test_form_list_of_lists_is_rejected() {
        let err = Entry::add_form_format("tags", &json!([["a"], ["b"]]), &mapper()).unwrap_err();
        assert!(matches!(err, ConversionError::UnexpectedShape { .. }));
    }

    #[test]
    fn test_find_and_delete_nested_entry_by_uuid() {
        let keys = EntryKeys::default();
        let raw = json!([
            [{"property": "6", "value": "u-1"}, {"property": "3", "value": "Edward"}],
            [{"property": "6", "value": "u-2"}, {"property": "3", "value": "Ann"}]
        ]);
        let mut list = NestedListEntry::add_api_format(raw.as_array().unwrap(), &mapper(), &keys).unwrap();

        let (position, found) = list.find_nested_entry("uuid", "u-2").unwrap();
        assert_eq!(position, 1);
        assert_eq!(found.get_entry_by_name("name").unwrap().as_str(), Some("Ann"));
        assert!(list.find_nested_entry("uuid", "u-3").is_none());

        let removed = list.delete_nested_entry("uuid", "u-1").unwrap();
        assert_eq!(removed.uuid(), Some("u-1"));
        assert_eq!(list.len(), 1);
        assert!(list.delete_nested_entry("uuid", "u-1").is_none());
    }
}
