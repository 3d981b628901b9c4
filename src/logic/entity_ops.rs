//! Nested entity lists inside a study's entry tree.
//!
//! A list-valued entry (`datasets`, `samples`, a dataset's `process_events`)
//! is treated as a collection of entities addressed by their `uuid` field.
//! An empty list is never kept: removing the last entity removes the entry.

use itertools::Itertools;
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::error::{ApiError, ConversionError};
use crate::logic::converter::FormatConverter;
use crate::model::{
    generate_unique_uuid, Entry, EntryFormat, EntryKeys, EntryValue, NestedEntry, NestedListEntry,
    PropertyMap, UUID_FIELD,
};

/// Independently addressable entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Dataset,
    ProcessEvent,
    Sample,
}

impl EntityKind {
    /// Name of the list entry holding entities of this kind
    pub fn list_prop(self) -> &'static str {
        match self {
            Self::Dataset => "datasets",
            Self::ProcessEvent => "process_events",
            Self::Sample => "samples",
        }
    }

    pub fn singular(self) -> &'static str {
        match self {
            Self::Dataset => "dataset",
            Self::ProcessEvent => "process_event",
            Self::Sample => "sample",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Dataset => "Dataset",
            Self::ProcessEvent => "Processing event",
            Self::Sample => "Sample",
        }
    }
}

/// One step down the entry tree: the entity `uuid` inside list `list_prop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathStep<'a> {
    pub list_prop: &'a str,
    pub uuid: &'a str,
}

impl<'a> PathStep<'a> {
    pub fn new(list_prop: &'a str, uuid: &'a str) -> Self {
        Self { list_prop, uuid }
    }
}

/// Rewrite synonym keys of a Form-format mapping to canonical property names.
///
/// Nested objects are rewritten too. A key and one of its synonyms in the same
/// object is a duplicate property.
pub fn replace_synonyms(form: &Map<String, Value>, mapper: &PropertyMap) -> Result<Map<String, Value>, ApiError> {
    let mut replaced = Map::new();
    for (key, value) in form {
        let name = mapper.canonical_name(key).unwrap_or(key);
        if replaced.contains_key(name) {
            return Err(ApiError::DuplicateProperty(name.to_string()));
        }
        let value = match value {
            Value::Object(nested) => Value::Object(replace_synonyms(nested, mapper)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Object(nested) => replace_synonyms(nested, mapper).map(Value::Object),
                        other => Ok(other.clone()),
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            other => other.clone(),
        };
        replaced.insert(name.to_string(), value);
    }
    Ok(replaced)
}

/// Reject an API-format list carrying the same property identifier twice.
pub fn check_duplicate_properties(entries: &[Value], keys: &EntryKeys) -> Result<(), ApiError> {
    let ids: Vec<String> = entries
        .iter()
        .map(|entry| match entry.get(&keys.key_name) {
            Some(Value::String(id)) => Ok(id.clone()),
            Some(other) => Ok(other.to_string()),
            None => Err(ApiError::request_body("Entries has wrong format.")),
        })
        .collect::<Result<_, _>>()?;

    match ids.into_iter().duplicates().next() {
        Some(duplicate) => Err(ApiError::DuplicateProperty(duplicate)),
        None => Ok(()),
    }
}

/// Parse an incoming entity payload in either format into a converter.
pub fn get_entity_converter<'m>(
    entries: &Value,
    format: EntryFormat,
    mapper: &'m PropertyMap,
    synonyms: bool,
) -> Result<FormatConverter<'m>, ApiError> {
    let converter = FormatConverter::new(mapper);
    match (format, entries) {
        (EntryFormat::Api, Value::Array(list)) => {
            check_duplicate_properties(list, converter.keys())?;
            Ok(converter.add_api_format(list)?)
        }
        (EntryFormat::Form, Value::Object(form)) if synonyms => {
            let form = replace_synonyms(form, mapper)?;
            Ok(converter.add_form_format(&form)?)
        }
        (EntryFormat::Form, Value::Object(form)) => Ok(converter.add_form_format(form)?),
        (EntryFormat::Api, _) => Err(ApiError::request_body(
            "Entries in API format must be a list of {property, value} objects",
        )),
        (EntryFormat::Form, _) => Err(ApiError::request_body(
            "Entries in form format must be an object keyed by property name",
        )),
    }
}

pub fn entity_uuid<'a>(converter: &'a FormatConverter<'_>) -> Option<&'a str> {
    converter.get_entry_by_name(UUID_FIELD).and_then(Entry::as_str)
}

/// Give the entity a fresh v1 UUID, inserted first, unless it already has one.
///
/// Returns the converter and the entity's UUID.
pub fn add_uuid_entry_if_missing<'m>(
    converter: FormatConverter<'m>,
    taken: &HashSet<String>,
) -> Result<(FormatConverter<'m>, String), ConversionError> {
    if let Some(uuid) = entity_uuid(&converter) {
        let uuid = uuid.to_string();
        return Ok((converter, uuid));
    }

    let uuid = generate_unique_uuid(|candidate| taken.contains(candidate));
    let mapper = converter.mapper();
    let uuid_entry = Entry::from_name(UUID_FIELD, EntryValue::Scalar(Value::String(uuid.clone())), mapper)?;

    let mut entries = Vec::with_capacity(converter.entries().len() + 1);
    entries.push(uuid_entry);
    entries.extend(converter.into_entries());

    Ok((FormatConverter::from_entries(mapper, entries), uuid))
}

pub fn nested_list<'a>(entries: &'a [Entry], list_prop: &str) -> Option<&'a NestedListEntry> {
    entries
        .iter()
        .find(|e| e.property_name == list_prop)
        .and_then(|e| match &e.value {
            EntryValue::ObjectList(list) => Some(list),
            _ => None,
        })
}

fn nested_list_mut<'a>(entries: &'a mut [Entry], list_prop: &str) -> Option<&'a mut NestedListEntry> {
    entries
        .iter_mut()
        .find(|e| e.property_name == list_prop)
        .and_then(|e| match &mut e.value {
            EntryValue::ObjectList(list) => Some(list),
            _ => None,
        })
}

pub fn find_entity<'a>(entries: &'a [Entry], list_prop: &str, uuid: &str) -> Option<&'a NestedEntry> {
    nested_list(entries, list_prop)?
        .find_nested_entry(UUID_FIELD, uuid)
        .map(|(_, entity)| entity)
}

fn find_entity_mut<'a>(entries: &'a mut [Entry], list_prop: &str, uuid: &str) -> Option<&'a mut NestedEntry> {
    nested_list_mut(entries, list_prop)?
        .items
        .iter_mut()
        .find(|item| item.uuid() == Some(uuid))
}

/// Append an entity to `list_prop`, creating the list entry if absent.
pub fn append_entity(
    entries: &mut Vec<Entry>,
    list_prop: &str,
    entity: NestedEntry,
    mapper: &PropertyMap,
) -> Result<(), ConversionError> {
    match entries.iter_mut().find(|e| e.property_name == list_prop) {
        Some(entry) => match &mut entry.value {
            EntryValue::ObjectList(list) => list.items.push(entity),
            EntryValue::ScalarList(values) if values.is_empty() => {
                entry.value = EntryValue::ObjectList(NestedListEntry::new(vec![entity]));
            }
            _ => {
                return Err(ConversionError::UnexpectedShape {
                    context: list_prop.to_string(),
                    expected: "a list of objects",
                })
            }
        },
        None => entries.push(Entry::from_name(
            list_prop,
            EntryValue::ObjectList(NestedListEntry::new(vec![entity])),
            mapper,
        )?),
    }
    Ok(())
}

/// Replace the entity carrying `uuid` in place. Returns false if absent.
pub fn replace_entity(entries: &mut [Entry], list_prop: &str, uuid: &str, entity: NestedEntry) -> bool {
    match find_entity_mut(entries, list_prop, uuid) {
        Some(existing) => {
            *existing = entity;
            true
        }
        None => false,
    }
}

/// Remove the entity carrying `uuid`; the list entry goes away with its last entity.
pub fn remove_entity(entries: &mut Vec<Entry>, list_prop: &str, uuid: &str) -> Option<NestedEntry> {
    let list = nested_list_mut(entries, list_prop)?;
    let removed = list.delete_nested_entry(UUID_FIELD, uuid)?;
    if list.is_empty() {
        entries.retain(|e| e.property_name != list_prop);
    }
    Some(removed)
}

/// Remove the whole list entry. Returns false if it was absent.
pub fn remove_list(entries: &mut Vec<Entry>, list_prop: &str) -> bool {
    let before = entries.len();
    entries.retain(|e| e.property_name != list_prop);
    entries.len() != before
}

/// Entries of the entity reached by `path`; an empty path is the root itself.
pub fn get_at_path<'a>(entries: &'a [Entry], path: &[PathStep<'_>]) -> Option<&'a [Entry]> {
    path.iter().try_fold(entries, |current, step| {
        find_entity(current, step.list_prop, step.uuid).map(|entity| entity.entries.as_slice())
    })
}

/// Apply `f` to the entries of the entity reached by `path`.
pub fn modify_at_path<T>(
    entries: &mut Vec<Entry>,
    path: &[PathStep<'_>],
    f: impl FnOnce(&mut Vec<Entry>) -> T,
) -> Option<T> {
    match path.split_first() {
        None => Some(f(entries)),
        Some((step, rest)) => {
            let entity = find_entity_mut(entries, step.list_prop, step.uuid)?;
            modify_at_path(&mut entity.entries, rest, f)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapper() -> PropertyMap {
        PropertyMap::from_pairs([
            ("p-uuid", "uuid"),
            ("p-datasets", "datasets"),
            ("p-name", "dataset_name"),
            ("p-pes", "process_events"),
            ("p-pe-type", "process_event_type"),
            ("p-species", "species"),
        ])
        .with_synonyms("species", &["organism"])
    }

    fn study_entries(mapper: &PropertyMap) -> Vec<Entry> {
        let form = json!({
            "datasets": [
                {"uuid": "d-1", "dataset_name": "RNA", "process_events": [{"uuid": "pe-1", "process_event_type": "seq"}]},
                {"uuid": "d-2", "dataset_name": "DNA"}
            ]
        });
        FormatConverter::new(mapper)
            .add_form_format(form.as_object().unwrap())
            .unwrap()
            .into_entries()
    }

    fn entity(mapper: &PropertyMap, form: Value) -> NestedEntry {
        FormatConverter::new(mapper)
            .add_form_format(form.as_object().unwrap())
            .unwrap()
            .into_nested_entry()
    }

    #[test]
    fn test_entity_kind_names() {
        assert_eq!(EntityKind::ProcessEvent.list_prop(), "process_events");
        assert_eq!(EntityKind::ProcessEvent.singular(), "process_event");
    }

    #[test]
    fn test_replace_synonyms() {
        let form = json!({"organism": "human", "datasets": [{"organism": "mouse"}]});
        let replaced = replace_synonyms(form.as_object().unwrap(), &mapper()).unwrap();

        assert_eq!(
            Value::Object(replaced),
            json!({"species": "human", "datasets": [{"species": "mouse"}]})
        );
    }

    #[test]
    fn test_replace_synonyms_rejects_name_and_synonym_together() {
        let form = json!({"species": "human", "organism": "human"});
        let err = replace_synonyms(form.as_object().unwrap(), &mapper()).unwrap_err();

        assert!(matches!(err, ApiError::DuplicateProperty(name) if name == "species"));
    }

    #[test]
    fn test_get_entity_converter_rejects_duplicate_properties() {
        let mapper = mapper();
        let entries = json!([
            {"property": "p-name", "value": "a"},
            {"property": "p-name", "value": "b"}
        ]);

        let err = get_entity_converter(&entries, EntryFormat::Api, &mapper, false).unwrap_err();
        assert!(matches!(err, ApiError::DuplicateProperty(_)));
    }

    #[test]
    fn test_get_entity_converter_rejects_wrong_shape() {
        let mapper = mapper();
        let err = get_entity_converter(&json!({"dataset_name": "a"}), EntryFormat::Api, &mapper, false).unwrap_err();

        assert!(matches!(err, ApiError::RequestBody(_)));
    }

    #[test]
    fn test_add_uuid_entry_if_missing_inserts_first() {
        let mapper = mapper();
        let converter = get_entity_converter(&json!({"dataset_name": "RNA"}), EntryFormat::Form, &mapper, true).unwrap();

        let (converter, uuid) = add_uuid_entry_if_missing(converter, &HashSet::new()).unwrap();

        assert_eq!(converter.entries()[0].property_name, "uuid");
        assert_eq!(entity_uuid(&converter), Some(uuid.as_str()));
    }

    #[test]
    fn test_add_uuid_entry_keeps_existing_uuid() {
        let mapper = mapper();
        let converter =
            get_entity_converter(&json!({"dataset_name": "RNA", "uuid": "d-9"}), EntryFormat::Form, &mapper, true).unwrap();

        let (converter, uuid) = add_uuid_entry_if_missing(converter, &HashSet::new()).unwrap();

        assert_eq!(uuid, "d-9");
        assert_eq!(converter.entries().len(), 2);
    }

    #[test]
    fn test_find_and_path_navigation() {
        let mapper = mapper();
        let entries = study_entries(&mapper);

        assert!(find_entity(&entries, "datasets", "d-2").is_some());
        assert!(find_entity(&entries, "datasets", "d-3").is_none());

        let path = [PathStep::new("datasets", "d-1")];
        let dataset = get_at_path(&entries, &path).unwrap();
        assert!(find_entity(dataset, "process_events", "pe-1").is_some());
        assert!(get_at_path(&entries, &[PathStep::new("datasets", "nope")]).is_none());
    }

    #[test]
    fn test_append_creates_list_entry_when_absent() {
        let mapper = mapper();
        let mut entries = Vec::new();

        append_entity(&mut entries, "datasets", entity(&mapper, json!({"uuid": "d-1"})), &mapper).unwrap();
        append_entity(&mut entries, "datasets", entity(&mapper, json!({"uuid": "d-2"})), &mapper).unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(nested_list(&entries, "datasets").unwrap().len(), 2);
    }

    #[test]
    fn test_append_rejects_scalar_entry() {
        let mapper = mapper();
        let mut entries = vec![Entry::add_form_format("datasets", &json!("oops"), &mapper).unwrap()];

        let err = append_entity(&mut entries, "datasets", NestedEntry::default(), &mapper).unwrap_err();
        assert!(matches!(err, ConversionError::UnexpectedShape { .. }));
    }

    #[test]
    fn test_removing_last_entity_removes_list_entry() {
        let mapper = mapper();
        let mut entries = study_entries(&mapper);

        assert!(remove_entity(&mut entries, "datasets", "d-1").is_some());
        assert!(nested_list(&entries, "datasets").is_some());
        assert!(remove_entity(&mut entries, "datasets", "d-2").is_some());

        let form = FormatConverter::from_entries(&mapper, entries).get_form_format();
        assert!(!form.contains_key("datasets"));
    }

    #[test]
    fn test_modify_at_path_reaches_nested_lists() {
        let mapper = mapper();
        let mut entries = study_entries(&mapper);
        let path = [PathStep::new("datasets", "d-1")];

        let removed = modify_at_path(&mut entries, &path, |dataset| {
            remove_entity(dataset, "process_events", "pe-1")
        });
        assert!(matches!(removed, Some(Some(_))));

        let dataset = get_at_path(&entries, &path).unwrap();
        assert!(nested_list(dataset, "process_events").is_none());
        assert!(modify_at_path(&mut entries, &[PathStep::new("datasets", "x")], |_| ()).is_none());
    }

    #[test]
    fn test_replace_entity_in_place() {
        let mapper = mapper();
        let mut entries = study_entries(&mapper);
        let updated = entity(&mapper, json!({"uuid": "d-2", "dataset_name": "WGS"}));

        assert!(replace_entity(&mut entries, "datasets", "d-2", updated.clone()));
        assert_eq!(find_entity(&entries, "datasets", "d-2"), Some(&updated));
        assert!(!replace_entity(&mut entries, "datasets", "d-3", updated));
    }
}
