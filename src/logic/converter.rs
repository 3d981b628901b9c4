use itertools::Itertools;
use serde_json::{Map, Value};

use crate::error::ConversionError;
use crate::logic::validate::FormSchema;
use crate::model::{Entry, EntryKeys, EntryValue, NestedEntry, NestedListEntry, PropertyMap, UUID_FIELD};

/// What [`FormatConverter::remove_entries`] removes.
#[derive(Debug, Clone, Copy)]
pub enum Removal<'a> {
    Entries(&'a [Entry]),
    Names(&'a [String]),
}

/// Converts one level of entries (a study's top-level entries, or the fields of
/// one entity) between API format and Form format.
///
/// Editing operations consume the converter and return a new one.
#[derive(Debug, Clone)]
pub struct FormatConverter<'m> {
    mapper: &'m PropertyMap,
    keys: EntryKeys,
    entries: Vec<Entry>,
}

impl<'m> FormatConverter<'m> {
    pub fn new(mapper: &'m PropertyMap) -> Self {
        Self::with_keys(mapper, EntryKeys::default())
    }

    pub fn with_keys(mapper: &'m PropertyMap, keys: EntryKeys) -> Self {
        Self {
            mapper,
            keys,
            entries: Vec::new(),
        }
    }

    pub fn from_entries(mapper: &'m PropertyMap, entries: Vec<Entry>) -> Self {
        Self {
            entries,
            ..Self::new(mapper)
        }
    }

    /// Replace the content with a parsed API-format list.
    pub fn add_api_format(mut self, entries: &[Value]) -> Result<Self, ConversionError> {
        self.entries = NestedEntry::add_api_format(entries, self.mapper, &self.keys)?.entries;
        Ok(self)
    }

    /// Replace the content with a parsed Form-format mapping.
    pub fn add_form_format(mut self, form: &Map<String, Value>) -> Result<Self, ConversionError> {
        self.entries = NestedEntry::add_form_format(form, self.mapper)?.entries;
        Ok(self)
    }

    pub fn get_api_format(&self) -> Vec<Value> {
        self.entries
            .iter()
            .map(|entry| entry.get_api_format(&self.keys))
            .collect()
    }

    pub fn get_form_format(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .map(|entry| (entry.property_name.clone(), entry.get_form_format()))
            .collect()
    }

    pub fn get_entry_by_name(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.property_name == name)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }

    pub fn into_nested_entry(self) -> NestedEntry {
        NestedEntry::new(self.entries)
    }

    pub fn mapper(&self) -> &'m PropertyMap {
        self.mapper
    }

    pub fn keys(&self) -> &EntryKeys {
        &self.keys
    }

    /// Property names appearing more than once, in first-seen order.
    pub fn duplicated_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.property_name.clone())
            .duplicates()
            .collect()
    }

    /// Trim strings and drop null or empty values, recursively.
    ///
    /// Returns the cleaned converter and the names of the top-level entries that
    /// were dropped. The `uuid` entry is never dropped.
    pub fn clean_data(self) -> (Self, Vec<String>) {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.entries.len());

        for entry in self.entries {
            let name = entry.property_name.clone();
            match clean_entry(entry) {
                Some(entry) => kept.push(entry),
                None => removed.push(name),
            }
        }

        (
            Self {
                entries: kept,
                ..Self::with_keys(self.mapper, self.keys)
            },
            removed,
        )
    }

    /// Upsert by property name: replace the entry with the same name in place,
    /// append it otherwise.
    pub fn add_or_update_entries(mut self, new_entries: Vec<Entry>) -> Self {
        for new_entry in new_entries {
            match self
                .entries
                .iter_mut()
                .find(|e| e.property_name == new_entry.property_name)
            {
                Some(existing) => *existing = new_entry,
                None => self.entries.push(new_entry),
            }
        }
        self
    }

    pub fn remove_entries(mut self, removal: Removal<'_>) -> Self {
        match removal {
            Removal::Entries(entries) => self.entries.retain(|e| !entries.contains(e)),
            Removal::Names(names) => self.entries.retain(|e| !names.contains(&e.property_name)),
        }
        self
    }

    /// Reorder entries to the field order of `form`.
    ///
    /// `uuid` comes first, then the form's fields, then any remaining entries in
    /// their current order.
    pub fn sort_from_form(mut self, form: &dyn FormSchema) -> Self {
        let order = form.field_names();
        self.entries.sort_by_key(|entry| {
            if entry.property_name == UUID_FIELD {
                (0, 0)
            } else {
                match order.iter().position(|name| *name == entry.property_name) {
                    Some(position) => (1, position),
                    None => (2, 0),
                }
            }
        });
        self
    }
}

fn clean_entry(entry: Entry) -> Option<Entry> {
    if entry.property_name == UUID_FIELD {
        return Some(entry);
    }
    let value = clean_value(entry.value)?;
    Some(Entry { value, ..entry })
}

fn clean_scalar(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else if trimmed.len() == s.len() {
                Some(Value::String(s))
            } else {
                Some(Value::String(trimmed.to_string()))
            }
        }
        other => Some(other),
    }
}

fn clean_nested(nested: NestedEntry) -> Option<NestedEntry> {
    let entries: Vec<Entry> = nested.entries.into_iter().filter_map(clean_entry).collect();
    if entries.is_empty() {
        None
    } else {
        Some(NestedEntry::new(entries))
    }
}

fn clean_value(value: EntryValue) -> Option<EntryValue> {
    match value {
        EntryValue::Scalar(v) => clean_scalar(v).map(EntryValue::Scalar),
        EntryValue::ScalarList(values) => {
            let values: Vec<Value> = values.into_iter().filter_map(clean_scalar).collect();
            (!values.is_empty()).then_some(EntryValue::ScalarList(values))
        }
        EntryValue::Object(nested) => clean_nested(nested).map(EntryValue::Object),
        EntryValue::ObjectList(list) => {
            let items: Vec<NestedEntry> = list.items.into_iter().filter_map(clean_nested).collect();
            (!items.is_empty()).then(|| EntryValue::ObjectList(NestedListEntry::new(items)))
        }
    }
}
