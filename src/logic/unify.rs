//! UUID unification for sample batches.
//!
//! A sample tree may reuse individuals and treatments that already exist in the
//! study. Nested objects without a UUID that match an existing object of the
//! same property (same content, UUID aside) take over its UUID, so the same
//! logical entity is not stored twice under different identities.

use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::model::{generate_unique_uuid, UUID_FIELD};

struct KnownEntity {
    property: String,
    content: Map<String, Value>,
    uuid: String,
}

#[derive(Default)]
struct Pool {
    known: Vec<KnownEntity>,
    taken: HashSet<String>,
}

impl Pool {
    fn register(&mut self, property: &str, object: &Map<String, Value>) {
        if let Some(uuid) = object.get(UUID_FIELD).and_then(Value::as_str) {
            self.taken.insert(uuid.to_string());
            self.known.push(KnownEntity {
                property: property.to_string(),
                content: without_uuid(object),
                uuid: uuid.to_string(),
            });
        }
    }

    fn find(&self, property: &str, content: &Map<String, Value>) -> Option<&str> {
        self.known
            .iter()
            .find(|known| known.property == property && known.content == *content)
            .map(|known| known.uuid.as_str())
    }

    fn fresh_uuid(&mut self) -> String {
        let uuid = generate_unique_uuid(|candidate| self.taken.contains(candidate));
        self.taken.insert(uuid.clone());
        uuid
    }

    // Register every nested object of an existing tree.
    fn collect(&mut self, object: &Map<String, Value>) {
        for (property, value) in object {
            for child in child_objects(value) {
                self.collect(child);
                self.register(property, child);
            }
        }
    }
}

fn child_objects(value: &Value) -> Vec<&Map<String, Value>> {
    match value {
        Value::Object(child) => vec![child],
        Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
        _ => Vec::new(),
    }
}

fn without_uuid(object: &Map<String, Value>) -> Map<String, Value> {
    object
        .iter()
        .filter(|(key, _)| key.as_str() != UUID_FIELD)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn with_uuid_first(uuid: String, object: Map<String, Value>) -> Map<String, Value> {
    let mut result = Map::new();
    result.insert(UUID_FIELD.to_string(), Value::String(uuid));
    result.extend(object.into_iter().filter(|(key, _)| key != UUID_FIELD));
    result
}

fn unify_children(object: Map<String, Value>, pool: &mut Pool) -> Map<String, Value> {
    object
        .into_iter()
        .map(|(property, value)| {
            let value = match value {
                Value::Object(child) => Value::Object(unify_object(&property, child, pool)),
                Value::Array(items) => Value::Array(
                    items
                        .into_iter()
                        .map(|item| match item {
                            Value::Object(child) => Value::Object(unify_object(&property, child, pool)),
                            other => other,
                        })
                        .collect(),
                ),
                other => other,
            };
            (property, value)
        })
        .collect()
}

fn unify_object(property: &str, object: Map<String, Value>, pool: &mut Pool) -> Map<String, Value> {
    let object = unify_children(object, pool);

    if object.get(UUID_FIELD).and_then(Value::as_str).is_some() {
        pool.register(property, &object);
        return object;
    }

    let found = pool.find(property, &object).map(str::to_string);
    let uuid = found.unwrap_or_else(|| pool.fresh_uuid());
    let object = with_uuid_first(uuid, object);
    pool.register(property, &object);
    object
}

/// Give every object of the new samples a UUID, reusing the UUIDs of matching
/// nested entities already present in `existing` samples (or earlier in the batch).
///
/// Samples themselves keep a client-supplied UUID or get a fresh one.
pub fn unify_sample_entities_uuids(existing: &[Value], new_samples: Vec<Map<String, Value>>) -> Vec<Map<String, Value>> {
    let mut pool = Pool::default();
    for sample in existing.iter().filter_map(Value::as_object) {
        pool.collect(sample);
        if let Some(uuid) = sample.get(UUID_FIELD).and_then(Value::as_str) {
            pool.taken.insert(uuid.to_string());
        }
    }

    new_samples
        .into_iter()
        .map(|sample| {
            let sample = unify_children(sample, &mut pool);
            match sample.get(UUID_FIELD).and_then(Value::as_str) {
                Some(uuid) => {
                    pool.taken.insert(uuid.to_string());
                    sample
                }
                None => {
                    let uuid = pool.fresh_uuid();
                    with_uuid_first(uuid, sample)
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn existing() -> Vec<Value> {
        vec![json!({
            "uuid": "s-1",
            "sample_name": "S1",
            "individual": {
                "uuid": "i-1",
                "individual_name": "I1",
                "treatments": [{"uuid": "t-1", "treatment_name": "T1"}]
            }
        })]
    }

    #[test]
    fn test_matching_nested_entities_reuse_existing_uuids() {
        let new = vec![as_map(json!({
            "sample_name": "S2",
            "individual": {"individual_name": "I1", "treatments": [{"treatment_name": "T1"}]}
        }))];

        let unified = unify_sample_entities_uuids(&existing(), new);
        let individual = unified[0]["individual"].as_object().unwrap();

        assert_eq!(individual["uuid"], json!("i-1"));
        assert_eq!(individual["treatments"][0]["uuid"], json!("t-1"));
        assert_ne!(unified[0]["uuid"], json!("s-1"));
    }

    #[test]
    fn test_different_content_gets_fresh_uuid() {
        let new = vec![as_map(json!({
            "sample_name": "S2",
            "individual": {"individual_name": "I2"}
        }))];

        let unified = unify_sample_entities_uuids(&existing(), new);
        let uuid = unified[0]["individual"]["uuid"].as_str().unwrap();

        assert_ne!(uuid, "i-1");
        assert_eq!(uuid::Uuid::parse_str(uuid).unwrap().get_version_num(), 1);
    }

    #[test]
    fn test_client_uuids_are_kept_and_uuid_is_first() {
        let new = vec![as_map(json!({
            "sample_name": "S2",
            "uuid": "s-9",
            "individual": {"individual_name": "I3", "uuid": "i-9"}
        }))];

        let unified = unify_sample_entities_uuids(&[], new);

        assert_eq!(unified[0]["uuid"], json!("s-9"));
        assert_eq!(unified[0]["individual"]["uuid"], json!("i-9"));
    }

    #[test]
    fn test_identical_entities_within_one_batch_share_uuid() {
        let new = vec![
            as_map(json!({"sample_name": "A", "individual": {"individual_name": "I5"}})),
            as_map(json!({"sample_name": "B", "individual": {"individual_name": "I5"}})),
        ];

        let unified = unify_sample_entities_uuids(&[], new);

        assert_eq!(unified[0]["individual"]["uuid"], unified[1]["individual"]["uuid"]);
        assert_ne!(unified[0]["uuid"], unified[1]["uuid"]);
        assert_eq!(unified[0].keys().next().map(String::as_str), Some("uuid"));
    }
}
