use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use uuid::Uuid;

pub type Id = String;

/// Reserved field holding the identity of an entity nested inside a study.
pub const UUID_FIELD: &str = "uuid";

/// Which of the two entry shapes a payload or response uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryFormat {
    /// `[{"property": <id>, "value": ...}]`
    #[default]
    Api,
    /// `{<name>: ...}`
    Form,
}

/// Identifier of a top-level document (study, property).
pub fn generate_id() -> Id {
    Uuid::new_v4().simple().to_string()
}

/// Lowercase hyphenated version 1 UUID used for nested entities.
pub fn generate_uuid() -> String {
    Uuid::now_v1(node_id()).to_string()
}

/// Generate a v1 UUID that `is_taken` does not reject.
pub fn generate_unique_uuid(is_taken: impl Fn(&str) -> bool) -> String {
    loop {
        let candidate = generate_uuid();
        if !is_taken(&candidate) {
            return candidate;
        }
    }
}

// Random node id, fixed for the lifetime of the process.
fn node_id() -> &'static [u8; 6] {
    static NODE_ID: OnceLock<[u8; 6]> = OnceLock::new();
    NODE_ID.get_or_init(|| {
        let seed = Uuid::new_v4();
        let mut node = [0u8; 6];
        node.copy_from_slice(&seed.as_bytes()[..6]);
        // Multicast bit marks a node id that is not a real MAC address
        node[0] |= 0x01;
        node
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_uuid_is_v1_lowercase_hyphenated() {
        let value = generate_uuid();
        let parsed = Uuid::parse_str(&value).unwrap();

        assert_eq!(parsed.get_version_num(), 1);
        assert_eq!(value, value.to_lowercase());
        assert_eq!(value.matches('-').count(), 4);
    }

    #[test]
    fn test_generate_unique_uuid_skips_taken_values() {
        let taken: HashSet<String> = (0..50).map(|_| generate_uuid()).collect();
        let fresh = generate_unique_uuid(|candidate| taken.contains(candidate));

        assert!(!taken.contains(&fresh));
    }

    #[test]
    fn test_entry_format_deserialization() {
        let api: EntryFormat = serde_json::from_str("\"api\"").unwrap();
        let form: EntryFormat = serde_json::from_str("\"form\"").unwrap();

        assert_eq!(api, EntryFormat::Api);
        assert_eq!(form, EntryFormat::Form);
        assert_eq!(EntryFormat::default(), EntryFormat::Api);
        assert!(serde_json::from_str::<EntryFormat>("\"xml\"").is_err());
    }
}
