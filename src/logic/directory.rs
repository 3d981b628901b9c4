use anyhow::Result;

use crate::model::PropertyMap;
use crate::store::PropertyStore;

/// Build the property lookup tables for one request.
///
/// Deprecated properties are only included when asked for; stored documents
/// may still reference them.
pub async fn load_property_map<S: PropertyStore + ?Sized>(store: &S, include_deprecated: bool) -> Result<PropertyMap> {
    let properties = store.list_properties(include_deprecated).await?;
    Ok(PropertyMap::from_properties(&properties))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Property;
    use crate::store::InMemoryStore;

    fn property(id: &str, name: &str, deprecated: bool) -> Property {
        Property {
            id: id.to_string(),
            name: name.to_string(),
            label: name.to_string(),
            description: String::new(),
            level: String::new(),
            synonyms: Vec::new(),
            value_type: None,
            deprecated,
        }
    }

    #[tokio::test]
    async fn test_deprecated_properties_are_opt_in() {
        let store = InMemoryStore::new();
        store.upsert_property(property("1", "username", false)).await.unwrap();
        store.upsert_property(property("2", "old_name", true)).await.unwrap();

        let active = load_property_map(&store, false).await.unwrap();
        let all = load_property_map(&store, true).await.unwrap();

        assert!(active.name_of("2").is_err());
        assert_eq!(all.name_of("2").unwrap(), "old_name");
        assert_eq!(active.len(), 1);
    }
}
