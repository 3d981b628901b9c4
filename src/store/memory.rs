use anyhow::Result;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::model::{EntityLocation, FormDefinition, Id, Property, Study};
use crate::store::traits::{EntityIndexStore, FormStore, PropertyStore, Store, StudyFilter, StudyStore};

#[derive(Debug, Default)]
struct Documents {
    studies: HashMap<Id, Study>,
    /// Study ids in insertion order
    study_order: Vec<Id>,
    /// Entity index rows keyed by entity uuid
    entity_index: HashMap<String, Vec<EntityLocation>>,
    /// Entity uuids indexed per study, for row replacement
    study_entities: HashMap<Id, Vec<String>>,
    properties: HashMap<Id, Property>,
    property_order: Vec<Id>,
    forms: BTreeMap<String, FormDefinition>,
}

impl Documents {
    fn clear_index_rows(&mut self, study_id: &Id) {
        for uuid in self.study_entities.remove(study_id).unwrap_or_default() {
            if let Some(rows) = self.entity_index.get_mut(&uuid) {
                rows.retain(|row| row.study_id != *study_id);
                if rows.is_empty() {
                    self.entity_index.remove(&uuid);
                }
            }
        }
    }

    fn remove_study(&mut self, id: &Id) -> bool {
        self.clear_index_rows(id);
        self.study_order.retain(|existing| existing != id);
        self.studies.remove(id).is_some()
    }
}

/// Process-local store, used for development and tests.
///
/// One lock guards documents and index together, so a study write and its
/// index rows are always observed together.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Documents>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl StudyStore for InMemoryStore {
    async fn get_study(&self, id: &Id) -> Result<Option<Study>> {
        Ok(self.inner.read().studies.get(id).cloned())
    }

    async fn list_studies(&self, filter: &StudyFilter) -> Result<Vec<Study>> {
        let documents = self.inner.read();
        let studies = documents
            .study_order
            .iter()
            .filter_map(|id| documents.studies.get(id))
            .filter(|study| filter.include_deprecated || !study.meta_information.deprecated)
            .skip(filter.skip)
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(studies)
    }

    async fn upsert_study(&self, study: &Study, locations: &[EntityLocation]) -> Result<()> {
        let mut documents = self.inner.write();

        documents.clear_index_rows(&study.id);
        for location in locations {
            documents
                .entity_index
                .entry(location.uuid.clone())
                .or_default()
                .push(location.clone());
        }
        documents.study_entities.insert(
            study.id.clone(),
            locations.iter().map(|l| l.uuid.clone()).collect(),
        );

        if documents.studies.insert(study.id.clone(), study.clone()).is_none() {
            documents.study_order.push(study.id.clone());
        }
        Ok(())
    }

    async fn set_study_deprecated(&self, id: &Id, deprecated: bool) -> Result<bool> {
        let mut documents = self.inner.write();
        match documents.studies.get_mut(id) {
            Some(study) => {
                study.meta_information.deprecated = deprecated;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_study(&self, id: &Id) -> Result<bool> {
        Ok(self.inner.write().remove_study(id))
    }

    async fn deprecate_all_studies(&self) -> Result<u64> {
        let mut documents = self.inner.write();
        for study in documents.studies.values_mut() {
            study.meta_information.deprecated = true;
        }
        Ok(documents.studies.len() as u64)
    }

    async fn delete_all_studies(&self) -> Result<u64> {
        let mut documents = self.inner.write();
        let count = documents.studies.len() as u64;
        documents.studies.clear();
        documents.study_order.clear();
        documents.entity_index.clear();
        documents.study_entities.clear();
        Ok(count)
    }
}

#[async_trait::async_trait]
impl EntityIndexStore for InMemoryStore {
    async fn find_entity_locations(&self, uuid: &str) -> Result<Vec<EntityLocation>> {
        Ok(self
            .inner
            .read()
            .entity_index
            .get(uuid)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl PropertyStore for InMemoryStore {
    async fn get_property(&self, id: &Id) -> Result<Option<Property>> {
        Ok(self.inner.read().properties.get(id).cloned())
    }

    async fn list_properties(&self, include_deprecated: bool) -> Result<Vec<Property>> {
        let documents = self.inner.read();
        Ok(documents
            .property_order
            .iter()
            .filter_map(|id| documents.properties.get(id))
            .filter(|p| include_deprecated || !p.deprecated)
            .cloned()
            .collect())
    }

    async fn upsert_property(&self, property: Property) -> Result<()> {
        let mut documents = self.inner.write();
        if !documents.properties.contains_key(&property.id) {
            documents.property_order.push(property.id.clone());
        }
        documents.properties.insert(property.id.clone(), property);
        Ok(())
    }
}

#[async_trait::async_trait]
impl FormStore for InMemoryStore {
    async fn get_form(&self, name: &str) -> Result<Option<FormDefinition>> {
        Ok(self.inner.read().forms.get(name).cloned())
    }

    async fn list_forms(&self) -> Result<Vec<FormDefinition>> {
        Ok(self.inner.read().forms.values().cloned().collect())
    }

    async fn upsert_form(&self, form: FormDefinition) -> Result<()> {
        self.inner.write().forms.insert(form.name.clone(), form);
        Ok(())
    }
}

impl Store for InMemoryStore {}
