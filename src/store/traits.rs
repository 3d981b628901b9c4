use crate::model::{EntityLocation, FormDefinition, Id, Property, Study};
use anyhow::Result;

/// Paging and visibility options for study listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudyFilter {
    pub skip: usize,
    pub limit: Option<usize>,
    pub include_deprecated: bool,
}

#[async_trait::async_trait]
pub trait StudyStore: Send + Sync {
    async fn get_study(&self, id: &Id) -> Result<Option<Study>>;
    async fn list_studies(&self, filter: &StudyFilter) -> Result<Vec<Study>>;
    /// Write the study document and replace its entity index rows in one step
    async fn upsert_study(&self, study: &Study, locations: &[EntityLocation]) -> Result<()>;
    async fn set_study_deprecated(&self, id: &Id, deprecated: bool) -> Result<bool>;
    /// Delete a study together with its entity index rows
    async fn delete_study(&self, id: &Id) -> Result<bool>;
    async fn deprecate_all_studies(&self) -> Result<u64>;
    async fn delete_all_studies(&self) -> Result<u64>;
}

/// Secondary index of nested entities: uuid -> owning study and parent entity
#[async_trait::async_trait]
pub trait EntityIndexStore: Send + Sync {
    async fn find_entity_locations(&self, uuid: &str) -> Result<Vec<EntityLocation>>;
}

#[async_trait::async_trait]
pub trait PropertyStore: Send + Sync {
    async fn get_property(&self, id: &Id) -> Result<Option<Property>>;
    async fn list_properties(&self, include_deprecated: bool) -> Result<Vec<Property>>;
    async fn upsert_property(&self, property: Property) -> Result<()>;
}

#[async_trait::async_trait]
pub trait FormStore: Send + Sync {
    async fn get_form(&self, name: &str) -> Result<Option<FormDefinition>>;
    async fn list_forms(&self) -> Result<Vec<FormDefinition>>;
    async fn upsert_form(&self, form: FormDefinition) -> Result<()>;
}

pub trait Store: StudyStore + EntityIndexStore + PropertyStore + FormStore + Send + Sync {}
