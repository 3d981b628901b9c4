//! Study service: study CRUD, nested entity operations and lookups.
//!
//! Every mutation follows the same sequence: load the study, parse its entries
//! with a fresh property map, edit the entry tree, validate, then commit the
//! new entries, workflow state, change log and entity index rows in one write.
//! There is no version check between load and commit, so concurrent updates of
//! the same study are last-write-wins.

use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::error::ApiError;
use crate::logic::converter::{FormatConverter, Removal};
use crate::logic::directory::load_property_map;
use crate::logic::entity_ops::{
    add_uuid_entry_if_missing, append_entity, find_entity, get_at_path, get_entity_converter, modify_at_path,
    nested_list, remove_entity, remove_list, replace_entity, EntityKind, PathStep,
};
use crate::logic::lookup::{
    collect_entity_locations, entity_uuids, find_study_id_and_lvl1_uuid_from_lvl2_uuid,
    find_study_id_from_lvl1_uuid, rebuild_entity_index,
};
use crate::logic::search_index::{spawn_index_task, IndexJob, StudyIndexer};
use crate::logic::state_machine::StateMachine;
use crate::logic::unify::unify_sample_entities_uuids;
use crate::logic::validate::{
    validate_form_format_against_form, EntityValidator, SampleStep, SampleValidator, SingleFormValidator,
};
use crate::model::{
    generate_id, manual_user, ChangeLog, DeletePayload, EntriesPayload, Entry, EntryFormat, EntryKeys, FormDefinition,
    Id, MetaInformation, NestedEntry, NewProperty, NewStudy, Property, PropertyMap, SampleFormNames, SamplePayload,
    SampleValidationFlags, SamplesPayload, Study, UserContext, UUID_FIELD,
};
use crate::store::{Store, StudyFilter};

/// Form-format fields that must be unique across studies
const ALTERNATE_KEYS: &[&str] = &["study_id"];

enum Transition<'a> {
    Create { initial_state: &'a str },
    Change,
}

/// Audit information attached to one mutation
struct Audit<'a> {
    user: &'a UserContext,
    manual_user: Option<String>,
}

impl<'a> Audit<'a> {
    fn new(user: &'a UserContext, manual_user: Option<String>) -> Self {
        Self { user, manual_user }
    }
}

pub struct Registry<S: Store + ?Sized> {
    store: Arc<S>,
    workflow: Arc<dyn StateMachine>,
    indexer: Option<Arc<dyn StudyIndexer>>,
}

fn render_entity(entity: &NestedEntry, format: EntryFormat) -> Value {
    match format {
        EntryFormat::Api => entity.get_api_format(&EntryKeys::default()),
        EntryFormat::Form => Value::Object(entity.get_form_format()),
    }
}

fn parse_entries(study: &Study, mapper: &PropertyMap) -> Result<Vec<Entry>, ApiError> {
    Ok(FormatConverter::new(mapper)
        .add_api_format(&study.entries)?
        .into_entries())
}

fn study_document(study: &Study, entries: Value) -> Value {
    json!({
        "id": study.id,
        "entries": entries,
        "meta_information": study.meta_information,
    })
}

fn parent_not_found(parent: &[PathStep<'_>]) -> ApiError {
    match parent.last() {
        Some(step) => ApiError::not_found(format!("Entity not found in {} (uuid = {})", step.list_prop, step.uuid)),
        None => ApiError::not_found("Entity not found"),
    }
}

fn entity_not_found(kind: EntityKind, uuid: &str) -> ApiError {
    ApiError::not_found(format!("{} not found (uuid = {})", kind.label(), uuid))
}

impl<S: Store + ?Sized + 'static> Registry<S> {
    pub fn new(store: Arc<S>, workflow: Arc<dyn StateMachine>) -> Self {
        Self {
            store,
            workflow,
            indexer: None,
        }
    }

    pub fn with_indexer(mut self, indexer: Arc<dyn StudyIndexer>) -> Self {
        self.indexer = Some(indexer);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // Deprecated properties stay resolvable so stored studies keep rendering.
    async fn property_map(&self) -> Result<PropertyMap, ApiError> {
        Ok(load_property_map(&*self.store, true).await?)
    }

    async fn load_form(&self, name: &str) -> Result<FormDefinition, ApiError> {
        self.store
            .get_form(name)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Form '{}' not found", name)))
    }

    async fn load_study(&self, id: &str) -> Result<Study, ApiError> {
        self.store
            .get_study(&id.to_string())
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Study not found (id = {})", id)))
    }

    fn render_study(&self, study: &Study, format: EntryFormat, mapper: &PropertyMap) -> Result<Value, ApiError> {
        let entries = match format {
            EntryFormat::Api => Value::Array(study.entries.clone()),
            EntryFormat::Form => Value::Object(
                FormatConverter::new(mapper)
                    .add_api_format(&study.entries)?
                    .get_form_format(),
            ),
        };
        Ok(study_document(study, entries))
    }

    async fn check_alternate_keys(
        &self,
        form: &Map<String, Value>,
        mapper: &PropertyMap,
        exclude: Option<&str>,
    ) -> Result<(), ApiError> {
        let keys: Vec<(&str, &Value, &str)> = ALTERNATE_KEYS
            .iter()
            .filter_map(|key| {
                let value = form.get(*key)?;
                let id = mapper.id_of(key).ok()?;
                Some((*key, value, id))
            })
            .collect();
        if keys.is_empty() {
            return Ok(());
        }

        let entry_keys = EntryKeys::default();
        let studies = self.store.list_studies(&StudyFilter::default()).await?;
        for study in studies.iter().filter(|s| Some(s.id.as_str()) != exclude) {
            for (name, value, id) in &keys {
                let taken = study.entries.iter().any(|entry| {
                    entry.get(&entry_keys.key_name).and_then(Value::as_str) == Some(*id)
                        && entry.get(&entry_keys.value_name) == Some(*value)
                });
                if taken {
                    return Err(ApiError::Conflict(format!(
                        "A study with {} {} already exists",
                        name, value
                    )));
                }
            }
        }
        Ok(())
    }

    async fn commit_study(
        &self,
        mut study: Study,
        entries: Vec<Entry>,
        mapper: &PropertyMap,
        transition: Transition<'_>,
        action: &str,
        audit: &Audit<'_>,
    ) -> Result<Study, ApiError> {
        let converter = FormatConverter::from_entries(mapper, entries);
        let form = converter.get_form_format();

        let next_state = match transition {
            Transition::Create { initial_state } => self.workflow.create_study(initial_state, &form)?,
            Transition::Change => self.workflow.change_state(&study.meta_information.state, &form),
        };

        study.entries = converter.get_api_format();
        study.meta_information.state = next_state;
        study
            .meta_information
            .add_log(ChangeLog::new(action, audit.user, audit.manual_user.clone()));

        let locations = collect_entity_locations(&study.id, converter.entries());
        self.store.upsert_study(&study, &locations).await?;
        log::info!("{} (study {}, state {})", action, study.id, study.meta_information.state);

        if let Some(indexer) = &self.indexer {
            spawn_index_task(
                indexer.clone(),
                IndexJob::Upsert {
                    study_id: study.id.clone(),
                    document: study_document(&study, Value::Object(form)),
                },
            );
        }
        Ok(study)
    }

    // Studies
    // ------------------------------------------------------------------------

    pub async fn list_studies(&self, filter: &StudyFilter, format: EntryFormat) -> Result<Vec<Value>, ApiError> {
        let mapper = self.property_map().await?;
        self.store
            .list_studies(filter)
            .await?
            .iter()
            .map(|study| self.render_study(study, format, &mapper))
            .collect()
    }

    pub async fn get_study(&self, id: &str, format: EntryFormat) -> Result<Value, ApiError> {
        let study = self.load_study(id).await?;
        let mapper = self.property_map().await?;
        self.render_study(&study, format, &mapper)
    }

    pub async fn create_study(&self, payload: NewStudy, user: &UserContext) -> Result<Id, ApiError> {
        let mapper = self.property_map().await?;
        let form = self.load_form(&payload.form_name).await?;

        let converter = get_entity_converter(&payload.entries, payload.entry_format, &mapper, true)?;
        let form_format = converter.get_form_format();
        validate_form_format_against_form(&form, &form_format)?;
        self.check_alternate_keys(&form_format, &mapper, None).await?;

        let study = Study {
            id: generate_id(),
            entries: Vec::new(),
            meta_information: MetaInformation::new(payload.initial_state.clone()),
        };
        let audit = Audit::new(user, manual_user(&payload.manual_meta_information));
        let study = self
            .commit_study(
                study,
                converter.into_entries(),
                &mapper,
                Transition::Create {
                    initial_state: &payload.initial_state,
                },
                "Created study",
                &audit,
            )
            .await?;
        Ok(study.id)
    }

    pub async fn replace_study(&self, id: &str, payload: EntriesPayload, user: &UserContext) -> Result<(), ApiError> {
        let study = self.load_study(id).await?;
        let mapper = self.property_map().await?;
        let form = self.load_form(&payload.form_name).await?;

        let converter = get_entity_converter(&payload.entries, payload.entry_format, &mapper, true)?;
        let form_format = converter.get_form_format();
        validate_form_format_against_form(&form, &form_format)?;
        self.check_alternate_keys(&form_format, &mapper, Some(id)).await?;

        let audit = Audit::new(user, manual_user(&payload.manual_meta_information));
        self.commit_study(
            study,
            converter.into_entries(),
            &mapper,
            Transition::Change,
            "Updated study",
            &audit,
        )
        .await?;
        Ok(())
    }

    /// Deprecate a study, or delete it with `complete`.
    pub async fn delete_study(&self, id: &str, complete: bool) -> Result<&'static str, ApiError> {
        let id = id.to_string();
        if complete {
            if !self.store.delete_study(&id).await? {
                return Err(ApiError::not_found(format!("Study not found (id = {})", id)));
            }
            if let Some(indexer) = &self.indexer {
                spawn_index_task(indexer.clone(), IndexJob::Remove { study_id: id.clone() });
            }
            log::info!("Deleted study {}", id);
            Ok("Delete entry")
        } else {
            if !self.store.set_study_deprecated(&id, true).await? {
                return Err(ApiError::not_found(format!("Study not found (id = {})", id)));
            }
            log::info!("Deprecated study {}", id);
            Ok("Deprecate entry")
        }
    }

    pub async fn delete_all_studies(&self, complete: bool) -> Result<&'static str, ApiError> {
        if complete {
            let count = self.store.delete_all_studies().await?;
            log::info!("Deleted {} studies", count);
            Ok("Delete all entries")
        } else {
            let count = self.store.deprecate_all_studies().await?;
            log::info!("Deprecated {} studies", count);
            Ok("Deprecate all entries")
        }
    }

    // Nested entities
    // ------------------------------------------------------------------------

    pub async fn list_entities(
        &self,
        study_id: &str,
        parent: &[PathStep<'_>],
        kind: EntityKind,
        format: EntryFormat,
    ) -> Result<Vec<Value>, ApiError> {
        let study = self.load_study(study_id).await?;
        let mapper = self.property_map().await?;
        let entries = parse_entries(&study, &mapper)?;

        let parent_entries = get_at_path(&entries, parent).ok_or_else(|| parent_not_found(parent))?;
        Ok(nested_list(parent_entries, kind.list_prop())
            .map(|list| list.items.iter().map(|item| render_entity(item, format)).collect())
            .unwrap_or_default())
    }

    pub async fn get_entity(
        &self,
        study_id: &str,
        parent: &[PathStep<'_>],
        kind: EntityKind,
        uuid: &str,
        format: EntryFormat,
    ) -> Result<Value, ApiError> {
        let study = self.load_study(study_id).await?;
        let mapper = self.property_map().await?;
        let entries = parse_entries(&study, &mapper)?;

        get_at_path(&entries, parent)
            .and_then(|parent_entries| find_entity(parent_entries, kind.list_prop(), uuid))
            .map(|entity| render_entity(entity, format))
            .ok_or_else(|| entity_not_found(kind, uuid))
    }

    /// Dataset or processing event, validated against one form.
    pub async fn add_entity(
        &self,
        study_id: &str,
        parent: &[PathStep<'_>],
        kind: EntityKind,
        payload: EntriesPayload,
        user: &UserContext,
    ) -> Result<String, ApiError> {
        let validator = SingleFormValidator::new(self.load_form(&payload.form_name).await?);
        let audit = Audit::new(user, manual_user(&payload.manual_meta_information));
        self.insert_entity(study_id, parent, kind, &payload.entries, payload.entry_format, &validator, &audit)
            .await
    }

    pub async fn update_entity(
        &self,
        study_id: &str,
        parent: &[PathStep<'_>],
        kind: EntityKind,
        uuid: &str,
        payload: EntriesPayload,
        user: &UserContext,
    ) -> Result<(), ApiError> {
        let validator = SingleFormValidator::new(self.load_form(&payload.form_name).await?);
        let audit = Audit::new(user, manual_user(&payload.manual_meta_information));
        self.modify_entity(
            study_id,
            parent,
            kind,
            uuid,
            &payload.entries,
            payload.entry_format,
            &validator,
            &audit,
        )
        .await
    }

    pub async fn delete_entity(
        &self,
        study_id: &str,
        parent: &[PathStep<'_>],
        kind: EntityKind,
        uuid: &str,
        payload: DeletePayload,
        user: &UserContext,
    ) -> Result<(), ApiError> {
        let study = self.load_study(study_id).await?;
        let mapper = self.property_map().await?;
        let mut entries = parse_entries(&study, &mapper)?;

        modify_at_path(&mut entries, parent, |parent_entries| {
            remove_entity(parent_entries, kind.list_prop(), uuid)
        })
        .flatten()
        .ok_or_else(|| entity_not_found(kind, uuid))?;

        let audit = Audit::new(user, manual_user(&payload.manual_meta_information));
        let action = format!("Deleted {}", kind.label().to_lowercase());
        self.commit_study(study, entries, &mapper, Transition::Change, &action, &audit)
            .await?;
        Ok(())
    }

    /// Parse an entity payload. Samples are unified against the study's
    /// existing samples so reused individuals and treatments keep their UUIDs.
    fn entity_converter<'m>(
        &self,
        kind: EntityKind,
        payload: &Value,
        format: EntryFormat,
        mapper: &'m PropertyMap,
        parent_entries: &[Entry],
    ) -> Result<(FormatConverter<'m>, Vec<String>), ApiError> {
        let (converter, removed) = get_entity_converter(payload, format, mapper, true)?.clean_data();
        if kind != EntityKind::Sample {
            return Ok((converter, removed));
        }

        let existing = existing_samples(parent_entries);
        let unified = unify_sample_entities_uuids(&existing, vec![converter.get_form_format()]);
        let form = unified.into_iter().next().unwrap_or_default();
        Ok((FormatConverter::new(mapper).add_form_format(&form)?, removed))
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_entity(
        &self,
        study_id: &str,
        parent: &[PathStep<'_>],
        kind: EntityKind,
        payload: &Value,
        format: EntryFormat,
        validator: &dyn EntityValidator,
        audit: &Audit<'_>,
    ) -> Result<String, ApiError> {
        let study = self.load_study(study_id).await?;
        let mapper = self.property_map().await?;
        let mut entries = parse_entries(&study, &mapper)?;

        let taken = entity_uuids(&entries);
        let parent_entries = get_at_path(&entries, parent).ok_or_else(|| parent_not_found(parent))?;
        let (converter, _) = self.entity_converter(kind, payload, format, &mapper, parent_entries)?;

        let (converter, uuid) = add_uuid_entry_if_missing(converter, &taken)?;
        if taken.contains(&uuid) {
            return Err(ApiError::Conflict(format!(
                "{} with uuid {} already exists",
                kind.label(),
                uuid
            )));
        }

        validator.validate(&converter.get_form_format())?;
        let converter = match validator.ordering_form() {
            Some(form) => converter.sort_from_form(form),
            None => converter,
        };

        let entity = converter.into_nested_entry();
        modify_at_path(&mut entries, parent, |parent_entries| {
            append_entity(parent_entries, kind.list_prop(), entity, &mapper)
        })
        .ok_or_else(|| parent_not_found(parent))??;

        let action = format!("Added {}", kind.label().to_lowercase());
        self.commit_study(study, entries, &mapper, Transition::Change, &action, audit)
            .await?;
        Ok(uuid)
    }

    /// Merge a partial payload into an existing entity: provided fields are
    /// upserted, fields sent as null or empty are removed, others are kept.
    #[allow(clippy::too_many_arguments)]
    async fn modify_entity(
        &self,
        study_id: &str,
        parent: &[PathStep<'_>],
        kind: EntityKind,
        uuid: &str,
        payload: &Value,
        format: EntryFormat,
        validator: &dyn EntityValidator,
        audit: &Audit<'_>,
    ) -> Result<(), ApiError> {
        let study = self.load_study(study_id).await?;
        let mapper = self.property_map().await?;
        let mut entries = parse_entries(&study, &mapper)?;

        let parent_entries = get_at_path(&entries, parent).ok_or_else(|| parent_not_found(parent))?;
        let existing = find_entity(parent_entries, kind.list_prop(), uuid)
            .cloned()
            .ok_or_else(|| entity_not_found(kind, uuid))?;
        let (update, removed) = self.entity_converter(kind, payload, format, &mapper, parent_entries)?;

        // The entity's identity never changes
        let update: Vec<Entry> = update
            .into_entries()
            .into_iter()
            .filter(|e| e.property_name != UUID_FIELD)
            .collect();

        let converter = FormatConverter::from_entries(&mapper, existing.entries)
            .add_or_update_entries(update)
            .remove_entries(Removal::Names(&removed));
        let converter = match validator.ordering_form() {
            Some(form) => converter.sort_from_form(form),
            None => converter,
        };
        validator.validate(&converter.get_form_format())?;

        let entity = converter.into_nested_entry();
        modify_at_path(&mut entries, parent, |parent_entries| {
            replace_entity(parent_entries, kind.list_prop(), uuid, entity)
        })
        .filter(|replaced| *replaced)
        .ok_or_else(|| entity_not_found(kind, uuid))?;

        let action = format!("Updated {}", kind.label().to_lowercase());
        self.commit_study(study, entries, &mapper, Transition::Change, &action, audit)
            .await?;
        Ok(())
    }

    // Samples
    // ------------------------------------------------------------------------

    async fn sample_validator(
        &self,
        flags: &SampleValidationFlags,
        names: &SampleFormNames,
    ) -> Result<SampleValidator, ApiError> {
        let mut steps = Vec::new();
        for step in SampleStep::ALL {
            if step.is_enabled(flags) {
                steps.push((step, self.load_form(step.form_name(names)).await?));
            }
        }
        Ok(SampleValidator::new(steps))
    }

    pub async fn add_sample(&self, study_id: &str, payload: SamplePayload, user: &UserContext) -> Result<String, ApiError> {
        let validator = self.sample_validator(&payload.validate, &payload.form_names).await?;
        let audit = Audit::new(user, manual_user(&payload.manual_meta_information));
        self.insert_entity(
            study_id,
            &[],
            EntityKind::Sample,
            &payload.entries,
            payload.entry_format,
            &validator,
            &audit,
        )
        .await
    }

    pub async fn update_sample(
        &self,
        study_id: &str,
        uuid: &str,
        payload: SamplePayload,
        user: &UserContext,
    ) -> Result<(), ApiError> {
        let validator = self.sample_validator(&payload.validate, &payload.form_names).await?;
        let audit = Audit::new(user, manual_user(&payload.manual_meta_information));
        self.modify_entity(
            study_id,
            &[],
            EntityKind::Sample,
            uuid,
            &payload.entries,
            payload.entry_format,
            &validator,
            &audit,
        )
        .await
    }

    /// Add a batch of samples in one study write, optionally replacing the
    /// existing ones. Returns the sample UUIDs in payload order.
    pub async fn add_samples(
        &self,
        study_id: &str,
        payload: SamplesPayload,
        user: &UserContext,
    ) -> Result<(String, Vec<String>), ApiError> {
        let validator = self.sample_validator(&payload.validate, &payload.form_names).await?;
        let study = self.load_study(study_id).await?;
        let mapper = self.property_map().await?;
        let mut entries = parse_entries(&study, &mapper)?;
        let list_prop = EntityKind::Sample.list_prop();

        let mut new_samples = Vec::with_capacity(payload.entries.len());
        for sample in &payload.entries {
            let (converter, _) = get_entity_converter(sample, payload.entry_format, &mapper, true)?.clean_data();
            new_samples.push(converter.get_form_format());
        }
        let unified = unify_sample_entities_uuids(&existing_samples(&entries), new_samples);

        if payload.replace {
            remove_list(&mut entries, list_prop);
        }

        // Individuals and treatments reused by unification keep their UUID,
        // only the samples' own UUIDs must be new to the study
        let mut taken = entity_uuids(&entries);
        let mut uuids = Vec::with_capacity(unified.len());
        for sample in unified {
            let converter = FormatConverter::new(&mapper).add_form_format(&sample)?;
            let (converter, uuid) = add_uuid_entry_if_missing(converter, &taken)?;
            if !taken.insert(uuid.clone()) {
                return Err(ApiError::Conflict(format!("Sample with uuid {} already exists", uuid)));
            }
            validator.validate(&converter.get_form_format())?;
            append_entity(&mut entries, list_prop, converter.into_nested_entry(), &mapper)?;
            uuids.push(uuid);
        }

        let action = format!("Added {} samples (replace = {})", uuids.len(), payload.replace);
        let audit = Audit::new(user, manual_user(&payload.manual_meta_information));
        self.commit_study(study, entries, &mapper, Transition::Change, &action, &audit)
            .await?;
        Ok((action, uuids))
    }

    pub async fn delete_all_samples(&self, study_id: &str, payload: DeletePayload, user: &UserContext) -> Result<(), ApiError> {
        let study = self.load_study(study_id).await?;
        let mapper = self.property_map().await?;
        let mut entries = parse_entries(&study, &mapper)?;

        remove_list(&mut entries, EntityKind::Sample.list_prop());

        let audit = Audit::new(user, manual_user(&payload.manual_meta_information));
        self.commit_study(study, entries, &mapper, Transition::Change, "Deleted samples", &audit)
            .await?;
        Ok(())
    }

    // Lookups
    // ------------------------------------------------------------------------

    pub async fn find_study_id_from_lvl1_uuid(&self, lvl1_prop: &str, uuid: &str) -> Result<Option<Id>, ApiError> {
        Ok(find_study_id_from_lvl1_uuid(&*self.store, lvl1_prop, uuid).await?)
    }

    pub async fn find_study_id_and_lvl1_uuid_from_lvl2_uuid(
        &self,
        lvl1_prop: &str,
        lvl2_prop: &str,
        uuid: &str,
    ) -> Result<(Option<Id>, Option<String>), ApiError> {
        Ok(find_study_id_and_lvl1_uuid_from_lvl2_uuid(&*self.store, lvl1_prop, lvl2_prop, uuid).await?)
    }

    /// Study owning a top-level entity, for routes addressing it by UUID only.
    pub async fn resolve_study_id(&self, kind: EntityKind, uuid: &str) -> Result<Id, ApiError> {
        self.find_study_id_from_lvl1_uuid(kind.singular(), uuid)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("{} not found in any study (uuid = {})", kind.label(), uuid)))
    }

    /// Study and dataset owning a processing event.
    pub async fn resolve_process_event(&self, uuid: &str) -> Result<(Id, String), ApiError> {
        match self
            .find_study_id_and_lvl1_uuid_from_lvl2_uuid(
                EntityKind::Dataset.singular(),
                EntityKind::ProcessEvent.singular(),
                uuid,
            )
            .await?
        {
            (Some(study_id), Some(dataset_uuid)) => Ok((study_id, dataset_uuid)),
            _ => Err(entity_not_found(EntityKind::ProcessEvent, uuid)),
        }
    }

    pub async fn rebuild_entity_index(&self) -> Result<usize, ApiError> {
        let mapper = self.property_map().await?;
        Ok(rebuild_entity_index(&*self.store, &mapper).await?)
    }

    // Property directory and forms
    // ------------------------------------------------------------------------

    pub async fn list_properties(&self, include_deprecated: bool) -> Result<Vec<Property>, ApiError> {
        Ok(self.store.list_properties(include_deprecated).await?)
    }

    pub async fn get_property(&self, id: &str) -> Result<Property, ApiError> {
        self.store
            .get_property(&id.to_string())
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Property not found (id = {})", id)))
    }

    pub async fn create_property(&self, new_property: NewProperty) -> Result<Property, ApiError> {
        let property = new_property.into_property(generate_id());
        let mapper = self.property_map().await?;
        if mapper.contains_name(&property.name) {
            return Err(ApiError::Conflict(format!(
                "A property named {} already exists",
                property.name
            )));
        }
        self.store.upsert_property(property.clone()).await?;
        log::info!("Registered property {} ({})", property.name, property.id);
        Ok(property)
    }

    pub async fn list_forms(&self) -> Result<Vec<FormDefinition>, ApiError> {
        Ok(self.store.list_forms().await?)
    }

    pub async fn get_form(&self, name: &str) -> Result<FormDefinition, ApiError> {
        self.load_form(name).await
    }

    /// Register or replace a form. Every field must name a registered property.
    pub async fn upsert_form(&self, form: FormDefinition) -> Result<(), ApiError> {
        let mapper = self.property_map().await?;
        let mut pending: Vec<_> = form.fields.iter().collect();
        while let Some(field) = pending.pop() {
            mapper.id_of(&field.name)?;
            pending.extend(field.fields.iter());
        }
        self.store.upsert_form(form).await?;
        Ok(())
    }
}

fn existing_samples(entries: &[Entry]) -> Vec<Value> {
    nested_list(entries, EntityKind::Sample.list_prop())
        .map(|list| match list.get_form_format() {
            Value::Array(items) => items,
            _ => Vec::new(),
        })
        .unwrap_or_default()
}
