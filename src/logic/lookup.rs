//! Find the study (and parent entity) owning a nested entity from its UUID.
//!
//! Backed by the entity index, whose rows are computed here from the entry
//! tree and written together with each study.

use anyhow::Result;
use itertools::Itertools;
use std::collections::HashSet;

use crate::logic::converter::FormatConverter;
use crate::model::{Entry, EntityLocation, EntryValue, Id, NestedEntry, PropertyMap};
use crate::store::{EntityIndexStore, StudyFilter, StudyStore};

/// List entry name of an entity kind given in singular (`dataset` -> `datasets`).
pub fn plural(singular: &str) -> String {
    format!("{}s", singular)
}

/// Every nested object carrying a UUID, with the list it lives in and the
/// closest enclosing entity. An entity shared by several parents (an
/// individual reused across samples) is located at its first occurrence.
pub fn collect_entity_locations(study_id: &str, entries: &[Entry]) -> Vec<EntityLocation> {
    let mut locations = Vec::new();
    walk(study_id, entries, None, &mut locations);
    locations.into_iter().unique_by(|l| l.uuid.clone()).collect()
}

/// Every entity UUID used anywhere in the entry tree. The index keeps one row
/// per UUID and study, so a new entity must not reuse any of them.
pub fn entity_uuids(entries: &[Entry]) -> HashSet<String> {
    let mut locations = Vec::new();
    walk("", entries, None, &mut locations);
    locations.into_iter().map(|l| l.uuid).collect()
}

fn walk(study_id: &str, entries: &[Entry], parent: Option<&str>, out: &mut Vec<EntityLocation>) {
    for entry in entries {
        let children: Vec<&NestedEntry> = match &entry.value {
            EntryValue::Object(nested) => vec![nested],
            EntryValue::ObjectList(list) => list.items.iter().collect(),
            EntryValue::Scalar(_) | EntryValue::ScalarList(_) => continue,
        };

        for child in children {
            let uuid = child.uuid();
            if let Some(uuid) = uuid {
                out.push(EntityLocation {
                    uuid: uuid.to_string(),
                    study_id: study_id.to_string(),
                    list_prop: entry.property_name.clone(),
                    parent_uuid: parent.map(str::to_string),
                });
            }
            walk(study_id, &child.entries, uuid.or(parent), out);
        }
    }
}

/// Study holding a top-level entity, e.g. `("dataset", <dataset uuid>)`.
pub async fn find_study_id_from_lvl1_uuid<S>(store: &S, lvl1_prop: &str, lvl1_uuid: &str) -> Result<Option<Id>>
where
    S: EntityIndexStore + ?Sized,
{
    let list_prop = plural(lvl1_prop);
    let locations = store.find_entity_locations(lvl1_uuid).await?;

    Ok(locations
        .into_iter()
        .find(|l| l.list_prop == list_prop && l.parent_uuid.is_none())
        .map(|l| l.study_id))
}

/// Study and level 1 entity holding a level 2 entity, e.g. the study and
/// dataset of a processing event. `(None, None)` when nothing matches.
pub async fn find_study_id_and_lvl1_uuid_from_lvl2_uuid<S>(
    store: &S,
    lvl1_prop: &str,
    lvl2_prop: &str,
    lvl2_uuid: &str,
) -> Result<(Option<Id>, Option<String>)>
where
    S: EntityIndexStore + ?Sized,
{
    let lvl1_list = plural(lvl1_prop);
    let lvl2_list = plural(lvl2_prop);

    for location in store.find_entity_locations(lvl2_uuid).await? {
        let Some(parent_uuid) = location.parent_uuid.as_deref() else {
            continue;
        };
        if location.list_prop != lvl2_list {
            continue;
        }

        let parents = store.find_entity_locations(parent_uuid).await?;
        let parent_matches = parents
            .iter()
            .any(|p| p.study_id == location.study_id && p.list_prop == lvl1_list && p.parent_uuid.is_none());
        if parent_matches {
            return Ok((Some(location.study_id.clone()), Some(parent_uuid.to_string())));
        }
    }

    Ok((None, None))
}

/// Recompute the index rows of every stored study. Returns the number of
/// studies indexed; studies that no longer parse are skipped with a warning.
pub async fn rebuild_entity_index<S>(store: &S, mapper: &PropertyMap) -> Result<usize>
where
    S: StudyStore + ?Sized,
{
    let studies = store
        .list_studies(&StudyFilter {
            include_deprecated: true,
            ..Default::default()
        })
        .await?;

    let mut indexed = 0;
    for study in studies {
        let converter = match FormatConverter::new(mapper).add_api_format(&study.entries) {
            Ok(converter) => converter,
            Err(e) => {
                log::warn!("Skipping study {} during index rebuild: {}", study.id, e);
                continue;
            }
        };
        let locations = collect_entity_locations(&study.id, converter.entries());
        store.upsert_study(&study, &locations).await?;
        indexed += 1;
    }

    log::info!("Rebuilt entity index for {} studies", indexed);
    Ok(indexed)
}
