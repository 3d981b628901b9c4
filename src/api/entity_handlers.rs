//! Handlers for entities nested in a study: datasets, their processing events
//! and samples. Alias routes address an entity by UUID alone and resolve the
//! owning study through the entity index.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};
use serde_json::{json, Value};

use crate::api::handlers::{AppState, FormatQuery, HandlerResult};
use crate::logic::entity_ops::{EntityKind, PathStep};
use crate::logic::registry::Registry;
use crate::model::{DeletePayload, EntriesPayload, SamplePayload, SamplesPayload, UserContext};
use crate::store::Store;

/// Path to the processing events of one dataset
fn in_dataset(dataset_uuid: &str) -> [PathStep<'_>; 1] {
    [PathStep::new(EntityKind::Dataset.list_prop(), dataset_uuid)]
}

fn delete_payload(body: Option<RequestJson<DeletePayload>>) -> DeletePayload {
    body.map(|RequestJson(payload)| payload).unwrap_or_default()
}

fn added(kind: EntityKind, uuid: String) -> (StatusCode, Json<Value>) {
    (
        StatusCode::CREATED,
        Json(json!({
            "message": format!("Added {}", kind.label().to_lowercase()),
            "uuid": uuid,
        })),
    )
}

fn message(action: &str, kind: EntityKind) -> Json<Value> {
    Json(json!({ "message": format!("{} {}", action, kind.label().to_lowercase()) }))
}

async fn update_one<S: Store + 'static>(
    registry: &Registry<S>,
    study_id: &str,
    parent: &[PathStep<'_>],
    kind: EntityKind,
    uuid: &str,
    payload: EntriesPayload,
    user: &UserContext,
) -> HandlerResult<Json<Value>> {
    registry
        .update_entity(study_id, parent, kind, uuid, payload, user)
        .await?;
    Ok(message("Updated", kind))
}

async fn delete_one<S: Store + 'static>(
    registry: &Registry<S>,
    study_id: &str,
    parent: &[PathStep<'_>],
    kind: EntityKind,
    uuid: &str,
    payload: DeletePayload,
    user: &UserContext,
) -> HandlerResult<Json<Value>> {
    registry
        .delete_entity(study_id, parent, kind, uuid, payload, user)
        .await?;
    Ok(message("Deleted", kind))
}

// Datasets
// ----------------------------------------------------------------------------

pub async fn list_datasets<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path(study_id): Path<String>,
    Query(query): Query<FormatQuery>,
) -> HandlerResult<Json<Vec<Value>>> {
    let datasets = registry
        .list_entities(&study_id, &[], EntityKind::Dataset, query.format())
        .await?;
    Ok(Json(datasets))
}

pub async fn add_dataset<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path(study_id): Path<String>,
    user: UserContext,
    RequestJson(payload): RequestJson<EntriesPayload>,
) -> HandlerResult<(StatusCode, Json<Value>)> {
    let uuid = registry
        .add_entity(&study_id, &[], EntityKind::Dataset, payload, &user)
        .await?;
    Ok(added(EntityKind::Dataset, uuid))
}

pub async fn get_dataset<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path((study_id, dataset_uuid)): Path<(String, String)>,
    Query(query): Query<FormatQuery>,
) -> HandlerResult<Json<Value>> {
    let dataset = registry
        .get_entity(&study_id, &[], EntityKind::Dataset, &dataset_uuid, query.format())
        .await?;
    Ok(Json(dataset))
}

pub async fn update_dataset<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path((study_id, dataset_uuid)): Path<(String, String)>,
    user: UserContext,
    RequestJson(payload): RequestJson<EntriesPayload>,
) -> HandlerResult<Json<Value>> {
    update_one(&registry, &study_id, &[], EntityKind::Dataset, &dataset_uuid, payload, &user).await
}

pub async fn delete_dataset<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path((study_id, dataset_uuid)): Path<(String, String)>,
    user: UserContext,
    body: Option<RequestJson<DeletePayload>>,
) -> HandlerResult<Json<Value>> {
    let payload = delete_payload(body);
    delete_one(&registry, &study_id, &[], EntityKind::Dataset, &dataset_uuid, payload, &user).await
}

// Processing events
// ----------------------------------------------------------------------------

pub async fn list_process_events<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path((study_id, dataset_uuid)): Path<(String, String)>,
    Query(query): Query<FormatQuery>,
) -> HandlerResult<Json<Vec<Value>>> {
    let parent = in_dataset(&dataset_uuid);
    let events = registry
        .list_entities(&study_id, &parent, EntityKind::ProcessEvent, query.format())
        .await?;
    Ok(Json(events))
}

pub async fn add_process_event<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path((study_id, dataset_uuid)): Path<(String, String)>,
    user: UserContext,
    RequestJson(payload): RequestJson<EntriesPayload>,
) -> HandlerResult<(StatusCode, Json<Value>)> {
    let parent = in_dataset(&dataset_uuid);
    let uuid = registry
        .add_entity(&study_id, &parent, EntityKind::ProcessEvent, payload, &user)
        .await?;
    Ok(added(EntityKind::ProcessEvent, uuid))
}

pub async fn get_process_event<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path((study_id, dataset_uuid, pe_uuid)): Path<(String, String, String)>,
    Query(query): Query<FormatQuery>,
) -> HandlerResult<Json<Value>> {
    let parent = in_dataset(&dataset_uuid);
    let event = registry
        .get_entity(&study_id, &parent, EntityKind::ProcessEvent, &pe_uuid, query.format())
        .await?;
    Ok(Json(event))
}

pub async fn update_process_event<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path((study_id, dataset_uuid, pe_uuid)): Path<(String, String, String)>,
    user: UserContext,
    RequestJson(payload): RequestJson<EntriesPayload>,
) -> HandlerResult<Json<Value>> {
    let parent = in_dataset(&dataset_uuid);
    update_one(&registry, &study_id, &parent, EntityKind::ProcessEvent, &pe_uuid, payload, &user).await
}

pub async fn delete_process_event<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path((study_id, dataset_uuid, pe_uuid)): Path<(String, String, String)>,
    user: UserContext,
    body: Option<RequestJson<DeletePayload>>,
) -> HandlerResult<Json<Value>> {
    let parent = in_dataset(&dataset_uuid);
    let payload = delete_payload(body);
    delete_one(&registry, &study_id, &parent, EntityKind::ProcessEvent, &pe_uuid, payload, &user).await
}

// Samples
// ----------------------------------------------------------------------------

pub async fn list_samples<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path(study_id): Path<String>,
    Query(query): Query<FormatQuery>,
) -> HandlerResult<Json<Vec<Value>>> {
    let samples = registry
        .list_entities(&study_id, &[], EntityKind::Sample, query.format())
        .await?;
    Ok(Json(samples))
}

pub async fn add_sample<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path(study_id): Path<String>,
    user: UserContext,
    RequestJson(payload): RequestJson<SamplePayload>,
) -> HandlerResult<(StatusCode, Json<Value>)> {
    let uuid = registry.add_sample(&study_id, payload, &user).await?;
    Ok(added(EntityKind::Sample, uuid))
}

pub async fn add_samples<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path(study_id): Path<String>,
    user: UserContext,
    RequestJson(payload): RequestJson<SamplesPayload>,
) -> HandlerResult<(StatusCode, Json<Value>)> {
    let (message, uuids) = registry.add_samples(&study_id, payload, &user).await?;
    Ok((StatusCode::CREATED, Json(json!({ "message": message, "uuids": uuids }))))
}

pub async fn get_sample<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path((study_id, sample_uuid)): Path<(String, String)>,
    Query(query): Query<FormatQuery>,
) -> HandlerResult<Json<Value>> {
    let sample = registry
        .get_entity(&study_id, &[], EntityKind::Sample, &sample_uuid, query.format())
        .await?;
    Ok(Json(sample))
}

pub async fn update_sample<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path((study_id, sample_uuid)): Path<(String, String)>,
    user: UserContext,
    RequestJson(payload): RequestJson<SamplePayload>,
) -> HandlerResult<Json<Value>> {
    registry
        .update_sample(&study_id, &sample_uuid, payload, &user)
        .await?;
    Ok(message("Updated", EntityKind::Sample))
}

pub async fn delete_sample<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path((study_id, sample_uuid)): Path<(String, String)>,
    user: UserContext,
    body: Option<RequestJson<DeletePayload>>,
) -> HandlerResult<Json<Value>> {
    let payload = delete_payload(body);
    delete_one(&registry, &study_id, &[], EntityKind::Sample, &sample_uuid, payload, &user).await
}

pub async fn delete_all_samples<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path(study_id): Path<String>,
    user: UserContext,
    body: Option<RequestJson<DeletePayload>>,
) -> HandlerResult<Json<Value>> {
    registry
        .delete_all_samples(&study_id, delete_payload(body), &user)
        .await?;
    Ok(Json(json!({"message": "Deleted samples"})))
}

// Alias routes
// ----------------------------------------------------------------------------

pub async fn get_dataset_by_uuid<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path(dataset_uuid): Path<String>,
    Query(query): Query<FormatQuery>,
) -> HandlerResult<Json<Value>> {
    let study_id = registry.resolve_study_id(EntityKind::Dataset, &dataset_uuid).await?;
    let dataset = registry
        .get_entity(&study_id, &[], EntityKind::Dataset, &dataset_uuid, query.format())
        .await?;
    Ok(Json(dataset))
}

pub async fn update_dataset_by_uuid<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path(dataset_uuid): Path<String>,
    user: UserContext,
    RequestJson(payload): RequestJson<EntriesPayload>,
) -> HandlerResult<Json<Value>> {
    let study_id = registry.resolve_study_id(EntityKind::Dataset, &dataset_uuid).await?;
    update_one(&registry, &study_id, &[], EntityKind::Dataset, &dataset_uuid, payload, &user).await
}

pub async fn delete_dataset_by_uuid<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path(dataset_uuid): Path<String>,
    user: UserContext,
    body: Option<RequestJson<DeletePayload>>,
) -> HandlerResult<Json<Value>> {
    let study_id = registry.resolve_study_id(EntityKind::Dataset, &dataset_uuid).await?;
    let payload = delete_payload(body);
    delete_one(&registry, &study_id, &[], EntityKind::Dataset, &dataset_uuid, payload, &user).await
}

pub async fn list_process_events_by_dataset_uuid<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path(dataset_uuid): Path<String>,
    Query(query): Query<FormatQuery>,
) -> HandlerResult<Json<Vec<Value>>> {
    let study_id = registry.resolve_study_id(EntityKind::Dataset, &dataset_uuid).await?;
    let parent = in_dataset(&dataset_uuid);
    let events = registry
        .list_entities(&study_id, &parent, EntityKind::ProcessEvent, query.format())
        .await?;
    Ok(Json(events))
}

pub async fn add_process_event_by_dataset_uuid<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path(dataset_uuid): Path<String>,
    user: UserContext,
    RequestJson(payload): RequestJson<EntriesPayload>,
) -> HandlerResult<(StatusCode, Json<Value>)> {
    let study_id = registry.resolve_study_id(EntityKind::Dataset, &dataset_uuid).await?;
    let parent = in_dataset(&dataset_uuid);
    let uuid = registry
        .add_entity(&study_id, &parent, EntityKind::ProcessEvent, payload, &user)
        .await?;
    Ok(added(EntityKind::ProcessEvent, uuid))
}

pub async fn get_process_event_by_uuid<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path(pe_uuid): Path<String>,
    Query(query): Query<FormatQuery>,
) -> HandlerResult<Json<Value>> {
    let (study_id, dataset_uuid) = registry.resolve_process_event(&pe_uuid).await?;
    let parent = in_dataset(&dataset_uuid);
    let event = registry
        .get_entity(&study_id, &parent, EntityKind::ProcessEvent, &pe_uuid, query.format())
        .await?;
    Ok(Json(event))
}

pub async fn update_process_event_by_uuid<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path(pe_uuid): Path<String>,
    user: UserContext,
    RequestJson(payload): RequestJson<EntriesPayload>,
) -> HandlerResult<Json<Value>> {
    let (study_id, dataset_uuid) = registry.resolve_process_event(&pe_uuid).await?;
    let parent = in_dataset(&dataset_uuid);
    update_one(&registry, &study_id, &parent, EntityKind::ProcessEvent, &pe_uuid, payload, &user).await
}

pub async fn delete_process_event_by_uuid<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path(pe_uuid): Path<String>,
    user: UserContext,
    body: Option<RequestJson<DeletePayload>>,
) -> HandlerResult<Json<Value>> {
    let (study_id, dataset_uuid) = registry.resolve_process_event(&pe_uuid).await?;
    let parent = in_dataset(&dataset_uuid);
    let payload = delete_payload(body);
    delete_one(&registry, &study_id, &parent, EntityKind::ProcessEvent, &pe_uuid, payload, &user).await
}

pub async fn get_sample_by_uuid<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path(sample_uuid): Path<String>,
    Query(query): Query<FormatQuery>,
) -> HandlerResult<Json<Value>> {
    let study_id = registry.resolve_study_id(EntityKind::Sample, &sample_uuid).await?;
    let sample = registry
        .get_entity(&study_id, &[], EntityKind::Sample, &sample_uuid, query.format())
        .await?;
    Ok(Json(sample))
}

pub async fn update_sample_by_uuid<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path(sample_uuid): Path<String>,
    user: UserContext,
    RequestJson(payload): RequestJson<SamplePayload>,
) -> HandlerResult<Json<Value>> {
    let study_id = registry.resolve_study_id(EntityKind::Sample, &sample_uuid).await?;
    registry
        .update_sample(&study_id, &sample_uuid, payload, &user)
        .await?;
    Ok(message("Updated", EntityKind::Sample))
}

pub async fn delete_sample_by_uuid<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path(sample_uuid): Path<String>,
    user: UserContext,
    body: Option<RequestJson<DeletePayload>>,
) -> HandlerResult<Json<Value>> {
    let study_id = registry.resolve_study_id(EntityKind::Sample, &sample_uuid).await?;
    let payload = delete_payload(body);
    delete_one(&registry, &study_id, &[], EntityKind::Sample, &sample_uuid, payload, &user).await
}
