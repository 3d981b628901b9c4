use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::ApiError;
use crate::logic::registry::Registry;
use crate::model::{EntriesPayload, EntryFormat, FormDefinition, NewProperty, NewStudy, Property, UserContext};
use crate::store::{Store, StudyFilter};

pub type AppState<S> = Arc<Registry<S>>;

pub type HandlerResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
            details: None,
        }
    }
}

impl From<ApiError> for (StatusCode, Json<ErrorResponse>) {
    fn from(error: ApiError) -> Self {
        let status = match &error {
            ApiError::Conversion(_) | ApiError::DuplicateProperty(_) | ApiError::RequestBody(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(e) => {
                log::error!("Internal error: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let mut response = ErrorResponse::new(&error.to_string());
        if let ApiError::Validation { errors, .. } = &error {
            response.details = Some(json!(errors));
        }
        (status, Json(response))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct FormatQuery {
    pub entry_format: Option<EntryFormat>,
}

impl FormatQuery {
    pub fn format(&self) -> EntryFormat {
        self.entry_format.unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StudyListQuery {
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    pub deprecated: Option<bool>,
    pub entry_format: Option<EntryFormat>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    /// Remove the document instead of flagging it deprecated
    #[serde(default)]
    pub complete: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct PropertyListQuery {
    #[serde(default)]
    pub deprecated: bool,
}

// Studies
// ----------------------------------------------------------------------------

pub async fn list_studies<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Query(query): Query<StudyListQuery>,
) -> HandlerResult<Json<Vec<Value>>> {
    let filter = StudyFilter {
        skip: query.skip.unwrap_or(0),
        limit: query.limit,
        include_deprecated: query.deprecated.unwrap_or(false),
    };
    let studies = registry
        .list_studies(&filter, query.entry_format.unwrap_or_default())
        .await?;
    Ok(Json(studies))
}

pub async fn create_study<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    user: UserContext,
    RequestJson(payload): RequestJson<NewStudy>,
) -> HandlerResult<(StatusCode, Json<Value>)> {
    let id = registry.create_study(payload, &user).await?;
    Ok((StatusCode::CREATED, Json(json!({"message": "Study added", "id": id}))))
}

pub async fn get_study<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path(study_id): Path<String>,
    Query(query): Query<FormatQuery>,
) -> HandlerResult<Json<Value>> {
    Ok(Json(registry.get_study(&study_id, query.format()).await?))
}

pub async fn replace_study<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path(study_id): Path<String>,
    user: UserContext,
    RequestJson(payload): RequestJson<EntriesPayload>,
) -> HandlerResult<Json<Value>> {
    registry.replace_study(&study_id, payload, &user).await?;
    Ok(Json(json!({"message": "Update study"})))
}

pub async fn delete_study<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path(study_id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> HandlerResult<Json<Value>> {
    let message = registry.delete_study(&study_id, query.complete).await?;
    Ok(Json(json!({ "message": message })))
}

pub async fn delete_all_studies<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Query(query): Query<DeleteQuery>,
) -> HandlerResult<Json<Value>> {
    let message = registry.delete_all_studies(query.complete).await?;
    Ok(Json(json!({ "message": message })))
}

// Identifier lookups
// ----------------------------------------------------------------------------

fn default_lvl1_prop_name() -> String {
    "dataset".to_string()
}

fn default_lvl2_prop_name() -> String {
    "process_event".to_string()
}

#[derive(Debug, Deserialize)]
pub struct Lvl1Query {
    pub lvl1_uuid: String,
    #[serde(default = "default_lvl1_prop_name")]
    pub lvl1_prop_name: String,
}

#[derive(Debug, Deserialize)]
pub struct Lvl2Query {
    pub lvl2_uuid: String,
    #[serde(default = "default_lvl1_prop_name")]
    pub lvl1_prop_name: String,
    #[serde(default = "default_lvl2_prop_name")]
    pub lvl2_prop_name: String,
}

pub async fn get_study_id_from_lvl1_uuid<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Query(query): Query<Lvl1Query>,
) -> HandlerResult<Json<Value>> {
    // UUIDs are matched as stored, only the property names are normalised
    let uuid = query.lvl1_uuid;
    let prop = query.lvl1_prop_name.to_lowercase();

    match registry.find_study_id_from_lvl1_uuid(&prop, &uuid).await? {
        Some(study_id) => Ok(Json(json!({ "study_id": study_id }))),
        None => Err(ApiError::not_found(format!("{} with uuid {} not found", prop, uuid)).into()),
    }
}

pub async fn get_study_id_and_lvl1_uuid_from_lvl2_uuid<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Query(query): Query<Lvl2Query>,
) -> HandlerResult<Json<Value>> {
    let uuid = query.lvl2_uuid;
    let lvl1_prop = query.lvl1_prop_name.to_lowercase();
    let lvl2_prop = query.lvl2_prop_name.to_lowercase();

    match registry
        .find_study_id_and_lvl1_uuid_from_lvl2_uuid(&lvl1_prop, &lvl2_prop, &uuid)
        .await?
    {
        (Some(study_id), Some(lvl1_uuid)) => Ok(Json(json!({
            "study_id": study_id,
            "lvl1_uuid": lvl1_uuid,
        }))),
        _ => Err(ApiError::not_found(format!("{} with uuid {} not found", lvl2_prop, uuid)).into()),
    }
}

// Properties and forms
// ----------------------------------------------------------------------------

pub async fn list_properties<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Query(query): Query<PropertyListQuery>,
) -> HandlerResult<Json<Vec<Property>>> {
    Ok(Json(registry.list_properties(query.deprecated).await?))
}

pub async fn get_property<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path(property_id): Path<String>,
) -> HandlerResult<Json<Property>> {
    Ok(Json(registry.get_property(&property_id).await?))
}

pub async fn create_property<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    RequestJson(new_property): RequestJson<NewProperty>,
) -> HandlerResult<(StatusCode, Json<Property>)> {
    let property = registry.create_property(new_property).await?;
    Ok((StatusCode::CREATED, Json(property)))
}

pub async fn list_forms<S: Store + 'static>(
    State(registry): State<AppState<S>>,
) -> HandlerResult<Json<Vec<FormDefinition>>> {
    Ok(Json(registry.list_forms().await?))
}

pub async fn get_form<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    Path(name): Path<String>,
) -> HandlerResult<Json<FormDefinition>> {
    Ok(Json(registry.get_form(&name).await?))
}

pub async fn upsert_form<S: Store + 'static>(
    State(registry): State<AppState<S>>,
    RequestJson(form): RequestJson<FormDefinition>,
) -> HandlerResult<Json<Value>> {
    let name = form.name.clone();
    registry.upsert_form(form).await?;
    Ok(Json(json!({"message": "Form saved", "name": name})))
}
