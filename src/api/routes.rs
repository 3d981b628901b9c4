use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::api::handlers::AppState;
use crate::api::{entity_handlers, handlers};
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>() -> Router<AppState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Studies
        .route(
            "/studies",
            get(handlers::list_studies::<S>)
                .post(handlers::create_study::<S>)
                .delete(handlers::delete_all_studies::<S>),
        )
        .route(
            "/studies/id/:study_id",
            get(handlers::get_study::<S>)
                .put(handlers::replace_study::<S>)
                .delete(handlers::delete_study::<S>),
        )
        // Datasets
        .route(
            "/studies/id/:study_id/datasets",
            get(entity_handlers::list_datasets::<S>).post(entity_handlers::add_dataset::<S>),
        )
        .route(
            "/studies/id/:study_id/datasets/id/:dataset_uuid",
            get(entity_handlers::get_dataset::<S>)
                .put(entity_handlers::update_dataset::<S>)
                .delete(entity_handlers::delete_dataset::<S>),
        )
        // Processing events of a dataset
        .route(
            "/studies/id/:study_id/datasets/id/:dataset_uuid/pes",
            get(entity_handlers::list_process_events::<S>).post(entity_handlers::add_process_event::<S>),
        )
        .route(
            "/studies/id/:study_id/datasets/id/:dataset_uuid/pes/id/:pe_uuid",
            get(entity_handlers::get_process_event::<S>)
                .put(entity_handlers::update_process_event::<S>)
                .delete(entity_handlers::delete_process_event::<S>),
        )
        // Samples
        .route(
            "/studies/id/:study_id/samples",
            get(entity_handlers::list_samples::<S>)
                .post(entity_handlers::add_sample::<S>)
                .delete(entity_handlers::delete_all_samples::<S>),
        )
        .route(
            "/studies/id/:study_id/samples/multiple",
            post(entity_handlers::add_samples::<S>),
        )
        .route(
            "/studies/id/:study_id/samples/id/:sample_uuid",
            get(entity_handlers::get_sample::<S>)
                .put(entity_handlers::update_sample::<S>)
                .delete(entity_handlers::delete_sample::<S>),
        )
        // Entities addressed by UUID only
        .route(
            "/studies/datasets/id/:dataset_uuid",
            get(entity_handlers::get_dataset_by_uuid::<S>)
                .put(entity_handlers::update_dataset_by_uuid::<S>)
                .delete(entity_handlers::delete_dataset_by_uuid::<S>),
        )
        .route(
            "/studies/datasets/id/:dataset_uuid/pes",
            get(entity_handlers::list_process_events_by_dataset_uuid::<S>)
                .post(entity_handlers::add_process_event_by_dataset_uuid::<S>),
        )
        .route(
            "/studies/pes/id/:pe_uuid",
            get(entity_handlers::get_process_event_by_uuid::<S>)
                .put(entity_handlers::update_process_event_by_uuid::<S>)
                .delete(entity_handlers::delete_process_event_by_uuid::<S>),
        )
        .route(
            "/studies/samples/id/:sample_uuid",
            get(entity_handlers::get_sample_by_uuid::<S>)
                .put(entity_handlers::update_sample_by_uuid::<S>)
                .delete(entity_handlers::delete_sample_by_uuid::<S>),
        )
        // Identifier lookups
        .route(
            "/ids/study_id/get_from_lvl1_uuid",
            get(handlers::get_study_id_from_lvl1_uuid::<S>),
        )
        .route(
            "/ids/study_id_and_lvl1/get_from_lvl2_uuid",
            get(handlers::get_study_id_and_lvl1_uuid_from_lvl2_uuid::<S>),
        )
        // Property directory and forms
        .route(
            "/properties",
            get(handlers::list_properties::<S>).post(handlers::create_property::<S>),
        )
        .route("/properties/id/:property_id", get(handlers::get_property::<S>))
        .route(
            "/forms",
            get(handlers::list_forms::<S>).post(handlers::upsert_form::<S>),
        )
        .route("/forms/name/:name", get(handlers::get_form::<S>))
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::registry::Registry;
    use crate::logic::state_machine::Workflow;
    use crate::seed::load_seed_data;
    use crate::store::InMemoryStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn app() -> Router {
        let store = Arc::new(InMemoryStore::new());
        load_seed_data(&*store).await.unwrap();
        let registry = Registry::new(store, Arc::new(Workflow::default()));
        create_router().with_state(Arc::new(registry))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_route() {
        let response = app()
            .await
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_lookup_miss_is_not_found() {
        let response = app()
            .await
            .oneshot(
                Request::get("/ids/study_id/get_from_lvl1_uuid?lvl1_uuid=ABC&lvl1_prop_name=Sample")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await, json!({"error": "sample with uuid ABC not found"}));
    }

    #[tokio::test]
    async fn test_lookup_keeps_client_uuid_case() {
        let app = app().await;
        let create = Request::post("/studies")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({
                    "form_name": "study",
                    "entry_format": "form",
                    "entries": {"study_id": "S-UPPER", "study_title": "T"}
                })
                .to_string(),
            ))
            .unwrap();
        let study_id = body_json(app.clone().oneshot(create).await.unwrap()).await["id"]
            .as_str()
            .unwrap()
            .to_string();

        let add = Request::post(format!("/studies/id/{}/datasets", study_id))
            .header("content-type", "application/json")
            .body(Body::from(
                json!({
                    "form_name": "dataset",
                    "entry_format": "form",
                    "entries": {"uuid": "DS-UPPER", "dataset_name": "RNA", "data_type": "rna"}
                })
                .to_string(),
            ))
            .unwrap();
        assert_eq!(app.clone().oneshot(add).await.unwrap().status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(
                Request::get("/ids/study_id/get_from_lvl1_uuid?lvl1_uuid=DS-UPPER&lvl1_prop_name=Dataset")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"study_id": study_id}));

        let response = app
            .oneshot(
                Request::get("/ids/study_id/get_from_lvl1_uuid?lvl1_uuid=ds-upper")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_study_route() {
        let request = Request::post("/studies")
            .header("content-type", "application/json")
            .header("x-user-id", "u1")
            .body(Body::from(
                json!({
                    "form_name": "study",
                    "entry_format": "form",
                    "entries": {"study_id": "S-1", "study_title": "T"}
                })
                .to_string(),
            ))
            .unwrap();

        let response = app().await.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["message"], json!("Study added"));
    }
}
