use metadata_registry::config::AppConfig;
use metadata_registry::seed::{load_seed_data, seed_property_id};
use metadata_registry::store::InMemoryStore;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;

// Test client wrapper for making API calls
struct TestClient {
    client: Client,
    base_url: String,
}

impl TestClient {
    fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    async fn post(&self, path: &str, json: Value) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(&format!("{}{}", self.base_url, path))
            .header("x-user-id", "integration-user")
            .json(&json)
            .send()
            .await
    }

    async fn put(&self, path: &str, json: Value) -> reqwest::Result<reqwest::Response> {
        self.client
            .put(&format!("{}{}", self.base_url, path))
            .header("x-user-id", "integration-user")
            .json(&json)
            .send()
            .await
    }

    async fn get(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client
            .get(&format!("{}{}", self.base_url, path))
            .send()
            .await
    }

    async fn delete(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client
            .delete(&format!("{}{}", self.base_url, path))
            .send()
            .await
    }
}

/// Start a server on a random port backed by a seeded in-memory store.
async fn start_server() -> TestClient {
    let store = Arc::new(InMemoryStore::new());
    load_seed_data(&*store).await.expect("seed data");

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("local address");

    tokio::spawn(async move {
        let config = AppConfig::default();
        if let Err(e) = metadata_registry::serve(store, &config, listener).await {
            eprintln!("server stopped: {}", e);
        }
    });

    TestClient::new(format!("http://{}", address))
}

async fn json_body(response: reqwest::Response) -> Value {
    response.json().await.expect("JSON body")
}

async fn create_study(client: &TestClient, study_id: &str) -> String {
    let response = client
        .post(
            "/studies",
            json!({
                "form_name": "study",
                "entry_format": "form",
                "entries": {"study_id": study_id, "study_title": "Liver atlas"}
            }),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = json_body(response).await;
    assert_eq!(body["message"], json!("Study added"));
    body["id"].as_str().unwrap().to_string()
}

async fn add_dataset(client: &TestClient, study_id: &str, name: &str) -> String {
    let response = client
        .post(
            &format!("/studies/id/{}/datasets", study_id),
            json!({
                "form_name": "dataset",
                "entry_format": "form",
                "entries": {"dataset_name": name, "tags": ["liver", "rna"]}
            }),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = json_body(response).await;
    assert_eq!(body["message"], json!("Added dataset"));
    body["uuid"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let client = start_server().await;

    let response = client.get("/health").await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], json!("healthy"));
}

#[tokio::test]
async fn test_study_in_both_formats() {
    let client = start_server().await;
    let id = create_study(&client, "ST-1").await;

    let api = json_body(client.get(&format!("/studies/id/{}", id)).await.unwrap()).await;
    assert_eq!(
        api["entries"],
        json!([
            {"property": seed_property_id("study_id"), "value": "ST-1"},
            {"property": seed_property_id("study_title"), "value": "Liver atlas"}
        ])
    );
    assert_eq!(api["meta_information"]["change_log"][0]["user_id"], json!("integration-user"));

    let form = json_body(
        client
            .get(&format!("/studies/id/{}?entry_format=form", id))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(form["entries"], json!({"study_id": "ST-1", "study_title": "Liver atlas"}));

    let listed = json_body(client.get("/studies").await.unwrap()).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_dataset_and_process_event_workflow() {
    let client = start_server().await;
    let study_id = create_study(&client, "ST-1").await;
    let dataset_uuid = add_dataset(&client, &study_id, "Bulk RNA").await;

    println!("1. Dataset is addressable by UUID");
    let dataset = json_body(
        client
            .get(&format!("/studies/datasets/id/{}?entry_format=form", dataset_uuid))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(
        dataset,
        json!({"uuid": dataset_uuid, "dataset_name": "Bulk RNA", "tags": ["liver", "rna"]})
    );

    let ids = json_body(
        client
            .get(&format!(
                "/ids/study_id/get_from_lvl1_uuid?lvl1_uuid={}&lvl1_prop_name=Dataset",
                dataset_uuid
            ))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(ids, json!({"study_id": study_id}));

    println!("2. Processing event through the alias route");
    let response = client
        .post(
            &format!("/studies/datasets/id/{}/pes", dataset_uuid),
            json!({
                "form_name": "process_event",
                "entry_format": "form",
                "entries": {"process_event_type": "sequencing"}
            }),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let pe_uuid = json_body(response).await["uuid"].as_str().unwrap().to_string();

    let ids = json_body(
        client
            .get(&format!("/ids/study_id_and_lvl1/get_from_lvl2_uuid?lvl2_uuid={}", pe_uuid))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(ids, json!({"study_id": study_id, "lvl1_uuid": dataset_uuid}));

    let pe = json_body(
        client
            .get(&format!("/studies/pes/id/{}?entry_format=form", pe_uuid))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(pe["process_event_type"], json!("sequencing"));

    println!("3. Partial dataset update keeps other fields");
    let response = client
        .put(
            &format!("/studies/id/{}/datasets/id/{}", study_id, dataset_uuid),
            json!({
                "form_name": "dataset",
                "entry_format": "form",
                "entries": {"data_type": "rna", "tags": []}
            }),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["message"], json!("Updated dataset"));

    let dataset = json_body(
        client
            .get(&format!("/studies/id/{}/datasets/id/{}?entry_format=form", study_id, dataset_uuid))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(dataset["data_type"], json!("rna"));
    assert_eq!(dataset["dataset_name"], json!("Bulk RNA"));
    assert!(dataset.get("tags").is_none());
    assert_eq!(dataset["process_events"][0]["uuid"], json!(pe_uuid));

    println!("4. Deleting the last dataset removes the list");
    let response = client
        .delete(&format!("/studies/id/{}/datasets/id/{}", study_id, dataset_uuid))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["message"], json!("Deleted dataset"));

    let study = json_body(
        client
            .get(&format!("/studies/id/{}?entry_format=form", study_id))
            .await
            .unwrap(),
    )
    .await;
    assert!(study["entries"].get("datasets").is_none());

    let response = client
        .get(&format!("/ids/study_id/get_from_lvl1_uuid?lvl1_uuid={}", dataset_uuid))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        json_body(response).await["error"],
        json!(format!("dataset with uuid {} not found", dataset_uuid))
    );
}

#[tokio::test]
async fn test_samples_workflow() {
    let client = start_server().await;
    let study_id = create_study(&client, "ST-1").await;

    let response = client
        .post(
            &format!("/studies/id/{}/samples/multiple", study_id),
            json!({
                "entry_format": "form",
                "validate": {"sample": true, "individual": true},
                "entries": [
                    {"sample_name": "S1", "individual": {"individual_name": "Mouse 1", "species": "mouse"}},
                    {"sample_name": "S2", "individual": {"individual_name": "Mouse 1", "organism": "mouse"}}
                ]
            }),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["message"], json!("Added 2 samples (replace = false)"));
    let uuids: Vec<String> = body["uuids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u.as_str().unwrap().to_string())
        .collect();

    let samples = json_body(
        client
            .get(&format!("/studies/id/{}/samples?entry_format=form", study_id))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(samples[0]["individual"]["uuid"], samples[1]["individual"]["uuid"]);

    let response = client
        .put(
            &format!("/studies/samples/id/{}", uuids[1]),
            json!({"entry_format": "form", "entries": {"sample_name": "S2b"}}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let sample = json_body(
        client
            .get(&format!("/studies/id/{}/samples/id/{}?entry_format=form", study_id, uuids[1]))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(sample["sample_name"], json!("S2b"));
    assert_eq!(sample["individual"]["individual_name"], json!("Mouse 1"));

    let response = client
        .delete(&format!("/studies/id/{}/samples", study_id))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["message"], json!("Deleted samples"));

    let samples = json_body(
        client
            .get(&format!("/studies/id/{}/samples", study_id))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(samples, json!([]));
}

#[tokio::test]
async fn test_error_responses() {
    let client = start_server().await;
    let study_id = create_study(&client, "ST-1").await;

    // Unknown property identifier
    let response = client
        .post(
            &format!("/studies/id/{}/datasets", study_id),
            json!({
                "form_name": "dataset",
                "entries": [{"property": "prop_missing", "value": "x"}]
            }),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Required field missing
    let response = client
        .post(
            &format!("/studies/id/{}/datasets", study_id),
            json!({"form_name": "dataset", "entry_format": "form", "entries": {"data_type": "rna"}}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["details"]["dataset_name"], json!(["This field is required."]));

    // Same property twice in API format
    let response = client
        .post(
            &format!("/studies/id/{}/datasets", study_id),
            json!({
                "form_name": "dataset",
                "entries": [
                    {"property": seed_property_id("dataset_name"), "value": "a"},
                    {"property": seed_property_id("dataset_name"), "value": "b"}
                ]
            }),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Alternate key already used
    let response = client
        .post(
            "/studies",
            json!({
                "form_name": "study",
                "entry_format": "form",
                "entries": {"study_id": "ST-1", "study_title": "Copy"}
            }),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Unknown study and entity
    let response = client.get("/studies/id/does-not-exist").await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = client
        .get(&format!("/studies/id/{}/datasets/id/nope", study_id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = client.get("/studies/samples/id/nope").await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deprecate_then_delete_study() {
    let client = start_server().await;
    let id = create_study(&client, "ST-1").await;

    let response = client.delete(&format!("/studies/id/{}", id)).await.unwrap();
    assert_eq!(json_body(response).await["message"], json!("Deprecate entry"));

    let visible = json_body(client.get("/studies").await.unwrap()).await;
    assert_eq!(visible, json!([]));
    let all = json_body(client.get("/studies?deprecated=true").await.unwrap()).await;
    assert_eq!(all[0]["meta_information"]["deprecated"], json!(true));

    let response = client
        .delete(&format!("/studies/id/{}?complete=true", id))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["message"], json!("Delete entry"));
    let response = client.get(&format!("/studies/id/{}", id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
