//! Controllers declared in YAML and served over HTTP

mod common;

use axum::http::{StatusCode, header};
use axum_test::TestServer;
use common::*;
use restmodel::prelude::*;
use std::io::Write;

const CONFIG: &str = r#"
prefix: rest
controllers:
  - name: users
    entity: user
    limit: 1
    order: name DESC
    safeAttributes: id, name, comments
    priorityData:
      tenant_id: 1
    baseFilter:
      tenant_id: "1"
    relations:
      comments:
        return: array
        keyField: id
        safeAttributes: [id, text]
  - name: ghosts
    entity: ghost
"#;

fn write_config(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(yaml.as_bytes()).expect("Failed to write config");
    file
}

fn configured_server(fx: &Fixture, configs: Vec<ApiConfig>) -> TestServer {
    let mut builder = ServerBuilder::new().with_stores(fx.db.registry().expect("registry"));
    for config in configs {
        builder = builder.with_config(config);
    }
    let app = builder.build().expect("Failed to build app");
    TestServer::try_new(app).expect("Failed to create test server")
}

#[tokio::test]
async fn test_configured_controller_from_file() {
    let fx = fixture();
    let file = write_config(CONFIG);
    let config = ApiConfig::from_yaml_file(file.path().to_str().expect("utf-8 path"))
        .expect("Failed to load config");
    let server = configured_server(&fx, vec![config]);

    let response = server.get("/rest/users").add_query_param("with", "comments").await;
    response.assert_status_ok();
    assert_eq!(
        response.headers().get(header::CONTENT_RANGE).and_then(|v| v.to_str().ok()),
        Some("items 0-0/2")
    );
    let body: Value = response.json();
    assert_eq!(body, json!([{"id": 2, "name": "Bob", "comments": {}}]));

    let response = server
        .get("/rest/users/1")
        .add_query_param("with", "comments")
        .await;
    let body: Value = response.json();
    assert_eq!(
        body,
        json!({
            "id": 1,
            "name": "Alice",
            "comments": {"1": {"id": 1, "text": "First"}, "2": {"id": 2, "text": "Second"}}
        })
    );

    // outside the base filter
    server.get("/rest/users/3").await.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_configured_priority_data() {
    let fx = fixture();
    let config = ApiConfig::from_yaml_str(CONFIG).expect("Failed to parse config");
    let server = configured_server(&fx, vec![config]);

    let response = server
        .post("/rest/users")
        .json(&json!({"name": "Dave", "email": "dave@example.com", "tenant_id": 2}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body, json!({"id": 4, "name": "Dave"}));
    assert_eq!(fx.value("user", 4, "tenant_id"), FieldValue::Integer(1));
}

#[tokio::test]
async fn test_controller_without_store() {
    let fx = fixture();
    let config = ApiConfig::from_yaml_str(CONFIG).expect("Failed to parse config");
    let server = configured_server(&fx, vec![config]);

    let response = server.get("/rest/ghosts").await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body, json!({"error": ["Wrong collection model."]}));
}

#[tokio::test]
async fn test_merged_configs() {
    let fx = fixture();
    let base = ApiConfig::from_yaml_str(CONFIG).expect("Failed to parse config");
    let overrides = ApiConfig::from_yaml_str(
        r#"
prefix: v2
controllers:
  - name: users
    entity: user
    safe_attributes: [id, email]
  - name: comments
    entity: comment
"#,
    )
    .expect("Failed to parse config");
    let server = configured_server(&fx, vec![base, overrides]);

    let response = server.get("/v2/users/3").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body, json!({"id": 3, "email": "carol@example.org"}));

    let response = server.get("/v2/comments").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(column(&body, "id"), vec![json!(1), json!(2), json!(3)]);

    server.get("/rest/users").await.assert_status(StatusCode::NOT_FOUND);
}

#[test]
fn test_missing_config_file() {
    assert!(ApiConfig::from_yaml_file("/nonexistent/restmodel.yaml").is_err());
}
