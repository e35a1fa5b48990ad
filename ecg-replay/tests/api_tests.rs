//! Integration tests for ecg-replay HTTP endpoints
//!
//! Tests cover:
//! - Health endpoint
//! - Bulk observation query (success, empty artifact, missing/malformed artifact)
//! - Upload (missing file, purge of stale intake files, transformer failure)
//! - Reprocess endpoint
//! - Heart-rate analysis endpoint
//!
//! Transformer tests use `sh -c` scripts and are unix-only.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use ecg_common::config::TomlConfig;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::path::Path;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method
use ecg_replay::{build_router, AppState};

const BOUNDARY: &str = "ecg-test-boundary";

/// Test helper: config rooted in a temp directory
fn test_config(root: &Path) -> TomlConfig {
    let mut config = TomlConfig::default();
    config.artifact_path = root.join("output").join("fhir_observations.json");
    config.intake_dir = root.join("data");
    config.transformer.program = "sh".to_string();
    config.transformer.args = vec!["-c".to_string(), "true".to_string()];
    config
}

/// Test helper: transformer script run via `sh -c`
fn with_script(mut config: TomlConfig, script: &str) -> TomlConfig {
    config.transformer.args = vec!["-c".to_string(), script.to_string()];
    config
}

fn setup_app(config: &TomlConfig) -> axum::Router {
    build_router(AppState::new(config))
}

fn write_artifact(config: &TomlConfig, content: &str) {
    std::fs::create_dir_all(config.artifact_path.parent().unwrap()).unwrap();
    std::fs::write(&config.artifact_path, content).unwrap();
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn multipart_upload(field: &str, filename: &str, content: &str) -> Request<Body> {
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n{content}\r\n--{b}--\r\n",
        b = BOUNDARY,
        field = field,
        filename = filename,
        content = content,
    );
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Test helper: Extract JSON body from response
async fn extract_json(body: Body) -> Value {
    let bytes = body.collect().await.expect("Should read body").to_bytes();
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

fn intake_entries(config: &TomlConfig) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(&config.intake_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

const THREE_OBSERVATIONS: &str = r#"[
    {"effectiveDateTime": "2024-12-30T10:00:00Z", "valueQuantity": {"value": 0.5}},
    {"effectiveDateTime": "2024-12-30T10:00:01Z", "valueQuantity": {"value": 0.7}},
    {"effectiveDateTime": "2024-12-30T10:01:00Z", "valueQuantity": {"value": 0.6}}
]"#;

// =============================================================================
// Health Endpoint
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let dir = TempDir::new().unwrap();
    let app = setup_app(&test_config(dir.path()));

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "ecg-replay");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_health_ok_without_artifact() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    assert!(!config.artifact_path.exists());

    let response = setup_app(&config).oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Bulk Observation Query
// =============================================================================

#[tokio::test]
async fn test_observations_dedup_by_second() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_artifact(&config, THREE_OBSERVATIONS);

    let response = setup_app(&config)
        .oneshot(get("/api/observations"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(
        body,
        json!([
            {"time": 0, "value": 0.5, "seconds": 0},
            {"time": 1, "value": 0.7, "seconds": 1}
        ])
    );
}

#[tokio::test]
async fn test_observations_alias_route() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_artifact(&config, THREE_OBSERVATIONS);

    let response = setup_app(&config).oneshot(get("/observations")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(extract_json(response.into_body()).await.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_observations_empty_artifact_is_empty_list() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_artifact(&config, "[]");

    let response = setup_app(&config)
        .oneshot(get("/api/observations"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(extract_json(response.into_body()).await, json!([]));
}

#[tokio::test]
async fn test_observations_missing_artifact_is_server_error() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());

    let response = setup_app(&config)
        .oneshot(get("/api/observations"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        extract_json(response.into_body()).await,
        json!({"error": "Unable to read ECG data."})
    );
}

#[tokio::test]
async fn test_observations_malformed_artifact_is_server_error() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_artifact(&config, r#"[{"effectiveDateTime": 12}]"#);

    let response = setup_app(&config)
        .oneshot(get("/api/observations"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = extract_json(response.into_body()).await;
    assert!(body["error"].is_string());
}

// =============================================================================
// Upload
// =============================================================================

#[tokio::test]
async fn test_upload_without_multipart_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());

    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .body(Body::empty())
        .unwrap();
    let response = setup_app(&config).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        extract_json(response.into_body()).await,
        json!({"error": "No file uploaded."})
    );
}

#[tokio::test]
async fn test_upload_with_wrong_field_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());

    let response = setup_app(&config)
        .oneshot(multipart_upload("other", "input_file.h5", "raw"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        extract_json(response.into_body()).await,
        json!({"error": "No file uploaded."})
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_upload_purges_stale_files_and_refreshes_artifact() {
    let dir = TempDir::new().unwrap();
    let config = with_script(
        test_config(dir.path()),
        r#"mkdir -p "$(dirname "$ECG_ARTIFACT_PATH")" && cp "$ECG_INTAKE_DIR/recording.json" "$ECG_ARTIFACT_PATH" && echo converted"#,
    );
    std::fs::create_dir_all(&config.intake_dir).unwrap();
    std::fs::write(config.intake_dir.join("old_a.h5"), "stale").unwrap();
    std::fs::write(config.intake_dir.join("old_b.h5"), "stale").unwrap();
    std::fs::create_dir_all(config.intake_dir.join("leftover_dir")).unwrap();

    let app = setup_app(&config);
    let response = app
        .clone()
        .oneshot(multipart_upload("file", "recording.json", THREE_OBSERVATIONS))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["filename"], "recording.json");
    assert_eq!(body["stdout"], "converted\n");
    assert!(body["message"].is_string());
    let mut purged: Vec<String> = body["purged"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    purged.sort();
    assert_eq!(purged, vec!["leftover_dir", "old_a.h5", "old_b.h5"]);
    assert_eq!(body["purge_failures"], json!([]));

    // Exactly the uploaded file remains
    assert_eq!(intake_entries(&config), vec!["recording.json"]);

    // The transformer output is visible to the bulk query
    let response = app.oneshot(get("/api/observations")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(extract_json(response.into_body()).await.as_array().unwrap().len(), 2);
}

#[cfg(unix)]
#[tokio::test]
async fn test_upload_strips_path_components() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());

    let response = setup_app(&config)
        .oneshot(multipart_upload("file", "../../escape.h5", "raw"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(intake_entries(&config), vec!["escape.h5"]);
    assert!(!dir.path().join("escape.h5").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_upload_transformer_failure_keeps_upload() {
    let dir = TempDir::new().unwrap();
    let config = with_script(test_config(dir.path()), "echo 'bad input' >&2; exit 3");
    std::fs::create_dir_all(&config.intake_dir).unwrap();
    std::fs::write(config.intake_dir.join("previous.h5"), "stale").unwrap();

    let response = setup_app(&config)
        .oneshot(multipart_upload("file", "input_file.h5", "raw"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = extract_json(response.into_body()).await;
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("bad input"), "got {}", message);

    // Upload accepted and purge not rolled back
    assert_eq!(intake_entries(&config), vec!["input_file.h5"]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_upload_stderr_on_success_fails_by_default() {
    let dir = TempDir::new().unwrap();
    let config = with_script(test_config(dir.path()), "echo 'deprecation warning' >&2; exit 0");

    let response = setup_app(&config)
        .oneshot(multipart_upload("file", "input_file.h5", "raw"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = extract_json(response.into_body()).await;
    assert!(body["error"].as_str().unwrap().contains("deprecation warning"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_upload_stderr_tolerated_when_lenient() {
    let dir = TempDir::new().unwrap();
    let mut config = with_script(test_config(dir.path()), "echo 'deprecation warning' >&2; exit 0");
    config.transformer.fail_on_stderr = false;

    let response = setup_app(&config)
        .oneshot(multipart_upload("file", "input_file.h5", "raw"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["stderr"], "deprecation warning\n");
}

#[tokio::test]
async fn test_upload_transformer_launch_failure() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.transformer.program = dir
        .path()
        .join("no-such-transformer")
        .to_string_lossy()
        .into_owned();

    let response = setup_app(&config)
        .oneshot(multipart_upload("file", "input_file.h5", "raw"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = extract_json(response.into_body()).await;
    assert!(body["error"].as_str().unwrap().contains("Failed to launch"));
}

// =============================================================================
// Reprocess
// =============================================================================

#[cfg(unix)]
#[tokio::test]
async fn test_process_runs_transformer_without_upload() {
    let dir = TempDir::new().unwrap();
    let config = with_script(test_config(dir.path()), "echo reprocessed");

    let response = setup_app(&config).oneshot(get("/process")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["stdout"], "reprocessed\n");
    assert!(body["message"].is_string());
}

#[cfg(unix)]
#[tokio::test]
async fn test_process_failure_is_server_error() {
    let dir = TempDir::new().unwrap();
    let config = with_script(test_config(dir.path()), "exit 1");

    let response = setup_app(&config).oneshot(get("/process")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(extract_json(response.into_body()).await["error"].is_string());
}

// =============================================================================
// Heart-rate Analysis
// =============================================================================

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_heart_data_analysis() {
    let dir = TempDir::new().unwrap();
    let app = setup_app(&test_config(dir.path()));

    let response = app
        .oneshot(post_json(
            "/api/heart-data",
            json!({"heart_rate": [110.0, 120.0, 10.0, 250.0]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["analysis"]["average_heart_rate"], 115.0);
    assert_eq!(body["analysis"]["status"], "high");
}

#[tokio::test]
async fn test_heart_data_empty_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let app = setup_app(&test_config(dir.path()));

    let response = app
        .oneshot(post_json("/api/heart-data", json!({"heart_rate": []})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        extract_json(response.into_body()).await,
        json!({"error": "No heart rate data provided"})
    );
}

#[tokio::test]
async fn test_heart_data_all_invalid_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let app = setup_app(&test_config(dir.path()));

    let response = app
        .oneshot(post_json("/api/heart-data", json!({"heart_rate": [5.0, 300.0]})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        extract_json(response.into_body()).await,
        json!({"error": "No valid heart rate data found"})
    );
}

#[tokio::test]
async fn test_heart_data_malformed_payload_is_distinct() {
    let dir = TempDir::new().unwrap();
    let app = setup_app(&test_config(dir.path()));

    for body in [r#"{"heart_rate": [70, "x"]}"#, r#"{"heart_rate": [70,"#] {
        let request = Request::builder()
            .method("POST")
            .uri("/api/heart-data")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            extract_json(response.into_body()).await,
            json!({"error": "Malformed heart rate payload"})
        );
    }
}

#[tokio::test]
async fn test_heart_data_missing_body_is_no_data() {
    let dir = TempDir::new().unwrap();
    let app = setup_app(&test_config(dir.path()));

    let request = Request::builder()
        .method("POST")
        .uri("/api/heart-data")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        extract_json(response.into_body()).await,
        json!({"error": "No heart rate data provided"})
    );
}
