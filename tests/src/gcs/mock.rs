#![cfg(test)]
//! Drives `GcsStore` against a small in-process imitation of the JSON API.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use transfer_common::config::TransferSettings;
use transfer_common::manifest::{Manifest, TransferRecord};
use transfer_common::storage::{ObjectLocation, ObjectStore};
use transfer_common::TransferError;
use transfer_core::auth::StaticToken;
use transfer_core::gcs::{GcsStore, RetryPolicy};
use transfer_core::transfer::TransferService;

const TOKEN: &str = "ya29.test-token";
const TIMESTAMP: &str = "2024-03-05T10:20:30.456Z";

#[derive(Default)]
struct MockState {
    buckets: HashSet<String>,
    objects: HashMap<(String, String), Value>,
    /// Requests answered with 503 before the rewrite endpoint behaves.
    unavailable: u32,
    /// Every request as `METHOD bucket/object?userProject`.
    requests: Vec<String>,
    unauthorized: u32,
    /// Deletes that succeed but answer 503, as if the reply was lost.
    lost_deletes: u32,
    /// Delay before a bucket lookup answers.
    stall: Option<Duration>,
}

type Shared = Arc<Mutex<MockState>>;

fn resource(bucket: &str, name: &str, size: u64, md5: &str, content_type: &str) -> Value {
    json!({
        "kind": "storage#object",
        "id": format!("{bucket}/{name}/1709634030456000"),
        "selfLink": format!(
            "https://www.googleapis.com/storage/v1/b/{bucket}/o/{}",
            name.replace('/', "%2F")
        ),
        "name": name,
        "bucket": bucket,
        "generation": "1709634030456000",
        "contentType": content_type,
        "storageClass": "STANDARD",
        "size": size.to_string(),
        "md5Hash": md5,
        "crc32c": "AAAAAA==",
        "timeCreated": TIMESTAMP,
        "updated": TIMESTAMP,
    })
}

fn api_error(status: StatusCode, message: &str) -> Response {
    let body = json!({ "error": { "code": status.as_u16(), "message": message } });
    (status, Json(body)).into_response()
}

fn record(
    state: &Shared,
    headers: &HeaderMap,
    entry: String,
    query: &HashMap<String, String>,
) -> bool {
    let mut state = state.lock().unwrap();
    let entry = match query.get("userProject") {
        Some(project) => format!("{entry}?{project}"),
        None => entry,
    };
    state.requests.push(entry);

    let authorized = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == format!("Bearer {TOKEN}"));
    if !authorized {
        state.unauthorized += 1;
    }
    authorized
}

async fn get_bucket(
    State(state): State<Shared>,
    Path(bucket): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !record(&state, &headers, format!("GET {bucket}"), &query) {
        return api_error(StatusCode::UNAUTHORIZED, "Invalid Credentials");
    }
    let stall = state.lock().unwrap().stall;
    if let Some(stall) = stall {
        tokio::time::sleep(stall).await;
    }
    if bucket == "locked" {
        return api_error(StatusCode::FORBIDDEN, "caller does not have storage.buckets.get access");
    }
    if state.lock().unwrap().buckets.contains(&bucket) {
        Json(json!({ "name": bucket })).into_response()
    } else {
        api_error(StatusCode::NOT_FOUND, "The specified bucket does not exist.")
    }
}

async fn get_object(
    State(state): State<Shared>,
    Path((bucket, object)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !record(&state, &headers, format!("GET {bucket}/{object}"), &query) {
        return api_error(StatusCode::UNAUTHORIZED, "Invalid Credentials");
    }
    match state.lock().unwrap().objects.get(&(bucket, object)) {
        Some(resource) => Json(resource.clone()).into_response(),
        None => api_error(StatusCode::NOT_FOUND, "No such object"),
    }
}

async fn delete_object(
    State(state): State<Shared>,
    Path((bucket, object)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !record(&state, &headers, format!("DELETE {bucket}/{object}"), &query) {
        return api_error(StatusCode::UNAUTHORIZED, "Invalid Credentials");
    }
    let mut state = state.lock().unwrap();
    if state.objects.remove(&(bucket, object)).is_none() {
        return api_error(StatusCode::NOT_FOUND, "No such object");
    }
    if state.lost_deletes > 0 {
        state.lost_deletes -= 1;
        return api_error(StatusCode::SERVICE_UNAVAILABLE, "Backend Error");
    }
    StatusCode::NO_CONTENT.into_response()
}

/// Copies in two calls: the first returns half the bytes and a token.
async fn rewrite_object(
    State(state): State<Shared>,
    Path((bucket, object, target_bucket, target_object)): Path<(String, String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let entry = format!("POST {bucket}/{object} -> {target_bucket}/{target_object}");
    if !record(&state, &headers, entry, &query) {
        return api_error(StatusCode::UNAUTHORIZED, "Invalid Credentials");
    }

    let mut state = state.lock().unwrap();
    if state.unavailable > 0 {
        state.unavailable -= 1;
        return api_error(StatusCode::SERVICE_UNAVAILABLE, "Backend Error");
    }
    if !state.buckets.contains(&target_bucket) {
        return api_error(StatusCode::NOT_FOUND, "The specified bucket does not exist.");
    }
    let Some(source) = state.objects.get(&(bucket.clone(), object.clone())).cloned() else {
        return api_error(StatusCode::NOT_FOUND, "No such object");
    };

    let size: u64 = source["size"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0);
    let rewrite_token = query.get("rewriteToken");

    if rewrite_token.is_none() {
        return Json(json!({
            "kind": "storage#rewriteResponse",
            "totalBytesRewritten": (size / 2).to_string(),
            "objectSize": size.to_string(),
            "done": false,
            "rewriteToken": "token-1",
        }))
        .into_response();
    }
    if rewrite_token.map(String::as_str) != Some("token-1") {
        return api_error(StatusCode::BAD_REQUEST, "Invalid rewrite token");
    }

    let copy = resource(
        &target_bucket,
        &target_object,
        size,
        source["md5Hash"].as_str().unwrap_or_default(),
        source["contentType"].as_str().unwrap_or_default(),
    );
    state.objects.insert((target_bucket, target_object), copy.clone());

    Json(json!({
        "kind": "storage#rewriteResponse",
        "totalBytesRewritten": size.to_string(),
        "objectSize": size.to_string(),
        "done": true,
        "resource": copy,
    }))
    .into_response()
}

async fn serve(state: Shared) -> SocketAddr {
    let app = Router::new()
        .route("/storage/v1/b/{bucket}", get(get_bucket))
        .route("/storage/v1/b/{bucket}/o/{object}", get(get_object).delete(delete_object))
        .route(
            "/storage/v1/b/{bucket}/o/{object}/rewriteTo/b/{target_bucket}/o/{target_object}",
            post(rewrite_object),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

fn seeded() -> Shared {
    let mut state = MockState::default();
    state.buckets.insert("incoming".to_owned());
    state.buckets.insert("archive".to_owned());
    state.objects.insert(
        ("incoming".to_owned(), "lane 1/reads+1.bam".to_owned()),
        resource(
            "incoming",
            "lane 1/reads+1.bam",
            2048,
            "1B2M2Y8AsgTpgAmY7PhCfg==",
            "application/octet-stream",
        ),
    );
    Arc::new(Mutex::new(state))
}

fn store(addr: SocketAddr) -> GcsStore {
    GcsStore::new(reqwest::Client::new(), Arc::new(StaticToken::new(TOKEN)))
        .with_endpoint(&format!("http://{addr}"))
        .with_retry(RetryPolicy::new(3).with_base_delay(Duration::from_millis(1)))
}

#[tokio::test]
async fn stat_decodes_encoded_names() {
    let state = seeded();
    let addr = serve(state.clone()).await;

    let object = store(addr)
        .stat(&ObjectLocation::new("incoming", "lane 1/reads+1.bam"))
        .await
        .unwrap();

    assert_eq!(object.name, "lane 1/reads+1.bam");
    assert_eq!(object.size, 2048);
    assert_eq!(object.md5_hash.as_deref(), Some("1B2M2Y8AsgTpgAmY7PhCfg=="));
    assert_eq!(object.storage_class.as_deref(), Some("STANDARD"));
    assert_eq!(state.lock().unwrap().unauthorized, 0);
}

#[tokio::test]
async fn errors_map_to_subjects() {
    let state = seeded();
    let addr = serve(state).await;
    let store = store(addr);

    let missing_bucket = store.ensure_bucket("nowhere").await.unwrap_err();
    assert!(matches!(missing_bucket, TransferError::BucketNotFound(ref b) if b == "nowhere"));

    let missing_object = store
        .stat(&ObjectLocation::new("incoming", "gone.txt"))
        .await
        .unwrap_err();
    assert!(matches!(
        missing_object,
        TransferError::ObjectNotFound(ref o) if o == "gs://incoming/gone.txt"
    ));

    let denied = store.ensure_bucket("locked").await.unwrap_err();
    match denied {
        TransferError::PermissionDenied(message) => {
            assert!(message.contains("storage.buckets.get"))
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn rejected_token_is_permission_denied() {
    let state = seeded();
    let addr = serve(state.clone()).await;
    let store = GcsStore::new(reqwest::Client::new(), Arc::new(StaticToken::new("wrong")))
        .with_endpoint(&format!("http://{addr}"));

    let error = store.ensure_bucket("incoming").await.unwrap_err();

    assert!(matches!(error, TransferError::PermissionDenied(_)));
    assert_eq!(state.lock().unwrap().unauthorized, 1);
}

#[tokio::test]
async fn rewrite_retries_unavailable() {
    let state = seeded();
    state.lock().unwrap().unavailable = 2;
    let addr = serve(state.clone()).await;

    let progress = store(addr)
        .rewrite(
            &ObjectLocation::new("incoming", "lane 1/reads+1.bam"),
            &ObjectLocation::new("archive", "reads+1.bam"),
            None,
        )
        .await
        .unwrap();

    assert!(!progress.done);
    assert_eq!(progress.bytes_rewritten, 1024);
    assert_eq!(progress.token.as_deref(), Some("token-1"));
    assert_eq!(state.lock().unwrap().requests.len(), 3);
}

#[tokio::test]
async fn rewrite_gives_up_after_attempts() {
    let state = seeded();
    state.lock().unwrap().unavailable = 10;
    let addr = serve(state.clone()).await;

    let error = store(addr)
        .rewrite(
            &ObjectLocation::new("incoming", "lane 1/reads+1.bam"),
            &ObjectLocation::new("archive", "reads+1.bam"),
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(error, TransferError::Api { status: 503, .. }));
    assert_eq!(state.lock().unwrap().requests.len(), 3);
}

#[tokio::test]
async fn delete_after_lost_answer_succeeds() {
    let state = seeded();
    state.lock().unwrap().lost_deletes = 1;
    let addr = serve(state.clone()).await;

    store(addr)
        .delete(&ObjectLocation::new("incoming", "lane 1/reads+1.bam"))
        .await
        .unwrap();

    let state = state.lock().unwrap();
    assert!(state.objects.is_empty());
    assert_eq!(
        state.requests,
        vec![
            "DELETE incoming/lane 1/reads+1.bam",
            "DELETE incoming/lane 1/reads+1.bam",
        ]
    );
}

#[tokio::test]
async fn delete_of_missing_object_fails() {
    let state = seeded();
    let addr = serve(state.clone()).await;

    let error = store(addr)
        .delete(&ObjectLocation::new("incoming", "gone.txt"))
        .await
        .unwrap_err();

    assert!(matches!(error, TransferError::ObjectNotFound(_)));
    assert_eq!(state.lock().unwrap().requests.len(), 1);
}

#[tokio::test]
async fn stalled_request_times_out_and_retries() {
    let state = seeded();
    state.lock().unwrap().stall = Some(Duration::from_secs(5));
    let addr = serve(state.clone()).await;
    let http = transfer_core::gcs::http_client(Duration::from_millis(200)).unwrap();
    let store = GcsStore::new(http, Arc::new(StaticToken::new(TOKEN)))
        .with_endpoint(&format!("http://{addr}"))
        .with_retry(RetryPolicy::new(2).with_base_delay(Duration::from_millis(1)));

    let error = store.ensure_bucket("incoming").await.unwrap_err();

    assert!(matches!(error, TransferError::Http(_)), "unexpected error: {error}");
    assert_eq!(state.lock().unwrap().requests.len(), 2);
}

#[tokio::test]
async fn transfer_through_api() {
    let state = seeded();
    let addr = serve(state.clone()).await;
    let store = store(addr).with_billing_project(Some("lab-project".to_owned()));

    let manifest = Manifest::from_json(
        r#"[{"id": 42, "node": {"bucket": "incoming", "path": "lane 1/reads+1.bam"}}]"#,
    )
    .unwrap();
    let settings = TransferSettings::new("archive").with_delete_source(true);
    let service = TransferService::new(store, settings);

    let mut records: Vec<TransferRecord> = Vec::new();
    let summary = service.run(&manifest, &mut records).await.unwrap();

    assert!(summary.is_success(), "failures: {:?}", summary.failed);
    assert_eq!(summary.completed[0].rewrite_calls, 2);
    assert_eq!(records[0].id, json!(42));
    assert_eq!(records[0].node.bucket, "archive");
    assert_eq!(records[0].node.path, "lane 1/reads+1.bam");
    assert_eq!(records[0].node.dirname, "lane 1");
    assert_eq!(records[0].node.time_created_iso, "2024-03-05T10:20:30.456000+00:00");
    assert_eq!(
        records[0].node.public_url,
        "https://storage.googleapis.com/archive/lane%201/reads%2B1.bam"
    );

    let state = state.lock().unwrap();
    assert!(!state
        .objects
        .contains_key(&("incoming".to_owned(), "lane 1/reads+1.bam".to_owned())));
    assert_eq!(
        state.requests,
        vec![
            "GET archive?lab-project",
            "GET incoming?lab-project",
            "GET incoming/lane 1/reads+1.bam?lab-project",
            "POST incoming/lane 1/reads+1.bam -> archive/lane 1/reads+1.bam?lab-project",
            "POST incoming/lane 1/reads+1.bam -> archive/lane 1/reads+1.bam?lab-project",
            "GET archive/lane 1/reads+1.bam?lab-project",
            "DELETE incoming/lane 1/reads+1.bam?lab-project",
        ]
    );
}
