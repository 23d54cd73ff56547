#![cfg(test)]
//! Mints tokens through both credential flows against local token endpoints.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::{json, Value};
use transfer_common::TransferError;
use transfer_core::auth::metadata::MetadataServer;
use transfer_core::auth::service_account::{ServiceAccount, ServiceAccountKey};
use transfer_core::auth::{TokenProvider, STORAGE_SCOPE};

const PRIVATE_KEY: &str = include_str!("../../fixtures/service_account.pem");
const PUBLIC_KEY: &str = include_str!("../../fixtures/service_account.pub.pem");
const CLIENT_EMAIL: &str = "mover@lab-project.iam.gserviceaccount.com";
const JWT_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

#[derive(Default)]
struct TokenEndpoint {
    /// Form bodies posted to `/token`.
    exchanges: Vec<HashMap<String, String>>,
    /// Metadata requests, with their `Metadata-Flavor` header.
    metadata_calls: Vec<Option<String>>,
    expires_in: i64,
}

type Shared = Arc<Mutex<TokenEndpoint>>;

fn granted(token: &str, expires_in: i64) -> Response {
    Json(json!({ "access_token": token, "expires_in": expires_in, "token_type": "Bearer" }))
        .into_response()
}

async fn exchange(
    State(state): State<Shared>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().unwrap();
    state.exchanges.push(form);
    let token = format!("ya29.minted-{}", state.exchanges.len());
    granted(&token, state.expires_in)
}

async fn metadata_token(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let flavor = headers
        .get("metadata-flavor")
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let mut state = state.lock().unwrap();
    state.metadata_calls.push(flavor.clone());
    if flavor.as_deref() != Some("Google") {
        return (StatusCode::FORBIDDEN, "Missing Metadata-Flavor header").into_response();
    }
    granted("ya29.instance", state.expires_in)
}

async fn serve(state: Shared) -> SocketAddr {
    let app = Router::new()
        .route("/token", post(exchange))
        .route(
            "/computeMetadata/v1/instance/service-accounts/default/token",
            get(metadata_token),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

fn endpoint(expires_in: i64) -> Shared {
    Arc::new(Mutex::new(TokenEndpoint {
        expires_in,
        ..TokenEndpoint::default()
    }))
}

fn service_account(token_uri: &str) -> ServiceAccount {
    let key = ServiceAccountKey {
        client_email: CLIENT_EMAIL.to_owned(),
        private_key: PRIVATE_KEY.to_owned(),
        token_uri: token_uri.to_owned(),
        project_id: Some("lab-project".to_owned()),
    };
    ServiceAccount::new(key, reqwest::Client::new()).unwrap()
}

#[tokio::test]
async fn service_account_exchanges_signed_assertion() {
    let state = endpoint(3600);
    let addr = serve(state.clone()).await;
    let token_uri = format!("http://{addr}/token");
    let provider = service_account(&token_uri);

    let token = provider.token().await.unwrap();
    assert_eq!(token.as_deref(), Some("ya29.minted-1"));

    let state = state.lock().unwrap();
    let form = &state.exchanges[0];
    assert_eq!(form["grant_type"], JWT_GRANT);

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[token_uri.as_str()]);
    validation.set_issuer(&[CLIENT_EMAIL]);
    let key = DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).unwrap();
    let claims = jsonwebtoken::decode::<Value>(&form["assertion"], &key, &validation)
        .unwrap()
        .claims;

    assert_eq!(claims["scope"], STORAGE_SCOPE);
    let lifetime = claims["exp"].as_i64().unwrap() - claims["iat"].as_i64().unwrap();
    assert_eq!(lifetime, 3600);
}

#[tokio::test]
async fn service_account_reuses_live_token() {
    let state = endpoint(3600);
    let addr = serve(state.clone()).await;
    let provider = service_account(&format!("http://{addr}/token"));

    let first = provider.token().await.unwrap();
    let second = provider.token().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(state.lock().unwrap().exchanges.len(), 1);
}

#[tokio::test]
async fn service_account_refreshes_expiring_token() {
    // Inside the refresh margin, so every call mints again.
    let state = endpoint(30);
    let addr = serve(state.clone()).await;
    let provider = service_account(&format!("http://{addr}/token"));

    assert_eq!(provider.token().await.unwrap().as_deref(), Some("ya29.minted-1"));
    assert_eq!(provider.token().await.unwrap().as_deref(), Some("ya29.minted-2"));
    assert_eq!(state.lock().unwrap().exchanges.len(), 2);
}

#[tokio::test]
async fn service_account_reports_rejected_exchange() {
    let state = endpoint(3600);
    let addr = serve(state).await;
    let provider = service_account(&format!("http://{addr}/missing"));

    let error = provider.token().await.unwrap_err();

    match error {
        TransferError::Auth(message) => assert!(message.contains("404"), "{message}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn metadata_server_sends_flavor_header() {
    let state = endpoint(3600);
    let addr = serve(state.clone()).await;
    let provider = MetadataServer::with_host(&format!("http://{addr}"), reqwest::Client::new());

    assert_eq!(provider.token().await.unwrap().as_deref(), Some("ya29.instance"));
    assert_eq!(provider.token().await.unwrap().as_deref(), Some("ya29.instance"));

    let state = state.lock().unwrap();
    assert_eq!(state.metadata_calls, vec![Some("Google".to_owned())]);
}

#[tokio::test]
async fn metadata_server_unreachable_is_auth_error() {
    // Bind and drop a listener so the port is closed.
    let addr = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();
    let provider = MetadataServer::with_host(&addr.to_string(), reqwest::Client::new());

    let error = provider.token().await.unwrap_err();

    match error {
        TransferError::Auth(message) => assert!(message.contains("--credentials"), "{message}"),
        other => panic!("unexpected error: {other}"),
    }
}
