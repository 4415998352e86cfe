//! Mock repository endpoint shared by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;

use logship::sender::{HttpDeliveryClient, Record, RemoteSchema, Sender, SenderOptions, UserSchema};

#[derive(Debug, Default)]
pub struct MockState {
    pub schema: Option<RemoteSchema>,
    /// Answer schema lookups with 400.
    pub get_error: bool,
    /// Indices reported as rejected by the next data post.
    pub reject_next: Vec<usize>,
    /// Every data body, fields split on whitespace, sorted and rejoined.
    pub bodies: Vec<String>,
    /// Every posted line, in arrival order.
    pub lines: Vec<String>,
}

pub type Shared = Arc<Mutex<MockState>>;

async fn get_repo(State(state): State<Shared>, Path(_repo): Path<String>) -> Response {
    let state = state.lock().unwrap();
    if state.get_error {
        return (StatusCode::BAD_REQUEST, "mock repository error").into_response();
    }
    match &state.schema {
        Some(schema) => Json(schema.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, "repo not found").into_response(),
    }
}

async fn create_repo(
    State(state): State<Shared>,
    Path(_repo): Path<String>,
    Json(schema): Json<RemoteSchema>,
) -> StatusCode {
    state.lock().unwrap().schema = Some(schema);
    StatusCode::OK
}

async fn post_data(
    State(state): State<Shared>,
    Path(_repo): Path<String>,
    body: String,
) -> Response {
    let mut state = state.lock().unwrap();
    let mut fields: Vec<&str> = body.split_whitespace().collect();
    fields.sort_unstable();
    state.bodies.push(fields.join(" "));
    state.lines.extend(body.lines().map(str::to_string));

    let rejected = std::mem::take(&mut state.reject_next);
    if rejected.is_empty() {
        StatusCode::OK.into_response()
    } else {
        Json(json!({ "rejected": rejected })).into_response()
    }
}

/// Serve the mock on an ephemeral port and return its state and base URL.
pub async fn start_mock() -> (Shared, String) {
    let state = Shared::default();
    let app = Router::new()
        .route("/v2/repos/:repo", get(get_repo).post(create_repo))
        .route("/v2/repos/:repo/data", post(post_data))
        .with_state(Arc::clone(&state));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (state, format!("http://{addr}"))
}

pub fn sender(endpoint: &str, fields: &str, declaration: Option<&str>) -> Sender {
    let client = HttpDeliveryClient::new(
        endpoint,
        None,
        Duration::from_secs(2),
        Duration::from_secs(5),
    )
    .unwrap()
    .with_retries(0, Duration::from_millis(10));

    let mut options = SenderOptions::new("nb");
    options.user_schema = UserSchema::parse(fields);
    options.declaration = declaration.map(|d| RemoteSchema::parse_declaration(d).unwrap());
    Sender::new(options, Arc::new(client))
}

pub fn record(value: serde_json::Value) -> Record {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

pub fn last_body(state: &Shared) -> String {
    state.lock().unwrap().bodies.last().cloned().unwrap_or_default()
}
