//! In-process fake container runtime.
//!
//! Serves the subset of the runtime API the harness uses on a Unix socket
//! inside a temp dir, keeps container/image/network state in memory and
//! records every request so tests can assert on lifecycle guarantees.

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use ta_engine::EngineClient;
use ta_fixture::Config;
use tempfile::TempDir;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;

/// Host port reported for every published container port.
pub const FAKE_HOST_PORT: u16 = 49153;

/// How `/containers/{id}/wait` answers.
#[derive(Debug, Clone)]
pub enum WaitMode {
    Exit(i64),
    Hang,
    Error(String),
}

impl Default for WaitMode {
    fn default() -> Self {
        Self::Exit(0)
    }
}

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub name: Option<String>,
    pub image: String,
    pub binds: Vec<String>,
    pub labels: HashMap<String, String>,
    pub body: Value,
}

#[derive(Debug, Default)]
pub struct FakeState {
    /// `METHOD /path?query`, API version prefix stripped.
    pub calls: Vec<String>,
    pub images: Vec<String>,
    pub networks: Vec<String>,
    /// Answer network creation with a conflict, as if another caller won.
    pub network_race: bool,
    pub wait: WaitMode,
    pub fail_start: bool,
    pub pull_error: Option<String>,
    pub build_error: Option<String>,
    pub logs: String,
    pub containers: HashMap<String, FakeContainer>,
    /// Every container ever created, in order.
    pub created: Vec<FakeContainer>,
    pub removed: Vec<String>,
    next_id: u64,
}

type Shared = Arc<Mutex<FakeState>>;

/// A running fake runtime.
pub struct FakeEngine {
    state: Shared,
    socket: PathBuf,
    task: JoinHandle<()>,
    _dir: TempDir,
}

impl FakeEngine {
    /// Starts serving; must be called inside a tokio runtime.
    pub fn start() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let socket = dir.path().join("engine.sock");
        let listener = UnixListener::bind(&socket).expect("bind fake engine socket");

        let state = Shared::default();
        let app = router(Arc::clone(&state));
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake engine");
        });

        Self {
            state,
            socket,
            task,
            _dir: dir,
        }
    }

    pub fn socket(&self) -> &std::path::Path {
        &self.socket
    }

    pub fn client(&self) -> Arc<EngineClient> {
        Arc::new(EngineClient::new(&self.socket))
    }

    /// Returns a configuration pointing at this engine with sandboxes under
    /// `temp_root`.
    pub fn config(&self, temp_root: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.engine.socket = Some(self.socket.clone());
        config.sandbox.temp_root = Some(temp_root.to_path_buf());
        config
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    /// Counts recorded requests starting with `prefix`, e.g. `POST /build`.
    pub fn count(&self, prefix: &str) -> usize {
        self.with(|s| s.calls.iter().filter(|c| c.starts_with(prefix)).count())
    }

    pub fn live_containers(&self) -> usize {
        self.with(|s| s.containers.len())
    }
}

impl Drop for FakeEngine {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/v1.43/_ping", get(|| async { "OK" }))
        .route("/v1.43/images/json", get(image_list))
        .route("/v1.43/images/create", post(image_pull))
        .route("/v1.43/build", post(image_build))
        .route("/v1.43/networks", get(network_list))
        .route("/v1.43/networks/create", post(network_create))
        .route("/v1.43/containers/json", get(container_list))
        .route("/v1.43/containers/create", post(container_create))
        .route("/v1.43/containers/{id}/start", post(container_start))
        .route("/v1.43/containers/{id}/wait", post(container_wait))
        .route("/v1.43/containers/{id}/logs", get(container_logs))
        .route("/v1.43/containers/{id}/json", get(container_inspect))
        .route("/v1.43/containers/{id}", delete(container_remove))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), record))
        .with_state(state)
}

async fn record(State(state): State<Shared>, request: Request, next: Next) -> Response {
    let target = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str().trim_start_matches("/v1.43").to_string())
        .unwrap_or_default();
    state
        .lock()
        .unwrap()
        .calls
        .push(format!("{} {target}", request.method()));
    next.run(request).await
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

fn progress(lines: &[Value]) -> Response {
    let body: String = lines.iter().map(|l| format!("{l}\r\n")).collect();
    ([("content-type", "application/json")], body).into_response()
}

async fn image_list(State(state): State<Shared>) -> Json<Value> {
    let state = state.lock().unwrap();
    let images: Vec<Value> = state
        .images
        .iter()
        .enumerate()
        .map(|(i, tag)| json!({ "Id": format!("sha256:{i:064}"), "RepoTags": [tag] }))
        .collect();
    Json(Value::Array(images))
}

async fn image_pull(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().unwrap();
    let image = query.get("fromImage").cloned().unwrap_or_default();
    let tag = query.get("tag").cloned().unwrap_or_else(|| "latest".to_string());

    if let Some(message) = state.pull_error.clone() {
        return progress(&[
            json!({ "status": format!("Pulling from {image}") }),
            json!({ "errorDetail": { "message": message }, "error": message }),
        ]);
    }

    state.images.push(format!("{image}:{tag}"));
    progress(&[
        json!({ "status": format!("Pulling from {image}"), "id": tag }),
        json!({ "status": format!("Status: Downloaded newer image for {image}:{tag}") }),
    ])
}

async fn image_build(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let mut state = state.lock().unwrap();
    if body.is_empty() {
        return error(StatusCode::BAD_REQUEST, "empty build context");
    }

    if let Some(message) = state.build_error.clone() {
        return progress(&[
            json!({ "stream": "Step 1/2 : FROM scratch\n" }),
            json!({ "errorDetail": { "message": message }, "error": message }),
        ]);
    }

    if let Some(tag) = query.get("t") {
        state.images.push(tag.clone());
    }
    progress(&[
        json!({ "stream": "Step 1/1 : FROM scratch\n" }),
        json!({ "aux": { "ID": "sha256:feedface" } }),
        json!({ "stream": "Successfully built feedface\n" }),
    ])
}

async fn network_list(State(state): State<Shared>) -> Json<Value> {
    let state = state.lock().unwrap();
    let networks: Vec<Value> = state
        .networks
        .iter()
        .enumerate()
        .map(|(i, name)| json!({ "Id": format!("net-{i}"), "Name": name, "Driver": "bridge" }))
        .collect();
    Json(Value::Array(networks))
}

async fn network_create(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut state = state.lock().unwrap();
    let name = body["Name"].as_str().unwrap_or_default().to_string();

    if state.network_race {
        state.networks.push(name.clone());
        return error(StatusCode::CONFLICT, &format!("network with name {name} already exists"));
    }
    if state.networks.contains(&name) {
        return error(StatusCode::CONFLICT, &format!("network with name {name} already exists"));
    }

    state.networks.push(name);
    let id = format!("net-{}", state.networks.len() - 1);
    (StatusCode::CREATED, Json(json!({ "Id": id, "Warning": "" }))).into_response()
}

async fn container_list(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let state = state.lock().unwrap();
    let wanted: Vec<String> = query
        .get("filters")
        .and_then(|f| serde_json::from_str::<HashMap<String, Vec<String>>>(f).ok())
        .and_then(|mut f| f.remove("label"))
        .unwrap_or_default();

    let containers: Vec<Value> = state
        .containers
        .iter()
        .filter(|(_, c)| {
            wanted.iter().all(|w| match w.split_once('=') {
                Some((k, v)) => c.labels.get(k).is_some_and(|x| x == v),
                None => c.labels.contains_key(w),
            })
        })
        .map(|(id, c)| {
            json!({
                "Id": id,
                "Names": c.name.iter().map(|n| format!("/{n}")).collect::<Vec<_>>(),
                "Image": c.image,
                "State": "exited",
                "Labels": c.labels,
            })
        })
        .collect();
    Json(Value::Array(containers))
}

async fn container_create(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().unwrap();
    let name = query.get("name").cloned();

    if let Some(name) = &name {
        if state.containers.values().any(|c| c.name.as_ref() == Some(name)) {
            return error(
                StatusCode::CONFLICT,
                &format!("Conflict. The container name \"/{name}\" is already in use"),
            );
        }
    }

    state.next_id += 1;
    let id = format!("{:012x}", state.next_id);
    let strings = |v: &Value| -> Vec<String> {
        v.as_array()
            .map(|a| a.iter().filter_map(|s| s.as_str().map(String::from)).collect())
            .unwrap_or_default()
    };
    let container = FakeContainer {
        name,
        image: body["Image"].as_str().unwrap_or_default().to_string(),
        binds: strings(&body["HostConfig"]["Binds"]),
        labels: serde_json::from_value(body["Labels"].clone()).unwrap_or_default(),
        body,
    };
    state.created.push(container.clone());
    state.containers.insert(id.clone(), container);

    (StatusCode::CREATED, Json(json!({ "Id": id, "Warnings": [] }))).into_response()
}

async fn container_start(State(state): State<Shared>, Path(id): Path<String>) -> Response {
    let state = state.lock().unwrap();
    if !state.containers.contains_key(&id) {
        return error(StatusCode::NOT_FOUND, &format!("No such container: {id}"));
    }
    if state.fail_start {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "cannot start container: bind source missing");
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn container_wait(State(state): State<Shared>, Path(id): Path<String>) -> Response {
    let mode = {
        let state = state.lock().unwrap();
        if !state.containers.contains_key(&id) {
            return error(StatusCode::NOT_FOUND, &format!("No such container: {id}"));
        }
        state.wait.clone()
    };

    match mode {
        WaitMode::Exit(code) => Json(json!({ "StatusCode": code })).into_response(),
        WaitMode::Error(message) => {
            Json(json!({ "StatusCode": -1, "Error": { "Message": message } })).into_response()
        }
        WaitMode::Hang => std::future::pending().await,
    }
}

async fn container_logs(State(state): State<Shared>, Path(id): Path<String>) -> Response {
    let state = state.lock().unwrap();
    if !state.containers.contains_key(&id) {
        return error(StatusCode::NOT_FOUND, &format!("No such container: {id}"));
    }
    state.logs.clone().into_response()
}

async fn container_inspect(State(state): State<Shared>, Path(id): Path<String>) -> Response {
    let state = state.lock().unwrap();
    let Some(container) = state.containers.get(&id) else {
        return error(StatusCode::NOT_FOUND, &format!("No such container: {id}"));
    };

    let ports: HashMap<String, Value> = container.body["ExposedPorts"]
        .as_object()
        .map(|ports| {
            ports
                .keys()
                .map(|p| {
                    let binding = json!([{ "HostIp": "127.0.0.1", "HostPort": FAKE_HOST_PORT.to_string() }]);
                    (p.clone(), binding)
                })
                .collect()
        })
        .unwrap_or_default();

    Json(json!({
        "Id": id,
        "Name": container.name.as_ref().map(|n| format!("/{n}")).unwrap_or_default(),
        "State": { "Status": "running", "Running": true, "ExitCode": 0 },
        "HostConfig": { "Binds": container.binds },
        "NetworkSettings": { "Ports": ports },
    }))
    .into_response()
}

async fn container_remove(State(state): State<Shared>, Path(id): Path<String>) -> Response {
    let mut state = state.lock().unwrap();
    if state.containers.remove(&id).is_none() {
        return error(StatusCode::NOT_FOUND, &format!("No such container: {id}"));
    }
    state.removed.push(id);
    StatusCode::NO_CONTENT.into_response()
}
