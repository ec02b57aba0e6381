//! In-process mock nodes for exercising the full client stack
//!
//! Each `MockNode` is an axum server on an ephemeral port implementing the
//! node wire protocol: authenticated create/read/delete over partial
//! records, stored in memory per schema with overwrite-by-identifier
//! semantics. Nodes verify the caller's bearer credentials (EdDSA signature,
//! audience = their own identity) exactly like real nodes do, can be told to
//! fail writes, and can be shut down to simulate an unreachable node.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use url::Url;

use crate::auth::Claims;
use crate::config::{Config, NodeDescriptor};
use common::crypto::{PublicKey, SecretKey};

type Store = Arc<Mutex<HashMap<String, Vec<Value>>>>;

#[derive(Clone)]
struct NodeState {
    node_id: String,
    issuer: String,
    decoding: DecodingKey,
    store: Store,
    fail_writes: Arc<AtomicBool>,
}

/// One in-process storage node
pub struct MockNode {
    id: String,
    url: Url,
    store: Store,
    fail_writes: Arc<AtomicBool>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockNode {
    /// Start a node that accepts credentials signed by `caller_key` with
    /// issuer `caller_id` and audience equal to this node's `id`
    pub async fn spawn(
        id: impl Into<String>,
        caller_id: impl Into<String>,
        caller_key: &PublicKey,
    ) -> Self {
        let id = id.into();
        let store: Store = Store::default();
        let fail_writes = Arc::new(AtomicBool::new(false));
        let state = NodeState {
            node_id: id.clone(),
            issuer: caller_id.into(),
            decoding: DecodingKey::from_ed_der(&caller_key.to_bytes()),
            store: store.clone(),
            fail_writes: fail_writes.clone(),
        };

        let router = Router::new()
            .route("/api/v1/data/create", post(create))
            .route("/api/v1/data/read", post(read))
            .route("/api/v1/data/delete", post(delete))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock node");
        let addr = listener.local_addr().expect("mock node addr");
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await
                .expect("mock node serve");
        });

        tracing::debug!("mock node {} listening on {}", id, addr);

        MockNode {
            id,
            url: Url::parse(&format!("http://{}", addr)).expect("mock node url"),
            store,
            fail_writes,
            shutdown: Some(tx),
            handle,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor {
            id: self.id.clone(),
            url: self.url.clone(),
        }
    }

    /// Raw partial records currently stored under a schema
    pub fn stored(&self, schema: &str) -> Vec<Value> {
        self.store.lock().get(schema).cloned().unwrap_or_default()
    }

    /// Make every subsequent write request fail with a 500
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Stop the server; subsequent calls against this node see connection
    /// errors, as if the node were down
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.handle).await;
    }
}

/// A full set of mock nodes plus a matching client configuration
pub struct MockCluster {
    pub nodes: Vec<MockNode>,
    pub config: Config,
}

impl MockCluster {
    /// Spawn `n` nodes sharing one caller identity and signing key
    pub async fn spawn(n: usize) -> Self {
        let signing_key = SecretKey::generate();
        let caller_id = "did:splitvault:test-caller";
        let public = signing_key.public();

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            nodes.push(MockNode::spawn(format!("node-{}", i), caller_id, &public).await);
        }

        let config = Config {
            caller_id: caller_id.to_string(),
            signing_key,
            nodes: nodes.iter().map(|node| node.descriptor()).collect(),
            collections: HashMap::new(),
            request_timeout_secs: 5,
            token_ttl_secs: 3600,
            cleanup_partial_writes: false,
        };

        MockCluster { nodes, config }
    }

    /// Register a collection to schema mapping on the client side
    pub fn with_collection(mut self, name: &str, schema: &str) -> Self {
        self.config
            .collections
            .insert(name.to_string(), schema.to_string());
        self
    }
}

fn authorize(state: &NodeState, headers: &HeaderMap) -> Result<(), Response> {
    let token = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    let Some(token) = token else {
        return Err(unauthorized("missing bearer token"));
    };

    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.set_audience(&[&state.node_id]);
    validation.set_issuer(&[&state.issuer]);
    validation.set_required_spec_claims(&["exp", "aud", "iss"]);

    if let Err(e) = decode::<Claims>(token, &state.decoding, &validation) {
        return Err(unauthorized(&e.to_string()));
    }
    Ok(())
}

fn unauthorized(reason: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": reason })),
    )
        .into_response()
}

fn matches_filter(record: &Value, filter: &Value) -> bool {
    let Some(criteria) = filter.as_object() else {
        return true;
    };
    criteria
        .iter()
        .all(|(key, expected)| record.get(key) == Some(expected))
}

#[derive(Deserialize)]
struct CreateBody {
    schema: String,
    data: Vec<Value>,
}

async fn create(
    State(state): State<NodeState>,
    headers: HeaderMap,
    Json(body): Json<CreateBody>,
) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }
    if state.fail_writes.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "induced write failure" })),
        )
            .into_response();
    }

    let mut store = state.store.lock();
    let records = store.entry(body.schema).or_default();
    for incoming in body.data {
        // overwrite semantics: a rewrite under the same _id replaces this
        // node's copy
        if let Some(id) = incoming.get("_id").cloned() {
            records.retain(|existing| existing.get("_id") != Some(&id));
        }
        records.push(incoming);
    }

    (StatusCode::CREATED, Json(json!({ "created": true }))).into_response()
}

#[derive(Deserialize)]
struct QueryBody {
    schema: String,
    filter: Value,
}

async fn read(
    State(state): State<NodeState>,
    headers: HeaderMap,
    Json(body): Json<QueryBody>,
) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    let store = state.store.lock();
    let matches: Vec<Value> = store
        .get(&body.schema)
        .map(|records| {
            records
                .iter()
                .filter(|record| matches_filter(record, &body.filter))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    (StatusCode::OK, Json(json!({ "data": matches }))).into_response()
}

async fn delete(
    State(state): State<NodeState>,
    headers: HeaderMap,
    Json(body): Json<QueryBody>,
) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    let mut store = state.store.lock();
    let records = store.entry(body.schema).or_default();
    let before = records.len();
    records.retain(|record| !matches_filter(record, &body.filter));
    let deleted = (before - records.len()) as u64;

    (StatusCode::OK, Json(json!({ "deleted": deleted }))).into_response()
}
