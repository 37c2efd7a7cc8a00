#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::AUTHORIZATION;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use comfygate_api::config::{ComfyUIConfig, ServerConfig};
use comfygate_api::router::build_app_router;
use comfygate_api::state::AppState;
use comfygate_comfyui::generator::{GenerationError, ImageBackend};
use comfygate_core::credentials::Credentials;
use comfygate_core::workflow::{NodeTargets, WorkflowTemplate};

pub const USERNAME: &str = "tester";
pub const PASSWORD: &str = "correct horse";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        credentials: Credentials::new(USERNAME, PASSWORD),
        password_generated: false,
        workflow_path: PathBuf::from("workflow_demo.json"),
        node_targets: NodeTargets::default(),
        comfyui: ComfyUIConfig {
            url: "http://127.0.0.1:1".to_string(),
            client_id: "comfyui".to_string(),
            completion_timeout_secs: 5,
            http_timeout_secs: 5,
        },
    }
}

/// A trimmed-down text-to-image workflow in ComfyUI API format.
pub fn sample_workflow() -> Value {
    json!({
        "3": {
            "class_type": "KSampler",
            "inputs": { "seed": 8566257, "steps": 20, "model": ["4", 0] }
        },
        "4": {
            "class_type": "CheckpointLoaderSimple",
            "inputs": { "ckpt_name": "v1-5-pruned-emaonly.safetensors" }
        },
        "6": {
            "class_type": "CLIPTextEncode",
            "inputs": { "text": "masterpiece best quality girl", "clip": ["4", 1] }
        },
        "7": {
            "class_type": "CLIPTextEncode",
            "inputs": { "text": "bad hands", "clip": ["4", 1] }
        },
        "9": {
            "class_type": "SaveImage",
            "inputs": { "filename_prefix": "ComfyUI", "images": ["8", 0] }
        }
    })
}

// ---------------------------------------------------------------------------
// Stub backend
// ---------------------------------------------------------------------------

/// What the stub does when asked to generate.
pub enum Behaviour {
    /// Return these images as-is.
    Images(Vec<Vec<u8>>),
    /// Sleep briefly, then return one image holding `"<positive>|<seed>"`
    /// read back from the submitted workflow.
    Echo,
    /// Fail with the error built by this function.
    Fail(fn() -> GenerationError),
    /// Block until cancelled, then fail with `WaitError::Cancelled`.
    WaitForCancel,
}

pub struct StubBackend {
    behaviour: Behaviour,
    healthy: bool,
    calls: AtomicUsize,
    submitted: Mutex<Vec<Value>>,
}

impl StubBackend {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            healthy: true,
            calls: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Workflows received so far, in call order.
    pub fn submitted(&self) -> Vec<Value> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageBackend for StubBackend {
    async fn generate(
        &self,
        workflow: Value,
        cancel: CancellationToken,
    ) -> Result<Vec<Vec<u8>>, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().unwrap().push(workflow.clone());

        match &self.behaviour {
            Behaviour::Images(images) => Ok(images.clone()),
            Behaviour::Echo => {
                tokio::time::sleep(Duration::from_millis(20)).await;
                let positive = workflow["6"]["inputs"]["text"].as_str().unwrap_or_default();
                let seed = &workflow["3"]["inputs"]["seed"];
                Ok(vec![format!("{positive}|{seed}").into_bytes()])
            }
            Behaviour::Fail(make) => Err(make()),
            Behaviour::WaitForCancel => {
                cancel.cancelled().await;
                Err(GenerationError::Wait(
                    comfygate_comfyui::waiter::WaitError::Cancelled,
                ))
            }
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub backend: Arc<StubBackend>,
    pub workflow: Arc<WorkflowTemplate>,
    pub shutdown: CancellationToken,
}

/// Build the full application router around the given stub.
///
/// Uses the same `build_app_router` as `main.rs`, so the whole middleware
/// stack (CORS, request ID, timeout, tracing, panic recovery) is exercised.
pub fn build_test_app(backend: StubBackend) -> TestApp {
    let config = test_config();
    let workflow = Arc::new(
        WorkflowTemplate::from_value(sample_workflow(), &config.node_targets)
            .expect("sample workflow is valid"),
    );
    let backend = Arc::new(backend);
    let shutdown = CancellationToken::new();

    let state = AppState {
        config: Arc::new(config.clone()),
        workflow: Arc::clone(&workflow),
        backend: backend.clone(),
        shutdown: shutdown.clone(),
    };

    TestApp {
        router: build_app_router(state, &config),
        backend,
        workflow,
        shutdown,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{username}:{password}")))
}

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST with no credentials at all.
pub async fn post_anonymous(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST with the given raw `Authorization` header value.
pub async fn post_with_auth(app: Router, uri: &str, authorization: &str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(AUTHORIZATION, authorization)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST with the configured test credentials.
pub async fn post_authed(app: Router, uri: &str) -> Response {
    post_with_auth(app, uri, &basic_auth(USERNAME, PASSWORD)).await
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Decode the `images` array of a successful `/generate` response.
pub fn decode_images(json: &Value) -> Vec<Vec<u8>> {
    json["images"]
        .as_array()
        .expect("images array")
        .iter()
        .map(|s| BASE64.decode(s.as_str().unwrap()).unwrap())
        .collect()
}
