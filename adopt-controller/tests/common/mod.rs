//! Shared test utilities for adopt-controller integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use adopt_controller::clients::{NodeAgent, NodeFacts, StaticLinkManager};
use adopt_controller::events::MemoryEventSink;
use adopt_controller::resource::{
    AddressKind, AdoptedSpec, HealthSnapshot, HealthState, NodeAddress, NodeEndpoint, NodeInfo,
    RegistrySpec,
};
use adopt_controller::{AdoptionReconciler, MemoryStore, ReconcilerConfig, Result};
use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Cluster id handed out by the mock registry.
pub const CLUSTER_ID: &str = "c-1";

/// A request as seen by the mock registry.
#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub api_key: Option<String>,
    pub body: Value,
}

#[derive(Clone, Default)]
struct RegistryState {
    calls: Arc<Mutex<Vec<Call>>>,
    overloaded: Arc<AtomicBool>,
}

impl RegistryState {
    fn record(&self, method: Method, path: String, headers: &HeaderMap, body: &str) {
        let api_key = headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = serde_json::from_str(body).unwrap_or(Value::Null);
        self.calls.lock().unwrap().push(Call {
            method,
            path,
            api_key,
            body,
        });
    }

    fn overloaded(&self) -> Option<Response> {
        self.overloaded.load(Ordering::SeqCst).then(|| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"detail": "overloaded"})),
            )
                .into_response()
        })
    }
}

/// In-process registry that records every request.
pub struct MockRegistry {
    pub addr: SocketAddr,
    state: RegistryState,
}

impl MockRegistry {
    pub async fn spawn() -> Self {
        let state = RegistryState::default();
        let router = Router::new()
            .route(
                "/health",
                get(|State(s): State<RegistryState>, headers: HeaderMap| async move {
                    s.record(Method::GET, "/health".into(), &headers, "");
                    Json(json!({"status": "ok", "app_name": "registry", "version": "1.0.0"}))
                }),
            )
            .route(
                "/api/v1/clusters",
                post(
                    |State(s): State<RegistryState>, headers: HeaderMap, body: String| async move {
                        s.record(Method::POST, "/api/v1/clusters".into(), &headers, &body);
                        if let Some(response) = s.overloaded() {
                            return response;
                        }
                        (
                            StatusCode::CREATED,
                            Json(json!({"cluster_id": CLUSTER_ID, "status": "pending"})),
                        )
                            .into_response()
                    },
                ),
            )
            .route(
                "/api/v1/clusters/{id}/status",
                patch(
                    |State(s): State<RegistryState>,
                     Path(id): Path<String>,
                     headers: HeaderMap,
                     body: String| async move {
                        let path = format!("/api/v1/clusters/{}/status", id);
                        s.record(Method::PATCH, path, &headers, &body);
                        if let Some(response) = s.overloaded() {
                            return response;
                        }
                        Json(json!({"success": true})).into_response()
                    },
                ),
            )
            .route(
                "/api/v1/nodes",
                post(
                    |State(s): State<RegistryState>, headers: HeaderMap, body: String| async move {
                        s.record(Method::POST, "/api/v1/nodes".into(), &headers, &body);
                        let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
                        Json(json!({
                            "node_id": format!("n-{}", parsed["hostname"].as_str().unwrap_or("x")),
                            "cluster_id": parsed["cluster_id"],
                            "status": "registered",
                        }))
                    },
                ),
            )
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Server error");
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Answer cluster registration and status updates with 503.
    pub fn set_overloaded(&self, overloaded: bool) {
        self.state.overloaded.store(overloaded, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.calls.lock().unwrap().clone()
    }

    /// `METHOD path` of every call, in order.
    pub fn routes(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| format!("{} {}", c.method, c.path))
            .collect()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }

    pub fn clear(&self) {
        self.state.calls.lock().unwrap().clear();
    }
}

/// Node agent with a fixed answer for every call.
pub struct StaticNode {
    pub reachable: bool,
}

#[async_trait]
impl NodeAgent for StaticNode {
    async fn probe(&self, _node: &NodeEndpoint) -> Result<bool> {
        Ok(self.reachable)
    }

    async fn gather_info(&self, node: &NodeEndpoint) -> Result<NodeFacts> {
        let (host, _) = adopt_controller::endpoint::split_endpoint(&node.endpoint);
        Ok(NodeFacts {
            info: NodeInfo {
                architecture: "amd64".to_string(),
                operating_system: "talos".to_string(),
                ..Default::default()
            },
            addresses: vec![NodeAddress {
                kind: AddressKind::InternalIP,
                address: host.to_string(),
            }],
        })
    }

    async fn health_check(&self, _node: &NodeEndpoint) -> Result<HealthSnapshot> {
        Ok(HealthSnapshot {
            status: HealthState::Healthy,
            message: "all services running".to_string(),
            last_check_time: Utc::now(),
        })
    }
}

/// Accepted spec with registry sync pointed at `registry`.
pub fn registry_spec(registry: &str) -> AdoptedSpec {
    AdoptedSpec {
        node: NodeEndpoint {
            endpoint: "10.0.0.5:6443".to_string(),
            os_version: Some("v1.7.0".to_string()),
            kubernetes_version: Some("v1.30.0".to_string()),
            node_type: "controlplane".to_string(),
            hostname: Some("cp-1".to_string()),
        },
        registry: Some(RegistrySpec {
            enabled: true,
            endpoint: registry.to_string(),
            cluster_name: "prod".to_string(),
            cluster_id: None,
        }),
        accepted: true,
        ..Default::default()
    }
}

pub fn test_config() -> ReconcilerConfig {
    ReconcilerConfig {
        step_timeout: Duration::from_secs(5),
        registry_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

pub struct Harness {
    pub reconciler: AdoptionReconciler,
    pub store: Arc<MemoryStore>,
    pub events: Arc<MemoryEventSink>,
}

impl Harness {
    pub fn new(node: impl NodeAgent + 'static, config: ReconcilerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(MemoryEventSink::new());
        let reconciler = AdoptionReconciler::new(
            store.clone(),
            Arc::new(node),
            Arc::new(StaticLinkManager),
            events.clone(),
            config,
        );
        Self {
            reconciler,
            store,
            events,
        }
    }
}
