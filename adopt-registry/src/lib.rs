//! adopt-registry: client library for the remote cluster/node registry.
//!
//! The registry is the system of record for clusters and nodes. This crate
//! wraps its JSON-over-HTTP API and nothing more: no retries, no caching.
//!
//! # Example
//! ```ignore
//! use adopt_registry::{ClusterRegisterRequest, RegistryClient};
//!
//! let client = RegistryClient::builder("https://registry.example.com")
//!     .api_key("secret")
//!     .build()?;
//! client.health_check().await?;
//! let cluster = client.register_cluster(&request).await?;
//! ```

mod client;
pub mod error;
pub mod types;

pub use client::{RegistryClient, RegistryClientBuilder, DEFAULT_TIMEOUT};
pub use error::{RegistryError, Result};
pub use types::{
    ClusterInfoResponse, ClusterRegisterRequest, ClusterRegisterResponse, ErrorResponse,
    HealthCheckResponse, NodeInfoResponse, NodeRegisterRequest, NodeRegisterResponse,
    StatusUpdateRequest, StatusUpdateResponse,
};
