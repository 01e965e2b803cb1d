//! Synchronization of adopted resources with the remote registry.
//!
//! Two remote entities are kept in line with the local spec: the cluster (one
//! per managed cluster) and the node (one per adopted resource). Whether the
//! cluster is registered or updated depends only on whether a cluster id is
//! recorded locally. Node registration is repeated every pass; the registry
//! deduplicates it, so no node id is kept locally.

use std::collections::BTreeMap;

use adopt_registry::{
    ClusterRegisterRequest, NodeRegisterRequest, RegistryClient, StatusUpdateRequest,
};
use tracing::info;

use crate::config::ReconcilerConfig;
use crate::endpoint::split_endpoint;
use crate::error::{Error, Result};
use crate::resource::{AdoptedResource, RegistrySpec};

const LOCATION_LABEL: &str = "location";
const UNKNOWN: &str = "unknown";

/// What a successful sync did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub cluster_id: String,
    /// True when this pass registered the cluster (and back-filled its id).
    pub cluster_registered: bool,
    pub node_id: String,
}

/// Create-or-update protocol against one registry endpoint.
pub struct SyncService {
    client: RegistryClient,
}

impl SyncService {
    pub fn new(client: RegistryClient) -> Self {
        Self { client }
    }

    /// Build a client for the resource's registry settings.
    pub fn connect(spec: &RegistrySpec, config: &ReconcilerConfig) -> Result<Self> {
        if spec.endpoint.is_empty() {
            return Err(Error::Config("registry endpoint is not set".to_string()));
        }
        let mut builder =
            RegistryClient::builder(spec.endpoint.as_str()).timeout(config.registry_timeout);
        if let Some(key) = &config.registry_api_key {
            builder = builder.api_key(key.as_str());
        }
        let client = builder
            .build()
            .map_err(|e| Error::registry("failed to create registry client", e))?;
        Ok(Self::new(client))
    }

    /// Register or update the cluster, then upsert the node.
    ///
    /// On first registration the returned cluster id is written into
    /// `resource.spec.registry.cluster_id`; persisting it is up to the caller.
    pub async fn sync(&self, resource: &mut AdoptedResource) -> Result<SyncReport> {
        let existing = match resource.registry() {
            Some(spec) => spec.cluster_id.clone().filter(|id| !id.is_empty()),
            None => {
                return Err(Error::Config(format!(
                    "registry integration not enabled for {}",
                    resource.name
                )))
            }
        };

        self.client
            .health_check()
            .await
            .map_err(|e| Error::registry("failed to connect to registry", e))?;

        let (cluster_id, cluster_registered) = match existing {
            Some(cluster_id) => {
                info!(resource = %resource.name, cluster_id = %cluster_id, "Updating cluster status in registry");
                self.client
                    .update_cluster_status(&cluster_id, &cluster_status_request(resource))
                    .await
                    .map_err(|e| Error::registry("failed to update cluster status", e))?;
                (cluster_id, false)
            }
            None => {
                let request = cluster_register_request(resource);
                info!(resource = %resource.name, cluster = %request.name, "Registering cluster with registry");
                let response = self
                    .client
                    .register_cluster(&request)
                    .await
                    .map_err(|e| Error::registry("failed to register cluster", e))?;
                if response.cluster_id.is_empty() {
                    return Err(Error::Sync(
                        "registry returned an empty cluster id".to_string(),
                    ));
                }
                info!(resource = %resource.name, cluster_id = %response.cluster_id, "Cluster registered");
                if let Some(spec) = resource.spec.registry.as_mut() {
                    spec.cluster_id = Some(response.cluster_id.clone());
                }
                (response.cluster_id, true)
            }
        };

        let node = self
            .client
            .register_node(&node_register_request(resource, &cluster_id))
            .await
            .map_err(|e| Error::registry("failed to register/update node", e))?;

        Ok(SyncReport {
            cluster_id,
            cluster_registered,
            node_id: node.node_id,
        })
    }

    /// Remove the resource from the registry.
    ///
    /// The registry has no deletion endpoints, so this only records intent;
    /// stale entries are left for the registry to expire.
    pub async fn unregister(&self, resource: &AdoptedResource) -> Result<()> {
        info!(
            resource = %resource.name,
            registry = %self.client.base_url(),
            "Unregistering from registry"
        );
        Ok(())
    }
}

/// Location label of the resource, `"unknown"` if unset.
pub fn location(resource: &AdoptedResource) -> &str {
    resource
        .spec
        .labels
        .get(LOCATION_LABEL)
        .map(String::as_str)
        .unwrap_or(UNKNOWN)
}

pub fn cluster_register_request(resource: &AdoptedResource) -> ClusterRegisterRequest {
    let (endpoint_ip, endpoint_port) = split_endpoint(&resource.spec.node.endpoint);
    ClusterRegisterRequest {
        name: resource
            .spec
            .registry
            .as_ref()
            .map(|r| r.cluster_name.clone())
            .unwrap_or_default(),
        location: location(resource).to_string(),
        endpoint_ip: endpoint_ip.to_string(),
        endpoint_port,
        talos_version: resource.spec.node.os_version.clone(),
        kubernetes_version: resource.spec.node.kubernetes_version.clone(),
        labels: resource.spec.labels.clone(),
        managed: true,
    }
}

pub fn cluster_status_request(resource: &AdoptedResource) -> StatusUpdateRequest {
    let status = &resource.status;
    let node = &resource.spec.node;

    let mut metadata = BTreeMap::new();
    metadata.insert(
        "talos_version".to_string(),
        node.os_version.clone().unwrap_or_default(),
    );
    metadata.insert(
        "kubernetes_version".to_string(),
        node.kubernetes_version.clone().unwrap_or_default(),
    );
    metadata.insert("node_type".to_string(), node.node_type.clone());

    StatusUpdateRequest {
        status: if status.connected { "active" } else { UNKNOWN }.to_string(),
        health: Some(
            status
                .health
                .as_ref()
                .map_or(UNKNOWN, |h| h.status.as_str())
                .to_string(),
        ),
        addresses: status.addresses.iter().map(|a| a.address.clone()).collect(),
        last_contact: status.last_contact_time,
        metadata,
    }
}

pub fn node_register_request(resource: &AdoptedResource, cluster_id: &str) -> NodeRegisterRequest {
    let node = &resource.spec.node;
    NodeRegisterRequest {
        cluster_id: cluster_id.to_string(),
        hostname: resource.hostname().to_string(),
        ip_address: split_endpoint(&node.endpoint).0.to_string(),
        node_type: node.node_type.clone(),
        talos_version: node.os_version.clone(),
        kubernetes_version: node.kubernetes_version.clone(),
        machine_config_path: None,
    }
}
