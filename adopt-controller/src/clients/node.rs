//! Node agent seam and a TCP-based implementation.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
#[cfg(test)]
use mockall::automock;
use tokio::net::TcpStream;
use tracing::debug;

use crate::endpoint::split_endpoint;
use crate::error::{Error, Result};
use crate::resource::{AddressKind, HealthSnapshot, HealthState, NodeAddress, NodeEndpoint, NodeInfo};

/// Facts gathered from a node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeFacts {
    pub info: NodeInfo,
    pub addresses: Vec<NodeAddress>,
}

/// Talks to the managed node.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NodeAgent: Send + Sync {
    /// Check whether the node API answers.
    ///
    /// `Ok(false)` means the node is unreachable; `Err` means the check
    /// itself could not be carried out.
    async fn probe(&self, node: &NodeEndpoint) -> Result<bool>;

    /// Collect system facts about the node.
    async fn gather_info(&self, node: &NodeEndpoint) -> Result<NodeFacts>;

    /// Run a health check against the node.
    async fn health_check(&self, node: &NodeEndpoint) -> Result<HealthSnapshot>;
}

/// Node agent that treats a TCP handshake with the node API as contact.
#[derive(Debug, Clone)]
pub struct TcpNodeAgent {
    connect_timeout: Duration,
}

impl TcpNodeAgent {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn resolve(&self, node: &NodeEndpoint) -> Result<Vec<SocketAddr>> {
        let (host, port) = split_endpoint(&node.endpoint);
        if host.is_empty() {
            return Err(Error::Config(format!(
                "endpoint {:?} has no host",
                node.endpoint
            )));
        }
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| Error::Node(format!("failed to resolve {}: {}", host, e)))?
            .collect();
        if addrs.is_empty() {
            return Err(Error::Node(format!("{} resolved to no addresses", host)));
        }
        Ok(addrs)
    }

    /// First address that accepts a connection, if any.
    async fn connect_any(&self, addrs: &[SocketAddr]) -> Option<SocketAddr> {
        for addr in addrs {
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(_)) => return Some(*addr),
                Ok(Err(e)) => debug!(addr = %addr, error = %e, "Connect failed"),
                Err(_) => debug!(addr = %addr, "Connect timed out"),
            }
        }
        None
    }
}

impl Default for TcpNodeAgent {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl NodeAgent for TcpNodeAgent {
    async fn probe(&self, node: &NodeEndpoint) -> Result<bool> {
        let addrs = self.resolve(node).await?;
        Ok(self.connect_any(&addrs).await.is_some())
    }

    async fn gather_info(&self, node: &NodeEndpoint) -> Result<NodeFacts> {
        let addrs = self.resolve(node).await?;
        let mut addresses: Vec<NodeAddress> = Vec::new();
        for addr in addrs {
            let ip = addr.ip().to_string();
            if !addresses.iter().any(|a| a.address == ip) {
                addresses.push(NodeAddress {
                    kind: AddressKind::InternalIP,
                    address: ip,
                });
            }
        }
        if let Some(hostname) = node.hostname.as_deref().filter(|h| !h.is_empty()) {
            addresses.push(NodeAddress {
                kind: AddressKind::Hostname,
                address: hostname.to_string(),
            });
        }

        Ok(NodeFacts {
            info: NodeInfo {
                operating_system: "talos".to_string(),
                ..Default::default()
            },
            addresses,
        })
    }

    async fn health_check(&self, node: &NodeEndpoint) -> Result<HealthSnapshot> {
        let addrs = self.resolve(node).await?;
        let snapshot = match self.connect_any(&addrs).await {
            Some(addr) => HealthSnapshot {
                status: HealthState::Healthy,
                message: format!("node API at {} answered", addr),
                last_check_time: Utc::now(),
            },
            None => HealthSnapshot {
                status: HealthState::Unhealthy,
                message: "node API did not answer".to_string(),
                last_check_time: Utc::now(),
            },
        };
        Ok(snapshot)
    }
}
