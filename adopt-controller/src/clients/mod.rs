//! Integrations with the managed node.
//!
//! - node: connectivity probe, node facts, health
//! - link: link monitoring setup and teardown

pub mod link;
pub mod node;

pub use link::{LinkManager, StaticLinkManager};
pub use node::{NodeAgent, NodeFacts, TcpNodeAgent};
