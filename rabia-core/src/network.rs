//! # Network and Topology Collaborators
//!
//! Narrow interfaces the engine consumes for message delivery and cluster
//! membership (§6). The engine never owns connection lifecycle; it only
//! calls through these traits.

use crate::messages::ProtocolMessage;
use crate::{NodeId, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Best-effort message delivery. The network need not preserve order or
/// guarantee delivery, but must preserve message integrity and sender
/// identity.
#[async_trait]
pub trait NetworkTransport: Send + Sync {
    /// Best-effort delivery to all known peers. Non-blocking; silent on
    /// per-peer failure.
    async fn broadcast(&self, message: ProtocolMessage) -> Result<()>;

    /// Best-effort point-to-point delivery. Non-blocking.
    async fn send(&self, target: NodeId, message: ProtocolMessage) -> Result<()>;

    /// Number of peers currently considered connected.
    async fn connected_node_count(&self) -> usize;

    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;
}

/// Cluster membership and the derived quorum sizes the protocol's pure
/// evaluation functions (§4.1) are parameterized on.
#[async_trait]
pub trait Topology: Send + Sync {
    /// This node's own identifier.
    fn self_id(&self) -> NodeId;

    /// Total number of configured cluster members, `n`.
    fn cluster_size(&self) -> usize;

    /// `q = floor(n / 2) + 1`, the ordinary majority threshold.
    fn quorum_size(&self) -> usize {
        self.cluster_size() / 2 + 1
    }

    /// `f + 1`, where `f = floor((n - 1) / 2)` is the number of tolerated
    /// faults.
    fn f_plus_one(&self) -> usize {
        let f = (self.cluster_size().saturating_sub(1)) / 2;
        f + 1
    }

    /// `n - f`, the super-majority threshold that enables the round-2 fast
    /// path.
    fn super_majority_size(&self) -> usize {
        self.cluster_size() - (self.cluster_size().saturating_sub(1)) / 2
    }

    /// Number of currently-active members required to proceed with
    /// synchronization (§4.10). Defaults to the ordinary quorum size.
    fn active_quorum_size(&self) -> usize {
        self.quorum_size()
    }

    /// Looks up a known member by id.
    fn get(&self, node_id: NodeId) -> Option<NodeId>;

    /// Resolves a transport-level address back to a cluster member, if
    /// known.
    fn reverse_lookup(&self, addr: &str) -> Option<NodeId>;

    fn ping_interval(&self) -> Duration;

    fn hello_timeout(&self) -> Duration;

    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;
}
