//! # Deterministic In-Memory Network
//!
//! A `NetworkTransport` double that delivers messages synchronously and
//! immediately, with no induced latency, reordering, or loss. Used to drive
//! the deterministic seed scenarios (S1-S6) where test assertions depend on
//! a predictable message order.

use async_trait::async_trait;
use dashmap::DashMap;
use rabia_core::messages::ProtocolMessage;
use rabia_core::network::NetworkTransport;
use rabia_core::{NodeId, Result};
use rabia_engine::EngineHandle;
use std::sync::Arc;

/// Shared registry of engine handles that a cluster of [`InMemoryNetwork`]s
/// deliver through. Registering a node makes it a broadcast/send target for
/// every other registered node; unregistering simulates the node vanishing
/// from the network (messages to it are silently dropped, matching the
/// best-effort contract in §6).
#[derive(Clone, Default)]
pub struct InMemoryBus {
    handles: Arc<DashMap<NodeId, EngineHandle>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, node_id: NodeId, handle: EngineHandle) {
        self.handles.insert(node_id, handle);
    }

    pub fn unregister(&self, node_id: NodeId) {
        self.handles.remove(&node_id);
    }

    pub fn node_count(&self) -> usize {
        self.handles.len()
    }

    fn deliver(&self, target: NodeId, message: ProtocolMessage) {
        if let Some(handle) = self.handles.get(&target) {
            // The target may have shut down between the bus lookup and the
            // send; that's just another dropped message to a best-effort
            // transport, not an error worth propagating.
            let _ = handle.deliver(message);
        }
    }
}

/// Per-node [`NetworkTransport`] over a shared [`InMemoryBus`].
pub struct InMemoryNetwork {
    node_id: NodeId,
    bus: InMemoryBus,
}

impl InMemoryNetwork {
    pub fn new(node_id: NodeId, bus: InMemoryBus) -> Self {
        Self { node_id, bus }
    }
}

#[async_trait]
impl NetworkTransport for InMemoryNetwork {
    async fn broadcast(&self, message: ProtocolMessage) -> Result<()> {
        for entry in self.bus.handles.iter() {
            let target = *entry.key();
            if target == self.node_id {
                continue;
            }
            self.bus.deliver(target, message.clone());
        }
        Ok(())
    }

    async fn send(&self, target: NodeId, message: ProtocolMessage) -> Result<()> {
        self.bus.deliver(target, message);
        Ok(())
    }

    async fn connected_node_count(&self) -> usize {
        self.bus.node_count().saturating_sub(1)
    }

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rabia_core::messages::{MessageBody, SyncRequestMessage};

    #[tokio::test]
    async fn broadcast_with_no_peers_registered_is_a_harmless_noop() {
        let bus = InMemoryBus::new();
        let a = NodeId::from(1u32);
        let network = InMemoryNetwork::new(a, bus);
        let message = ProtocolMessage::new(a, MessageBody::SyncRequest(SyncRequestMessage));
        assert!(network.broadcast(message).await.is_ok());
        assert_eq!(network.connected_node_count().await, 0);
    }

    #[test]
    fn unregister_removes_a_node_from_the_bus() {
        let bus = InMemoryBus::new();
        assert_eq!(bus.node_count(), 0);
        bus.unregister(NodeId::from(7u32));
        assert_eq!(bus.node_count(), 0);
    }
}
