//! # Fixed-Membership Topology Double
//!
//! A `Topology` (§6) over a membership set known up front and never
//! changed for the lifetime of the test. Quorum, super-majority, and
//! `f + 1` all come from the trait's default derivations over
//! `cluster_size()`, exactly as a real topology manager would compute them.

use async_trait::async_trait;
use rabia_core::network::Topology;
use rabia_core::{NodeId, Result};
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FixedTopology {
    self_id: NodeId,
    members: BTreeSet<NodeId>,
}

impl FixedTopology {
    pub fn new(self_id: NodeId, members: impl IntoIterator<Item = NodeId>) -> Self {
        let mut members: BTreeSet<NodeId> = members.into_iter().collect();
        members.insert(self_id);
        Self { self_id, members }
    }
}

#[async_trait]
impl Topology for FixedTopology {
    fn self_id(&self) -> NodeId {
        self.self_id
    }

    fn cluster_size(&self) -> usize {
        self.members.len()
    }

    fn get(&self, node_id: NodeId) -> Option<NodeId> {
        self.members.get(&node_id).copied()
    }

    fn reverse_lookup(&self, addr: &str) -> Option<NodeId> {
        self.members.iter().find(|n| n.to_string() == addr).copied()
    }

    fn ping_interval(&self) -> Duration {
        Duration::from_millis(250)
    }

    fn hello_timeout(&self) -> Duration {
        Duration::from_secs(2)
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

    #[test]
    fn quorum_sizes_follow_the_standard_formulas_for_five_nodes() {
        let nodes: Vec<NodeId> = (0..5u32).map(NodeId::from).collect();
        let topo = FixedTopology::new(nodes[0], nodes.clone());
        assert_eq!(topo.cluster_size(), 5);
        assert_eq!(topo.quorum_size(), 3);
        assert_eq!(topo.f_plus_one(), 3);
        assert_eq!(topo.super_majority_size(), 3);
    }

    #[test]
    fn quorum_sizes_for_three_nodes() {
        let nodes: Vec<NodeId> = (0..3u32).map(NodeId::from).collect();
        let topo = FixedTopology::new(nodes[0], nodes.clone());
        assert_eq!(topo.quorum_size(), 2);
        assert_eq!(topo.f_plus_one(), 2);
        assert_eq!(topo.super_majority_size(), 2);
    }

    #[test]
    fn unknown_node_is_not_a_member() {
        let nodes: Vec<NodeId> = (0..3u32).map(NodeId::from).collect();
        let topo = FixedTopology::new(nodes[0], nodes.clone());
        assert!(topo.get(NodeId::from(999u32)).is_none());
        assert!(topo.get(nodes[1]).is_some());
    }
}
