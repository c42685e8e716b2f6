//! Tree topologies. `BinaryTree` orders NPUs as a heap (children of
//! `i` are `2i+1` and `2i+2`) and routes through the lowest common
//! ancestor. `DoubleBinaryTree` overlays a second heap tree with the
//! node labelling mirrored, roots at the same logical position; the
//! link set is the union of both trees and routing deterministically
//! uses the primary one.

use std::sync::Arc;

use crate::bandwidth::Bandwidth;
use crate::basic::{materialize, BasicTopology, ConnectionPolicy, TopologyMode};
use crate::config::TopologyKind;
use crate::fabric::Fabric;
use crate::fault::FaultTable;
use crate::{DeviceId, Latency};

#[inline]
fn heap_parent(i: DeviceId) -> DeviceId {
    (i - 1) / 2
}

/// Parent/child policies of one heap tree, relabelled through `map`.
fn heap_policies(npus_count: usize, map: impl Fn(DeviceId) -> DeviceId) -> Vec<ConnectionPolicy> {
    let mut policies = Vec::with_capacity(2 * (npus_count - 1));
    for i in 1..npus_count {
        let parent = heap_parent(i);
        policies.push(ConnectionPolicy::new(map(parent), map(i)));
        policies.push(ConnectionPolicy::new(map(i), map(parent)));
    }
    policies
}

/// The unique heap-tree path `src -> lca -> dst`.
fn lca_route(npus_count: usize, src: DeviceId, dst: DeviceId) -> Vec<DeviceId> {
    assert!(src < npus_count && dst < npus_count, "route endpoint out of range");
    if src == dst {
        return vec![src];
    }

    let chain_to_root = |mut node: DeviceId| {
        let mut chain = vec![node];
        while node != 0 {
            node = heap_parent(node);
            chain.push(node);
        }
        chain
    };
    let up = chain_to_root(src);
    let down = chain_to_root(dst);

    let mut on_src_path = vec![false; npus_count];
    for &node in &up {
        on_src_path[node] = true;
    }
    let lca = *down
        .iter()
        .find(|&&node| on_src_path[node])
        .expect("heap trees share a root");

    let mut hops: Vec<DeviceId> = up.iter().copied().take_while(|&node| node != lca).collect();
    hops.push(lca);
    let descend: Vec<DeviceId> = down.iter().copied().take_while(|&node| node != lca).collect();
    hops.extend(descend.into_iter().rev());
    hops
}

pub struct BinaryTree {
    npus_count: usize,
    bandwidth: Bandwidth,
    latency: Latency,
    faults: Arc<FaultTable>,
    fabric: Option<Fabric>,
}

impl BinaryTree {
    pub fn new(
        npus_count: usize,
        bandwidth: Bandwidth,
        latency: Latency,
        mode: TopologyMode,
        faults: Arc<FaultTable>,
    ) -> Self {
        assert!(npus_count > 0);
        assert!(bandwidth.val() > 0);
        assert!(latency >= 0.0);

        let mut tree = BinaryTree {
            npus_count,
            bandwidth,
            latency,
            faults,
            fabric: None,
        };
        if mode == TopologyMode::Standalone {
            let fabric = materialize(&tree, &tree.faults);
            tree.fabric = Some(fabric);
        }
        tree
    }
}

impl BasicTopology for BinaryTree {
    fn kind(&self) -> TopologyKind {
        TopologyKind::BinaryTree
    }

    fn npus_count(&self) -> usize {
        self.npus_count
    }

    fn devices_count(&self) -> usize {
        self.npus_count
    }

    fn connection_policies(&self) -> Vec<ConnectionPolicy> {
        heap_policies(self.npus_count, |i| i)
    }

    fn route(&self, src: DeviceId, dst: DeviceId) -> Vec<DeviceId> {
        lca_route(self.npus_count, src, dst)
    }

    fn link_latency(&self) -> Latency {
        self.latency
    }

    fn link_bandwidth(&self) -> Bandwidth {
        self.bandwidth
    }

    fn standalone_fabric(&self) -> Option<&Fabric> {
        self.fabric.as_ref()
    }
}

pub struct DoubleBinaryTree {
    npus_count: usize,
    bandwidth: Bandwidth,
    latency: Latency,
    faults: Arc<FaultTable>,
    fabric: Option<Fabric>,
}

impl DoubleBinaryTree {
    pub fn new(
        npus_count: usize,
        bandwidth: Bandwidth,
        latency: Latency,
        mode: TopologyMode,
        faults: Arc<FaultTable>,
    ) -> Self {
        assert!(npus_count > 0);
        assert!(bandwidth.val() > 0);
        assert!(latency >= 0.0);

        let mut tree = DoubleBinaryTree {
            npus_count,
            bandwidth,
            latency,
            faults,
            fabric: None,
        };
        if mode == TopologyMode::Standalone {
            let fabric = materialize(&tree, &tree.faults);
            tree.fabric = Some(fabric);
        }
        tree
    }
}

impl BasicTopology for DoubleBinaryTree {
    fn kind(&self) -> TopologyKind {
        TopologyKind::DoubleBinaryTree
    }

    fn npus_count(&self) -> usize {
        self.npus_count
    }

    fn devices_count(&self) -> usize {
        self.npus_count
    }

    fn connection_policies(&self) -> Vec<ConnectionPolicy> {
        let n = self.npus_count;
        let mut policies = heap_policies(n, |i| i);
        policies.extend(heap_policies(n, |i| n - 1 - i));
        policies
    }

    fn route(&self, src: DeviceId, dst: DeviceId) -> Vec<DeviceId> {
        lca_route(self.npus_count, src, dst)
    }

    fn link_latency(&self) -> Latency {
        self.latency
    }

    fn link_bandwidth(&self) -> Bandwidth {
        self.bandwidth
    }

    fn standalone_fabric(&self) -> Option<&Fabric> {
        self.fabric.as_ref()
    }
}
