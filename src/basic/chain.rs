//! Chain: the linear 1D mesh `0 - 1 - ... - n-1` (configuration name
//! `Mesh`). Inherently bidirectional; routing walks the index
//! monotonically toward the destination.

use std::sync::Arc;

use crate::bandwidth::Bandwidth;
use crate::basic::{materialize, BasicTopology, ConnectionPolicy, TopologyMode};
use crate::config::TopologyKind;
use crate::fabric::Fabric;
use crate::fault::FaultTable;
use crate::{DeviceId, Latency};

pub struct Chain {
    npus_count: usize,
    bandwidth: Bandwidth,
    latency: Latency,
    faults: Arc<FaultTable>,
    fabric: Option<Fabric>,
}

impl Chain {
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

        let mut chain = Chain {
            npus_count,
            bandwidth,
            latency,
            faults,
            fabric: None,
        };
        if mode == TopologyMode::Standalone {
            let fabric = materialize(&chain, &chain.faults);
            chain.fabric = Some(fabric);
        }
        chain
    }
}

impl BasicTopology for Chain {
    fn kind(&self) -> TopologyKind {
        TopologyKind::Mesh
    }

    fn npus_count(&self) -> usize {
        self.npus_count
    }

    fn devices_count(&self) -> usize {
        self.npus_count
    }

    fn connection_policies(&self) -> Vec<ConnectionPolicy> {
        let mut policies = Vec::with_capacity(2 * (self.npus_count - 1));
        for i in 0..self.npus_count - 1 {
            policies.push(ConnectionPolicy::new(i, i + 1));
            policies.push(ConnectionPolicy::new(i + 1, i));
        }
        policies
    }

    fn route(&self, src: DeviceId, dst: DeviceId) -> Vec<DeviceId> {
        assert!(
            src < self.npus_count && dst < self.npus_count,
            "route endpoint out of range"
        );
        if src <= dst {
            (src..=dst).collect()
        } else {
            (dst..=src).rev().collect()
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bandwidth::BandwidthTrait;

    fn chain(n: usize) -> Chain {
        Chain::new(
            n,
            100.gbps(),
            1.0,
            TopologyMode::Standalone,
            Arc::new(FaultTable::empty()),
        )
    }

    #[test]
    fn routes_are_monotonic() {
        let topology = chain(5);
        assert_eq!(topology.route(1, 4), vec![1, 2, 3, 4]);
        assert_eq!(topology.route(4, 1), vec![4, 3, 2, 1]);
        assert_eq!(topology.route(0, 0), vec![0]);
    }

    #[test]
    fn no_wrap_link() {
        let topology = chain(4);
        let fabric = topology.standalone_fabric().unwrap();
        assert!(!fabric.has_link(3, 0));
        assert!(!fabric.has_link(0, 3));
        assert_eq!(fabric.links_count(), 6);
    }
}
