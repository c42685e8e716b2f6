//! Bus: a shared medium. At this level of abstraction the medium is
//! one arbiter device with id `n` that every NPU attaches to, so a
//! transfer occupies the same shared resource regardless of the pair.

use std::sync::Arc;

use crate::bandwidth::Bandwidth;
use crate::basic::{materialize, BasicTopology, ConnectionPolicy, TopologyMode};
use crate::config::TopologyKind;
use crate::fabric::Fabric;
use crate::fault::FaultTable;
use crate::{DeviceId, Latency};

pub struct Bus {
    npus_count: usize,
    arbiter_id: DeviceId,
    bandwidth: Bandwidth,
    latency: Latency,
    faults: Arc<FaultTable>,
    fabric: Option<Fabric>,
}

impl Bus {
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

        let mut bus = Bus {
            npus_count,
            arbiter_id: npus_count,
            bandwidth,
            latency,
            faults,
            fabric: None,
        };
        if mode == TopologyMode::Standalone {
            let fabric = materialize(&bus, &bus.faults);
            bus.fabric = Some(fabric);
        }
        bus
    }

    #[inline]
    pub fn arbiter_id(&self) -> DeviceId {
        self.arbiter_id
    }
}

impl BasicTopology for Bus {
    fn kind(&self) -> TopologyKind {
        TopologyKind::Bus
    }

    fn npus_count(&self) -> usize {
        self.npus_count
    }

    fn devices_count(&self) -> usize {
        self.npus_count + 1
    }

    fn connection_policies(&self) -> Vec<ConnectionPolicy> {
        let mut policies = Vec::with_capacity(2 * self.npus_count);
        for i in 0..self.npus_count {
            policies.push(ConnectionPolicy::new(i, self.arbiter_id));
            policies.push(ConnectionPolicy::new(self.arbiter_id, i));
        }
        policies
    }

    fn route(&self, src: DeviceId, dst: DeviceId) -> Vec<DeviceId> {
        assert!(
            src < self.npus_count && dst < self.npus_count,
            "route endpoint out of range"
        );
        if src == dst {
            vec![src]
        } else {
            vec![src, self.arbiter_id, dst]
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

    #[test]
    fn transfers_cross_the_arbiter() {
        let bus = Bus::new(
            4,
            100.gbps(),
            1.0,
            TopologyMode::Standalone,
            Arc::new(FaultTable::empty()),
        );
        assert_eq!(bus.devices_count(), 5);
        assert_eq!(bus.route(1, 3), vec![1, 4, 3]);
        assert_eq!(bus.standalone_fabric().unwrap().links_count(), 8);
    }
}
