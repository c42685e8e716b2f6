//! Ring: NPU `i` links to `(i + 1) mod n`, and back when
//! bidirectional.

use std::sync::Arc;

use crate::bandwidth::Bandwidth;
use crate::basic::{materialize, BasicTopology, ConnectionPolicy, TopologyMode};
use crate::config::TopologyKind;
use crate::fabric::Fabric;
use crate::fault::FaultTable;
use crate::{DeviceId, Latency};

pub struct Ring {
    npus_count: usize,
    bandwidth: Bandwidth,
    latency: Latency,
    bidirectional: bool,
    faults: Arc<FaultTable>,
    fabric: Option<Fabric>,
}

impl Ring {
    pub fn new(
        npus_count: usize,
        bandwidth: Bandwidth,
        latency: Latency,
        bidirectional: bool,
        mode: TopologyMode,
        faults: Arc<FaultTable>,
    ) -> Self {
        assert!(npus_count > 0);
        assert!(bandwidth.val() > 0);
        assert!(latency >= 0.0);

        let mut ring = Ring {
            npus_count,
            bandwidth,
            latency,
            bidirectional,
            faults,
            fabric: None,
        };
        if mode == TopologyMode::Standalone {
            let fabric = materialize(&ring, &ring.faults);
            ring.fabric = Some(fabric);
        }
        ring
    }
}

impl BasicTopology for Ring {
    fn kind(&self) -> TopologyKind {
        TopologyKind::Ring
    }

    fn npus_count(&self) -> usize {
        self.npus_count
    }

    fn devices_count(&self) -> usize {
        self.npus_count
    }

    fn connection_policies(&self) -> Vec<ConnectionPolicy> {
        let n = self.npus_count;
        let mut policies: Vec<ConnectionPolicy> =
            (0..n).map(|i| ConnectionPolicy::new(i, (i + 1) % n)).collect();
        if self.bidirectional {
            policies.extend((0..n).map(|i| ConnectionPolicy::new((i + 1) % n, i)));
        }
        policies
    }

    fn route(&self, src: DeviceId, dst: DeviceId) -> Vec<DeviceId> {
        let n = self.npus_count;
        assert!(src < n && dst < n, "route endpoint out of range");
        if src == dst {
            return vec![src];
        }

        // Clockwise unless the other way round is strictly shorter.
        let mut step: isize = 1;
        if self.bidirectional {
            let clockwise_dist = (dst + n - src) % n;
            let anticlockwise_dist = n - clockwise_dist;
            if anticlockwise_dist < clockwise_dist {
                step = -1;
            }
        }

        let mut hops = Vec::new();
        let mut current = src;
        while current != dst {
            hops.push(current);
            current = (current as isize + step).rem_euclid(n as isize) as usize;
        }
        hops.push(dst);
        hops
    }

    fn link_latency(&self) -> Latency {
        self.latency
    }

    fn link_bandwidth(&self) -> Bandwidth {
        self.bandwidth
    }

    /// The two parallel directions fold into one effective per-link
    /// capacity when the ring stands alone.
    fn standalone_link_bandwidth(&self) -> Bandwidth {
        self.bandwidth * 2
    }

    fn standalone_fabric(&self) -> Option<&Fabric> {
        self.fabric.as_ref()
    }
}
