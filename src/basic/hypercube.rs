//! HyperCube: `n = 2^k` NPUs, NPU `i` linked to `i ^ (1 << b)` for
//! every bit `b`. Routing is e-cube: differing bits are fixed from
//! least significant to most significant, which keeps routes
//! deterministic and deadlock-free in the same way dimension-order
//! routing does.

use std::sync::Arc;

use crate::bandwidth::Bandwidth;
use crate::basic::{materialize, BasicTopology, ConnectionPolicy, TopologyMode};
use crate::config::TopologyKind;
use crate::fabric::Fabric;
use crate::fault::FaultTable;
use crate::{DeviceId, Latency};

pub struct HyperCube {
    npus_count: usize,
    bandwidth: Bandwidth,
    latency: Latency,
    faults: Arc<FaultTable>,
    fabric: Option<Fabric>,
}

impl HyperCube {
    pub fn new(
        npus_count: usize,
        bandwidth: Bandwidth,
        latency: Latency,
        mode: TopologyMode,
        faults: Arc<FaultTable>,
    ) -> Self {
        assert!(npus_count > 0 && npus_count.is_power_of_two());
        assert!(bandwidth.val() > 0);
        assert!(latency >= 0.0);

        let mut cube = HyperCube {
            npus_count,
            bandwidth,
            latency,
            faults,
            fabric: None,
        };
        if mode == TopologyMode::Standalone {
            let fabric = materialize(&cube, &cube.faults);
            cube.fabric = Some(fabric);
        }
        cube
    }

    #[inline]
    fn order(&self) -> u32 {
        self.npus_count.trailing_zeros()
    }
}

impl BasicTopology for HyperCube {
    fn kind(&self) -> TopologyKind {
        TopologyKind::HyperCube
    }

    fn npus_count(&self) -> usize {
        self.npus_count
    }

    fn devices_count(&self) -> usize {
        self.npus_count
    }

    fn connection_policies(&self) -> Vec<ConnectionPolicy> {
        let mut policies = Vec::with_capacity(self.npus_count * self.order() as usize);
        for i in 0..self.npus_count {
            for b in 0..self.order() {
                policies.push(ConnectionPolicy::new(i, i ^ (1 << b)));
            }
        }
        policies
    }

    fn route(&self, src: DeviceId, dst: DeviceId) -> Vec<DeviceId> {
        assert!(
            src < self.npus_count && dst < self.npus_count,
            "route endpoint out of range"
        );
        let mut hops = vec![src];
        let mut current = src;
        let differing = src ^ dst;
        for b in 0..self.order() {
            if differing & (1 << b) != 0 {
                current ^= 1 << b;
                hops.push(current);
            }
        }
        hops
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

    fn cube(n: usize) -> HyperCube {
        HyperCube::new(
            n,
            100.gbps(),
            1.0,
            TopologyMode::Standalone,
            Arc::new(FaultTable::empty()),
        )
    }

    #[test]
    fn route_fixes_bits_low_to_high() {
        let topology = cube(8);
        assert_eq!(topology.route(0, 7), vec![0, 1, 3, 7]);
        assert_eq!(topology.route(5, 2), vec![5, 4, 6, 2]);
    }

    #[test]
    fn route_length_is_hamming_distance_plus_one() {
        let topology = cube(16);
        for src in 0..16usize {
            for dst in 0..16usize {
                let expected = (src ^ dst).count_ones() as usize + 1;
                assert_eq!(topology.route(src, dst).len(), expected);
            }
        }
    }

    #[test]
    fn each_npu_has_one_link_per_bit() {
        let topology = cube(8);
        let fabric = topology.standalone_fabric().unwrap();
        assert_eq!(fabric.links_count(), 8 * 3);
        assert!(fabric.has_link(0, 1));
        assert!(fabric.has_link(0, 2));
        assert!(fabric.has_link(0, 4));
        assert!(!fabric.has_link(0, 3));
    }

    #[test]
    #[should_panic]
    fn non_power_of_two_is_rejected() {
        cube(6);
    }
}
